//! `creature act`: simulates applying one property and prints what it did.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use creature_core::{PropertyKind, PropertyType};
use creature_runtime::{
    Decision, DefaultInputProvider, EngineAction, InputProvider, Mutation, ReplayInputProvider,
    Runtime, Simulation,
};

use super::seeded_runtime;

/// Apply a property as an action
#[derive(Parser)]
pub struct Act {
    /// Fixture file with the acting creature and its targets
    #[arg(value_name = "FIXTURE")]
    fixture: PathBuf,

    /// Property to apply
    #[arg(value_name = "PROP_ID")]
    prop_id: String,

    /// Target creature (repeatable)
    #[arg(short, long = "target", value_name = "ID")]
    targets: Vec<String>,

    /// JSON list of recorded decisions to replay before rolling fresh dice
    #[arg(short, long, value_name = "FILE")]
    decisions: Option<PathBuf>,

    /// Save the decisions this run made
    #[arg(long, value_name = "FILE")]
    save_decisions: Option<PathBuf>,

    /// Write the results and print the recomputed attributes
    #[arg(short, long)]
    write: bool,
}

impl Act {
    pub async fn execute(self) -> Result<()> {
        print!("{}", self.run().await?);
        Ok(())
    }

    async fn run(&self) -> Result<String> {
        let (fixture, runtime) = seeded_runtime(&self.fixture).await?;
        let creature_id = fixture
            .owner_of(&self.prop_id)
            .with_context(|| format!("No creature in the fixture owns `{}`", self.prop_id))?
            .to_owned();
        let action_id = format!("{creature_id}-{}", self.prop_id);
        runtime.submit_action(EngineAction::prop(
            action_id.clone(),
            creature_id.clone(),
            self.prop_id.clone(),
            self.targets.clone(),
        ))?;

        let provider = self.provider(&action_id)?;
        let action = match runtime.simulate_action(&action_id, provider.as_ref()).await? {
            Simulation::Complete(action) => action,
            Simulation::NeedsInput { request, .. } => {
                bail!("The action stopped to ask for {}", request.kind())
            }
        };
        tracing::info!(action_id = %action.id, tasks = action.task_count, "action simulated");

        if let Some(path) = &self.save_decisions {
            let json = serde_json::to_string_pretty(&action.decisions)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write decisions: {}", path.display()))?;
        }

        let mut out = render_action(&action);
        if self.write {
            let written = runtime.run_action(&action_id, action.decisions.clone()).await?;
            let mut creature_ids = vec![written.creature_id.clone()];
            for target_id in &self.targets {
                if !creature_ids.contains(target_id) {
                    creature_ids.push(target_id.clone());
                }
            }
            for creature_id in &creature_ids {
                out.push_str(&render_attributes(&runtime, creature_id)?);
            }
        }
        runtime.shutdown().await?;
        Ok(out)
    }

    fn provider(&self, action_id: &str) -> Result<Box<dyn InputProvider>> {
        let dice = DefaultInputProvider::for_action(action_id);
        let Some(path) = &self.decisions else {
            return Ok(Box::new(dice));
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read decisions: {}", path.display()))?;
        let decisions: Vec<Decision> = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse decisions: {}", path.display()))?;
        Ok(Box::new(ReplayInputProvider::new(decisions).with_fallback(dice)))
    }
}

fn render_action(action: &EngineAction) -> String {
    let mut out = String::new();
    for content in action.contents() {
        match (&content.name, &content.value) {
            (Some(name), Some(value)) => {
                let _ = writeln!(out, "{name}: {}", value.replace('\n', " "));
            }
            (Some(text), None) | (None, Some(text)) => {
                let _ = writeln!(out, "{text}");
            }
            (None, None) => {}
        }
    }
    let mutations: Vec<&Mutation> = action.mutations().collect();
    if mutations.iter().all(|mutation| is_log_only(mutation)) {
        return out;
    }
    let _ = writeln!(out, "--");
    for mutation in mutations {
        let targets = mutation.target_ids.join(", ");
        for update in &mutation.updates {
            let mut fields: Vec<String> = update
                .set
                .iter()
                .map(|(field, value)| format!("{field} = {value}"))
                .collect();
            fields.extend(
                update
                    .inc
                    .iter()
                    .map(|(field, amount)| format!("{field} += {amount}")),
            );
            let _ = writeln!(out, "update {} on {targets}: {}", update.prop_id, fields.join(", "));
        }
        for removal in &mutation.removals {
            let _ = writeln!(out, "remove {} on {targets}", removal.prop_id);
        }
        for insert in &mutation.inserts {
            let _ = writeln!(
                out,
                "insert {} ({}) on {}",
                insert.id,
                insert.property_type(),
                insert.root.id
            );
        }
    }
    out
}

fn is_log_only(mutation: &Mutation) -> bool {
    mutation.updates.is_empty() && mutation.removals.is_empty() && mutation.inserts.is_empty()
}

fn render_attributes(runtime: &Runtime, creature_id: &str) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(out, "== {creature_id} ==");
    for property in runtime
        .stores()
        .properties
        .of_type(creature_id, PropertyType::Attribute)?
    {
        let PropertyKind::Attribute(_) = &property.kind else {
            continue;
        };
        let value = property.output("value").map(ToString::to_string);
        let total = property.output("total").map(ToString::to_string);
        match (value, total) {
            (Some(value), Some(total)) if value != total => {
                let _ = writeln!(out, "{}: {value} / {total}", property.title());
            }
            (Some(value), _) => {
                let _ = writeln!(out, "{}: {value}", property.title());
            }
            (None, _) => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::tests::{FIGHTER, write_fixture};

    fn act(path: PathBuf, decisions: Option<PathBuf>, write: bool) -> Act {
        Act {
            fixture: path,
            prop_id: "sword".into(),
            targets: vec!["goblin".into()],
            decisions,
            save_decisions: None,
            write,
        }
    }

    #[tokio::test]
    async fn replays_recorded_dice_and_writes() {
        let fixture = write_fixture(FIGHTER);
        let decisions = write_fixture(r#"[ { "kind": "rollDice", "values": [[5]] } ]"#);
        let out = act(
            fixture.path().to_path_buf(),
            Some(decisions.path().to_path_buf()),
            true,
        )
        .run()
        .await
        .expect("act");

        assert!(out.contains("Damage: 1d8 [5] + 3\n"), "{out}");
        assert!(out.contains("Health bar damaged: \u{2212}8 Hit Points\n"), "{out}");
        assert!(out.contains("update goblinHp on goblin: "), "{out}");
        assert!(out.contains("== goblin ==\nHit Points: 4 / 12\n"), "{out}");
    }

    #[tokio::test]
    async fn saves_the_decisions_it_made() {
        let fixture = write_fixture(FIGHTER);
        let dir = tempfile::tempdir().expect("temp dir");
        let saved = dir.path().join("decisions.json");
        let mut command = act(fixture.path().to_path_buf(), None, false);
        command.save_decisions = Some(saved.clone());
        let out = command.run().await.expect("act");
        assert!(!out.contains("=="), "nothing written without --write");

        let text = std::fs::read_to_string(&saved).expect("saved");
        let decisions: Vec<Decision> = serde_json::from_str(&text).expect("decisions");
        assert_eq!(decisions.len(), 1);
        assert!(matches!(&decisions[0], Decision::RollDice { values } if values[0].len() == 1));
    }

    #[tokio::test]
    async fn unknown_properties_are_an_error() {
        let fixture = write_fixture(FIGHTER);
        let mut command = act(fixture.path().to_path_buf(), None, false);
        command.prop_id = "axe".into();
        let error = command.run().await.expect_err("unknown");
        assert!(error.to_string().contains("`axe`"));
    }
}
