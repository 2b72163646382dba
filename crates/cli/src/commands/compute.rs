//! `creature compute`: prints each creature's variables and compute errors.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use creature_core::Scope;
use creature_runtime::{Creature, Runtime};

use super::{OutputFormat, seeded_runtime};

/// Compute every creature in a fixture
#[derive(Parser)]
pub struct Compute {
    /// Fixture file with the creatures to compute
    #[arg(value_name = "FIXTURE")]
    fixture: PathBuf,

    /// Only print this creature
    #[arg(short, long, value_name = "ID")]
    creature: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

impl Compute {
    pub async fn execute(self) -> Result<()> {
        print!("{}", self.run().await?);
        Ok(())
    }

    async fn run(&self) -> Result<String> {
        let (fixture, runtime) = seeded_runtime(&self.fixture).await?;
        let ids: Vec<&str> = match &self.creature {
            Some(id) if fixture.creature_ids().any(|known| known == id) => vec![id.as_str()],
            Some(id) => bail!("Creature `{id}` is not in the fixture"),
            None => fixture.creature_ids().collect(),
        };

        let mut sheets = Vec::with_capacity(ids.len());
        for id in ids {
            let creature = runtime
                .creature(id)?
                .with_context(|| format!("Creature `{id}` disappeared"))?;
            let variables = runtime.variables(id)?.unwrap_or_default();
            sheets.push((creature, variables));
        }
        runtime.shutdown().await?;

        match self.format {
            OutputFormat::Text => Ok(render_text(&sheets)),
            OutputFormat::Json => render_json(&sheets),
        }
    }
}

fn render_text(sheets: &[(Creature, Scope)]) -> String {
    let mut out = String::new();
    for (creature, variables) in sheets {
        let _ = writeln!(
            out,
            "{} ({}): {} properties",
            creature.id,
            if creature.name.is_empty() { "unnamed" } else { &creature.name },
            creature.prop_count
        );
        let mut names: Vec<(&String, String)> = variables
            .iter()
            .filter_map(|(name, entry)| Some((name, entry.value.as_ref()?.to_string())))
            .collect();
        names.sort();
        for (name, value) in names {
            let _ = writeln!(out, "  {name} = {value}");
        }
        for error in &creature.compute_errors {
            let _ = writeln!(out, "  ! {:?}: {}", error.kind, error.details);
        }
    }
    out
}

fn render_json(sheets: &[(Creature, Scope)]) -> Result<String> {
    let sheets: Vec<serde_json::Value> = sheets
        .iter()
        .map(|(creature, variables)| {
            serde_json::json!({
                "creature": creature,
                "variables": variables,
            })
        })
        .collect();
    let mut text = serde_json::to_string_pretty(&sheets)?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::tests::{FIGHTER, write_fixture};

    fn command(path: PathBuf, creature: Option<&str>, format: OutputFormat) -> Compute {
        Compute {
            fixture: path,
            creature: creature.map(str::to_owned),
            format,
        }
    }

    #[tokio::test]
    async fn prints_computed_variables() {
        let file = write_fixture(FIGHTER);
        let out = command(file.path().to_path_buf(), Some("fighter"), OutputFormat::Text)
            .run()
            .await
            .expect("compute");
        assert!(out.starts_with("fighter (Fighter): 2 properties\n"));
        assert!(out.contains("  strength = 16\n"));
        assert!(!out.contains("goblin"));
    }

    #[tokio::test]
    async fn json_output_parses() {
        let file = write_fixture(FIGHTER);
        let out = command(file.path().to_path_buf(), None, OutputFormat::Json)
            .run()
            .await
            .expect("compute");
        let sheets: Vec<serde_json::Value> = serde_json::from_str(&out).expect("json");
        assert_eq!(sheets.len(), 2);
        assert_eq!(sheets[1]["creature"]["_id"], "goblin");
    }

    #[tokio::test]
    async fn unknown_creatures_are_an_error() {
        let file = write_fixture(FIGHTER);
        let error = command(file.path().to_path_buf(), Some("dragon"), OutputFormat::Text)
            .run()
            .await
            .expect_err("unknown");
        assert!(error.to_string().contains("dragon"));
    }
}
