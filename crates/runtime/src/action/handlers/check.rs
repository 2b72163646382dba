use creature_core::formula::{format_number, signed_number};
use creature_core::property::TriggerTiming;
use creature_core::{CreatureId, Property, PropertyKind, ScopeEntry, TriggerFamily, Value};

use crate::action::engine::ActionEngine;
use crate::action::error::Result;
use crate::action::types::{CheckTask, LogContent};
use crate::api::{Advantage, CheckParams};

/// A rolled check or save.
pub(super) struct CheckRoll {
    pub d20: f64,
    pub total: f64,
    /// `1d20 [12] + 3`
    pub text: String,
    pub advantage: Advantage,
}

pub(super) struct SaveOutcome {
    pub succeeded: bool,
    pub roll: CheckRoll,
}

fn field_count(entry: Option<&ScopeEntry>, field: &str) -> u32 {
    entry
        .and_then(|entry| entry.field(field))
        .and_then(Value::as_number)
        .map_or(0, |count| count.max(0.0) as u32)
}

impl ActionEngine<'_> {
    /// Lets the provider adjust the check, then rolls it.
    pub(super) async fn roll_check(&mut self, suggested: CheckParams) -> Result<CheckRoll> {
        let params = self.provider.check(suggested).await?;
        let d20 = self.roll_d20(params.advantage).await?;
        let total = d20.value + params.modifier;
        Ok(CheckRoll {
            d20: d20.value,
            total,
            text: format!("1d20 {} {}", d20.dice_text, signed_number(params.modifier, true)),
            advantage: params.advantage,
        })
    }

    /// Rolls a target's save against `dc` and logs whether it held.
    pub(super) async fn roll_save(
        &mut self,
        index: usize,
        target_id: &CreatureId,
        stat: Option<&str>,
        dc: f64,
        silent: bool,
    ) -> Result<SaveOutcome> {
        let entry = match stat {
            Some(stat) => self.creature(target_id)?.variables.get(stat).cloned(),
            None => None,
        };
        let modifier = entry
            .as_ref()
            .and_then(|entry| entry.value.as_ref())
            .and_then(Value::as_number)
            .unwrap_or_default();
        let advantage = Advantage::from_counts(
            field_count(entry.as_ref(), "advantage"),
            field_count(entry.as_ref(), "disadvantage"),
        );
        let roll = self
            .roll_check(CheckParams {
                creature_id: target_id.clone(),
                prop_id: entry.as_ref().and_then(|entry| entry.prop_id.clone()),
                skill_variable: stat.map(str::to_owned),
                label: stat.unwrap_or("Saving throw").to_owned(),
                modifier,
                dc: Some(dc),
                advantage,
            })
            .await?;
        let succeeded = roll.total >= dc;
        let name = if succeeded { "Successful save" } else { "Failed save" };
        let content = LogContent::named(format!("{name}{}", roll.advantage.suffix()))
            .with_value(format!("{}\n**{}**", roll.text, format_number(roll.total)))
            .inline()
            .silenced(silent);
        self.log(index, content, &[target_id.clone()]);
        Ok(SaveOutcome { succeeded, roll })
    }

    /// Logs the DC, then rolls each target's save before its children.
    pub(super) async fn apply_saving_throw(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        let PropertyKind::SavingThrow(payload) = &property.kind else {
            return Ok(());
        };
        let payload = payload.clone();
        let target_ids = self.resolve_targets(payload.target, target_ids);
        let index = self.new_result(Some(&property.id), &target_ids);

        let dc = match self.roll_calculation(&property, "dc").await? {
            Some(rolled) => {
                self.log_errors(index, &rolled.errors, &target_ids);
                rolled.number()
            }
            None => None,
        };
        let mut content = LogContent::named(property.title())
            .inline()
            .silenced(payload.silent);
        if let Some(dc) = dc {
            content = content.with_value(format!("DC **{}**", format_number(dc)));
        }
        self.log(index, content, &target_ids);

        let (Some(dc), false) = (dc, target_ids.is_empty()) else {
            return self.default_tail(&property, &target_ids).await;
        };

        for target_id in &target_ids {
            let single = [target_id.clone()];
            let save_index = self.new_result(Some(&property.id), &single);
            let outcome = self
                .roll_save(
                    save_index,
                    target_id,
                    payload.stat.as_deref(),
                    dc,
                    payload.silent,
                )
                .await?;
            if outcome.succeeded {
                self.push_scope(save_index, "~saveSucceeded", ScopeEntry::new(true));
                self.push_scope(save_index, "~saveFailed", ScopeEntry::default());
            } else {
                self.push_scope(save_index, "~saveFailed", ScopeEntry::new(true));
                self.push_scope(save_index, "~saveSucceeded", ScopeEntry::default());
            }
            self.push_scope(save_index, "~saveDiceRoll", ScopeEntry::new(outcome.roll.d20));
            self.push_scope(save_index, "~saveRoll", ScopeEntry::new(outcome.roll.total));
            self.apply_triggers(&property, TriggerFamily::Prop, TriggerTiming::After, &single)
                .await?;
            self.apply_children(&property.id, &single).await?;
        }

        self.apply_triggers(
            &property,
            TriggerFamily::Prop,
            TriggerTiming::AfterChildren,
            &target_ids,
        )
        .await
    }

    /// Rolls an ability or skill check for one creature.
    pub(in crate::action) async fn check(&mut self, task: CheckTask) -> Result<()> {
        let creature_id = task
            .target_ids
            .first()
            .cloned()
            .unwrap_or_else(|| self.action.creature_id.clone());
        self.load(&creature_id)?;
        let property = task
            .prop_id
            .as_deref()
            .and_then(|id| self.property(id))
            .cloned();
        let variable = task
            .skill_variable
            .clone()
            .or_else(|| property.as_ref().and_then(|p| p.variable_name().map(str::to_owned)));

        let (modifier, advantage, label) = match &property {
            Some(property) => {
                let modifier = match &property.kind {
                    PropertyKind::Attribute(_) => property
                        .output_number("modifier")
                        .or_else(|| property.output_number("value")),
                    _ => property.output_number("value"),
                };
                let count = |field: &str| {
                    property
                        .output_number(field)
                        .map_or(0, |count| count.max(0.0) as u32)
                };
                (
                    modifier.unwrap_or_default(),
                    Advantage::from_counts(count("advantage"), count("disadvantage")),
                    property.title(),
                )
            }
            None => {
                let entry = match &variable {
                    Some(variable) => self.creature(&creature_id)?.variables.get(variable).cloned(),
                    None => None,
                };
                let modifier = entry
                    .as_ref()
                    .and_then(|entry| {
                        entry
                            .field("modifier")
                            .or(entry.value.as_ref())
                            .and_then(Value::as_number)
                    })
                    .unwrap_or_default();
                (
                    modifier,
                    Advantage::from_counts(
                        field_count(entry.as_ref(), "advantage"),
                        field_count(entry.as_ref(), "disadvantage"),
                    ),
                    variable.clone().unwrap_or_else(|| "Ability".to_owned()),
                )
            }
        };

        let targets = [creature_id.clone()];
        if let Some(property) = &property {
            self.apply_triggers(property, TriggerFamily::Check, TriggerTiming::Before, &targets)
                .await?;
        }
        let index = self.new_result(task.prop_id.as_deref(), &targets);
        let roll = self
            .roll_check(CheckParams {
                creature_id: creature_id.clone(),
                prop_id: task.prop_id.clone(),
                skill_variable: variable,
                label: label.clone(),
                modifier,
                dc: None,
                advantage,
            })
            .await?;
        self.push_scope(index, "~checkDiceRoll", ScopeEntry::new(roll.d20));
        self.push_scope(index, "~checkRoll", ScopeEntry::new(roll.total));
        let content = LogContent::named(format!("{label} check{}", roll.advantage.suffix()))
            .with_value(format!("{}\n**{}**", roll.text, format_number(roll.total)))
            .inline();
        self.log(index, content, &targets);

        if let Some(property) = &property {
            self.apply_triggers(property, TriggerFamily::Check, TriggerTiming::After, &targets)
                .await?;
            self.apply_triggers(
                property,
                TriggerFamily::Check,
                TriggerTiming::AfterChildren,
                &targets,
            )
            .await?;
        }
        Ok(())
    }
}
