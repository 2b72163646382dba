use creature_core::compute::multiplier_variable;
use creature_core::formula::{format_number, signed_number};
use creature_core::property::{AdjustmentOperation, AttributeType, TriggerTiming};
use creature_core::{
    CreatureId, Property, PropertyKind, PropertyType, ScopeEntry, TriggerFamily, Value,
};

use crate::action::engine::ActionEngine;
use crate::action::error::Result;
use crate::action::types::{DamagePropTask, LogContent, Mutation, Update};

impl ActionEngine<'_> {
    /// Rolls damage or healing and spreads it over each target's health bars.
    pub(super) async fn apply_damage(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        let PropertyKind::Damage(payload) = &property.kind else {
            return Ok(());
        };
        let payload = payload.clone();
        let target_ids = self.resolve_targets(payload.target, target_ids);
        let index = self.new_result(Some(&property.id), &target_ids);

        let Some(rolled) = self.roll_calculation(&property, "amount").await? else {
            return self.default_tail(&property, &target_ids).await;
        };
        self.log_errors(index, &rolled.errors, &target_ids);
        let total = rolled.number().unwrap_or_default();
        let healing = payload.is_healing();
        let name = if healing { "Healing" } else { "Damage" };

        if target_ids.is_empty() {
            let value = if healing {
                format!("{}\n**{}** healing", rolled.text(), format_number(total))
            } else {
                format!(
                    "{}\n**{}** {} damage",
                    rolled.text(),
                    format_number(total),
                    payload.damage_type
                )
            };
            let content = LogContent::named(name)
                .with_value(value)
                .inline()
                .silenced(payload.silent);
            self.log(index, content, &target_ids);
            return self.default_tail(&property, &target_ids).await;
        }

        let content = LogContent::named(name)
            .with_value(rolled.text())
            .inline()
            .silenced(payload.silent);
        self.log(index, content, &target_ids);

        for target_id in &target_ids {
            let mut amount = total;
            if !healing
                && let Some(variable) = multiplier_variable(&payload.damage_type)
                && let Some(multiplier) = self.creature(target_id)?.variables.number(&variable)
            {
                amount *= multiplier;
            }
            if let Some(save) = &payload.save {
                let dc = self
                    .roll_calculation(&property, "save.dc")
                    .await?
                    .and_then(|rolled| rolled.number());
                if let Some(dc) = dc {
                    let save_index = self.new_result(Some(&property.id), &[target_id.clone()]);
                    let outcome = self
                        .roll_save(
                            save_index,
                            target_id,
                            save.stat.as_deref(),
                            dc,
                            payload.silent,
                        )
                        .await?;
                    if outcome.succeeded {
                        amount /= 2.0;
                    }
                }
            }
            let amount = amount.floor();
            if healing {
                self.spread_over_health_bars(&property, target_id, -amount).await?;
            } else {
                self.spread_over_health_bars(&property, target_id, amount).await?;
            }
        }

        self.default_tail(&property, &target_ids).await
    }

    /// Damages (or heals, when negative) health bars in tree order until the
    /// amount runs out.
    async fn spread_over_health_bars(
        &mut self,
        property: &Property,
        target_id: &CreatureId,
        amount: f64,
    ) -> Result<()> {
        let health_bars: Vec<String> = self
            .creature(target_id)?
            .tree
            .of_type(PropertyType::Attribute)
            .filter(|bar| bar.is_active())
            .filter(|bar| {
                matches!(
                    &bar.kind,
                    PropertyKind::Attribute(attribute)
                        if attribute.attribute_type == AttributeType::HealthBar
                )
            })
            .map(|bar| bar.id.clone())
            .collect();
        let mut remaining = amount;
        for bar_id in health_bars {
            if remaining == 0.0 {
                break;
            }
            let applied = self
                .damage_prop(DamagePropTask {
                    target_ids: vec![target_id.clone()],
                    title: Some(property.title()),
                    operation: AdjustmentOperation::Increment,
                    value: remaining,
                    target_prop_id: Some(bar_id),
                    stat: None,
                    silent: property.kind.is_silent(),
                })
                .await?;
            remaining -= applied;
        }
        Ok(())
    }

    /// Applies one attribute change and returns the damage increment applied.
    pub(in crate::action) async fn damage_prop_body(
        &mut self,
        task: DamagePropTask,
    ) -> Result<f64> {
        let index = self.new_result(task.target_prop_id.as_deref(), &task.target_ids);
        match task.operation {
            AdjustmentOperation::Increment if task.value >= 0.0 => {
                self.push_scope(index, "~damage", ScopeEntry::new(task.value));
            }
            AdjustmentOperation::Increment => {
                self.push_scope(index, "~healing", ScopeEntry::new(-task.value));
            }
            AdjustmentOperation::Set => {
                self.push_scope(index, "~set", ScopeEntry::new(task.value));
            }
        }
        let original = task
            .target_prop_id
            .as_deref()
            .and_then(|id| self.property(id))
            .cloned();
        if let Some(original) = &original {
            let mut entry = ScopeEntry::default().with_prop(original.id.clone());
            entry.value = original.output("value").cloned();
            if let Some(total) = original.output_number("total") {
                entry = entry.with_field("total", total);
            }
            self.push_scope(index, "~attributeDamaged", entry);
            self.apply_triggers(
                original,
                TriggerFamily::Damage,
                TriggerTiming::Before,
                &task.target_ids,
            )
            .await?;
        }

        // Triggers may have rewritten the amount or the attribute.
        let scope = self.scope();
        let index = self.pop_pushed(task.target_prop_id.as_deref(), &task.target_ids);
        let value = match task.operation {
            AdjustmentOperation::Increment if task.value >= 0.0 => {
                scope.number("~damage").unwrap_or(task.value)
            }
            AdjustmentOperation::Increment => -scope.number("~healing").unwrap_or(-task.value),
            AdjustmentOperation::Set => scope.number("~set").unwrap_or(task.value),
        };
        let target_prop_id = scope
            .get("~attributeDamaged")
            .and_then(|entry| entry.prop_id.clone())
            .or_else(|| task.target_prop_id.clone());
        let is_set = task.operation == AdjustmentOperation::Set;

        if task.target_ids.is_empty() {
            let stat = task
                .stat
                .clone()
                .or_else(|| original.as_ref().map(Property::title))
                .unwrap_or_default();
            let content = LogContent {
                name: task.title.clone(),
                value: Some(format!(
                    "{stat}{} {}",
                    if is_set { " set to" } else { "" },
                    format_number(value)
                )),
                inline: true,
                silenced: task.silent,
            };
            self.log(index, content, &task.target_ids);
        }

        let Some(target_id) = task.target_ids.first().cloned() else {
            return Ok(value);
        };
        let Some(target) = target_prop_id.as_deref().and_then(|id| self.property(id)).cloned()
        else {
            return Ok(value);
        };
        let PropertyKind::Attribute(attribute) = &target.kind else {
            return Ok(value);
        };
        let total = target.output_number("total").unwrap_or_default();
        let current_damage = attribute.damage;
        let current_value = target
            .output_number("value")
            .unwrap_or(total - current_damage);
        let title = target.title();
        let targets = [target_id.clone()];

        let increment;
        let mut new_state = None;
        if is_set {
            let mut damage = total - value;
            if damage > total && !attribute.ignore_lower_limit {
                damage = total;
            }
            if damage < 0.0 && !attribute.ignore_upper_limit {
                damage = 0.0;
            }
            let new_value = total - damage;
            increment = damage - current_damage;
            let content = LogContent {
                name: task.title.clone(),
                value: Some(format!(
                    "{title} set from {} to {}",
                    format_number(current_value),
                    format_number(value)
                )),
                inline: true,
                silenced: task.silent,
            };
            let update = Update::new(target.id.clone(), target.property_type())
                .set("damage", damage)
                .set("value", new_value);
            self.mutate(
                index,
                Mutation {
                    target_ids: targets.to_vec(),
                    updates: vec![update],
                    contents: vec![content],
                    ..Mutation::default()
                },
            )?;
            new_state = Some((new_value, damage));
        } else {
            let mut delta = value;
            if delta > current_value && !attribute.ignore_lower_limit {
                delta = current_value;
            }
            if -delta > current_damage && !attribute.ignore_upper_limit {
                delta = -current_damage;
            }
            increment = delta;
            if increment != 0.0 {
                let damage = current_damage + increment;
                let new_value = total - damage;
                let verb = if increment >= 0.0 { "damaged" } else { "restored" };
                let name = format!("{} {verb}", attribute.attribute_type.title());
                let content = LogContent::named(name)
                    .with_value(format!("{} {title}", signed_number(-increment, false)))
                    .inline()
                    .silenced(task.silent);
                let update = Update::new(target.id.clone(), target.property_type())
                    .inc("damage", increment)
                    .inc("value", -increment);
                self.mutate(
                    index,
                    Mutation {
                        target_ids: targets.to_vec(),
                        updates: vec![update],
                        contents: vec![content],
                        ..Mutation::default()
                    },
                )?;
                new_state = Some((new_value, damage));
            }
        }

        if let Some((new_value, damage)) = new_state
            && target_id == self.action.creature_id
            && !target.output("overridden").is_some_and(Value::is_truthy)
            && let Some(variable) = target.variable_name()
        {
            let mut entry = scope.get(variable).cloned().unwrap_or_default();
            entry.value = Some(new_value.into());
            entry.fields.insert("damage".to_owned(), damage.into());
            entry.fields.insert("value".to_owned(), new_value.into());
            self.set_scope(index, variable, entry);
        }

        self.apply_triggers(&target, TriggerFamily::Damage, TriggerTiming::After, &targets)
            .await?;
        self.apply_triggers(
            &target,
            TriggerFamily::Damage,
            TriggerTiming::AfterChildren,
            &targets,
        )
        .await?;
        Ok(increment)
    }

    /// Rolls an attribute adjustment and applies it to the named variable's
    /// attribute on each target.
    pub(super) async fn apply_adjustment(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        let PropertyKind::Adjustment(payload) = &property.kind else {
            return Ok(());
        };
        let payload = payload.clone();
        let target_ids = self.resolve_targets(payload.target, target_ids);
        let index = self.new_result(Some(&property.id), &target_ids);

        let Some(rolled) = self.roll_calculation(&property, "amount").await? else {
            return self.default_tail(&property, &target_ids).await;
        };
        self.log_errors(index, &rolled.errors, &target_ids);
        let (Some(amount), Some(stat)) = (
            rolled.number(),
            payload.stat.clone().filter(|stat| !stat.is_empty()),
        ) else {
            return self.default_tail(&property, &target_ids).await;
        };

        let task = DamagePropTask {
            target_ids: Vec::new(),
            title: Some("Attribute damage".to_owned()),
            operation: payload.operation,
            value: amount,
            target_prop_id: None,
            stat: Some(stat.clone()),
            silent: payload.silent,
        };
        if target_ids.is_empty() {
            self.damage_prop(task).await?;
        } else {
            for target_id in &target_ids {
                let prop_id = self
                    .creature(target_id)?
                    .variables
                    .get(&stat)
                    .and_then(|entry| entry.prop_id.clone());
                match prop_id {
                    Some(prop_id) => {
                        self.damage_prop(DamagePropTask {
                            target_ids: vec![target_id.clone()],
                            target_prop_id: Some(prop_id),
                            ..task.clone()
                        })
                        .await?;
                    }
                    None => {
                        let message = format!(
                            "Could not apply attribute damage, creature does not have `{stat}` set"
                        );
                        self.log(
                            index,
                            LogContent::error(message).silenced(payload.silent),
                            &[target_id.clone()],
                        );
                    }
                }
            }
        }

        self.default_tail(&property, &target_ids).await
    }
}
