use creature_core::formula::signed_number;
use creature_core::property::{ActionTarget, ActionType, AdjustmentOperation, TriggerTiming};
use creature_core::{CreatureId, Property, PropertyKind, ScopeEntry, TriggerFamily};

use crate::action::engine::ActionEngine;
use crate::action::error::Result;
use crate::action::types::{
    DamagePropTask, ItemAsAmmoTask, LogContent, Mutation, ResetTask, Task, Update,
};

impl ActionEngine<'_> {
    /// Actions and spells: log, check uses and resources, spend them, attack,
    /// then children.
    pub(super) async fn apply_action_prop(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        let Some(payload) = property.kind.action().cloned() else {
            return Ok(());
        };
        let target_ids = match payload.target {
            ActionTarget::Caster => vec![self.action.creature_id.clone()],
            ActionTarget::SingleTarget | ActionTarget::MultipleTargets => target_ids,
        };
        let index = self.new_result(Some(&property.id), &target_ids);

        if let PropertyKind::Spell(spell) = &property.kind
            && !self.scope().contains("slotLevel")
        {
            let level = f64::from(spell.level);
            self.push_scope(index, "~slotLevel", ScopeEntry::new(level));
            self.push_scope(index, "slotLevel", ScopeEntry::new(level));
        }

        let mut content = LogContent::named(property.title()).silenced(payload.silent);
        if let Some(summary) = self.render_text(&property, "summary").await? {
            content = content.with_value(summary);
        }
        self.log(index, content, &target_ids);

        if property.output_number("usesLeft").is_some_and(|left| left <= 0.0) {
            let message = format!("{} does not have enough uses left", property.title());
            self.log(index, LogContent::error(message).silenced(payload.silent), &target_ids);
            return Ok(());
        }
        if property
            .output("insufficientResources")
            .is_some_and(|value| value.is_truthy())
        {
            let message = "This creature doesn't have sufficient resources to perform this action";
            self.log(index, LogContent::error(message).silenced(payload.silent), &target_ids);
            return Ok(());
        }

        self.spend_resources(&property, index).await?;

        if payload.attack_roll.is_some() && property.calculation("attackRoll").is_some() {
            if target_ids.is_empty() {
                self.apply_attack(&property, None).await?;
                self.apply_triggers(&property, TriggerFamily::Prop, TriggerTiming::After, &[])
                    .await?;
                self.apply_children(&property.id, &[]).await?;
            } else {
                for target_id in &target_ids {
                    let single = [target_id.clone()];
                    self.apply_attack(&property, Some(target_id)).await?;
                    self.apply_triggers(
                        &property,
                        TriggerFamily::Prop,
                        TriggerTiming::After,
                        &single,
                    )
                    .await?;
                    self.apply_children(&property.id, &single).await?;
                }
            }
        } else {
            self.apply_triggers(&property, TriggerFamily::Prop, TriggerTiming::After, &target_ids)
                .await?;
            self.apply_children(&property.id, &target_ids).await?;
        }

        if payload.action_type == ActionType::Event
            && let Some(event_name) = payload.variable_name.clone().filter(|name| !name.is_empty())
        {
            self.apply_task(Task::Reset(ResetTask {
                event_name,
                target_ids: vec![self.action.creature_id.clone()],
            }))
            .await?;
        }

        self.apply_triggers(
            &property,
            TriggerFamily::Prop,
            TriggerTiming::AfterChildren,
            &target_ids,
        )
        .await
    }

    /// Consumes attributes and items, then counts the use.
    async fn spend_resources(&mut self, property: &Property, index: usize) -> Result<()> {
        let Some(payload) = property.kind.action() else {
            return Ok(());
        };
        let creature_id = self.action.creature_id.clone();

        for (i, consumed) in payload.resources.attributes_consumed.iter().enumerate() {
            let Some(variable) = consumed.variable_name.as_deref().filter(|name| !name.is_empty())
            else {
                continue;
            };
            let quantity = property
                .calculation(&format!("resources.attributesConsumed.{i}.quantity"))
                .and_then(|outcome| outcome.number())
                .unwrap_or_default();
            if quantity == 0.0 {
                continue;
            }
            let Some(prop_id) = self
                .scope()
                .get(variable)
                .and_then(|entry| entry.prop_id.clone())
            else {
                continue;
            };
            self.damage_prop(DamagePropTask {
                target_ids: vec![creature_id.clone()],
                title: Some(property.title()),
                operation: AdjustmentOperation::Increment,
                value: quantity,
                target_prop_id: Some(prop_id),
                stat: Some(variable.to_owned()),
                silent: payload.silent,
            })
            .await?;
        }

        for (i, consumed) in payload.resources.items_consumed.iter().enumerate() {
            let Some(item_id) = consumed.item_id.clone() else {
                continue;
            };
            let quantity = property
                .calculation(&format!("resources.itemsConsumed.{i}.quantity"))
                .and_then(|outcome| outcome.number())
                .unwrap_or(1.0);
            if quantity == 0.0 {
                continue;
            }
            self.apply_task(Task::ItemAsAmmo(ItemAsAmmoTask {
                item_id,
                quantity,
                target_ids: vec![creature_id.clone()],
            }))
            .await?;
        }

        if payload.uses.is_some() {
            let update =
                Update::new(property.id.clone(), property.property_type()).inc("usesUsed", 1.0);
            self.mutate(
                index,
                Mutation {
                    target_ids: vec![creature_id],
                    updates: vec![update],
                    ..Mutation::default()
                },
            )?;
        }
        Ok(())
    }

    /// Spends items as ammunition and fires their ammo triggers.
    pub(in crate::action) async fn item_as_ammo(&mut self, task: ItemAsAmmoTask) -> Result<()> {
        let item = self.require(&task.item_id)?;
        self.apply_triggers(&item, TriggerFamily::Ammo, TriggerTiming::Before, &task.target_ids)
            .await?;
        let index = self.new_result(Some(&item.id), &task.target_ids);
        let update =
            Update::new(item.id.clone(), item.property_type()).inc("quantity", -task.quantity);
        self.mutate(
            index,
            Mutation {
                target_ids: task.target_ids.clone(),
                updates: vec![update],
                contents: vec![
                    LogContent::named("Item consumed")
                        .with_value(format!(
                            "{} {}",
                            signed_number(-task.quantity, false),
                            item.title()
                        ))
                        .inline(),
                ],
                ..Mutation::default()
            },
        )?;
        self.apply_triggers(&item, TriggerFamily::Ammo, TriggerTiming::After, &task.target_ids)
            .await?;
        self.apply_triggers(
            &item,
            TriggerFamily::Ammo,
            TriggerTiming::AfterChildren,
            &task.target_ids,
        )
        .await
    }
}
