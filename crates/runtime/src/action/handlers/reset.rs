use creature_core::property::{TriggerEvent, TriggerTiming};
use creature_core::{CreatureId, Property, PropertyKind, PropertyType};

use crate::action::engine::ActionEngine;
use crate::action::error::Result;
use crate::action::types::{LogContent, Mutation, PropTask, ResetTask, Task, Update};

fn rest_matches(event: TriggerEvent, event_name: &str) -> bool {
    match event_name {
        "longRest" => matches!(event, TriggerEvent::LongRest | TriggerEvent::AnyRest),
        "shortRest" => matches!(event, TriggerEvent::ShortRest | TriggerEvent::AnyRest),
        _ => false,
    }
}

impl ActionEngine<'_> {
    /// Restores the attributes and uses that reset on `event_name`, between
    /// the creature's rest triggers.
    pub(in crate::action) async fn reset(&mut self, task: ResetTask) -> Result<()> {
        let creature_id = task
            .target_ids
            .first()
            .cloned()
            .unwrap_or_else(|| self.action.creature_id.clone());
        let tree = self.creature(&creature_id)?.tree.clone();
        let targets = [creature_id.clone()];

        let (before, after): (Vec<&Property>, Vec<&Property>) = tree
            .of_type(PropertyType::Trigger)
            .filter(|trigger| trigger.is_active())
            .filter(|trigger| match &trigger.kind {
                PropertyKind::Trigger(payload) => rest_matches(payload.event, &task.event_name),
                _ => false,
            })
            .partition(|trigger| {
                matches!(
                    &trigger.kind,
                    PropertyKind::Trigger(payload) if payload.timing == TriggerTiming::Before
                )
            });
        self.apply_rest_triggers(&before, &targets).await?;

        let resets = |reset: &Option<String>| reset.as_deref() == Some(task.event_name.as_str());
        let mut updates = Vec::new();
        let mut contents = Vec::new();
        for property in tree.iter().filter(|property| property.is_active()) {
            let update = match &property.kind {
                PropertyKind::Attribute(attribute)
                    if resets(&attribute.reset) && attribute.damage != 0.0 =>
                {
                    let total = property.output_number("total").unwrap_or_default();
                    Update::new(property.id.clone(), property.property_type())
                        .set("damage", 0.0)
                        .set("value", total)
                }
                PropertyKind::Action(_) | PropertyKind::Spell(_) => {
                    let Some(action) = property.kind.action() else {
                        continue;
                    };
                    if !resets(&action.reset) || action.uses_used == 0.0 {
                        continue;
                    }
                    Update::new(property.id.clone(), property.property_type()).set("usesUsed", 0.0)
                }
                _ => continue,
            };
            updates.push(update);
            contents.push(LogContent::named("Reset").with_value(property.title()));
        }
        if !updates.is_empty() {
            let index = self.new_result(None, &targets);
            self.mutate(
                index,
                Mutation {
                    target_ids: targets.to_vec(),
                    updates,
                    contents,
                    ..Mutation::default()
                },
            )?;
        }

        self.apply_rest_triggers(&after, &targets).await
    }

    async fn apply_rest_triggers(
        &mut self,
        triggers: &[&Property],
        target_ids: &[CreatureId],
    ) -> Result<()> {
        for trigger in triggers {
            if !self.condition_holds(trigger).await? {
                continue;
            }
            self.apply_task(Task::Prop(PropTask {
                prop_id: trigger.id.clone(),
                target_ids: target_ids.to_vec(),
            }))
            .await?;
        }
        Ok(())
    }
}
