use creature_core::property::{BranchType, TriggerTiming};
use creature_core::{CreatureId, DiceRequest, Property, PropertyId, PropertyKind, TriggerFamily};

use crate::action::engine::ActionEngine;
use crate::action::error::Result;
use crate::action::types::{PropTask, Task};

impl ActionEngine<'_> {
    /// Runs the children the branch selects. Branches log nothing themselves.
    pub(super) async fn apply_branch(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        let PropertyKind::Branch(payload) = &property.kind else {
            return Ok(());
        };
        let branch_type = payload.branch_type;
        self.apply_triggers(&property, TriggerFamily::Prop, TriggerTiming::After, &target_ids)
            .await?;

        let children = self.active_children(&property.id);
        match branch_type {
            BranchType::If => {
                if self.condition_holds(&property).await? {
                    self.apply_children(&property.id, &target_ids).await?;
                }
            }
            BranchType::Hit => {
                if self.scope_flag("~attackHit") {
                    self.apply_children(&property.id, &target_ids).await?;
                }
            }
            BranchType::Miss => {
                if self.scope_flag("~attackMiss") {
                    self.apply_children(&property.id, &target_ids).await?;
                }
            }
            BranchType::FailedSave => {
                if self.scope_flag("~saveFailed") {
                    self.apply_children(&property.id, &target_ids).await?;
                }
            }
            BranchType::SuccessfulSave => {
                if self.scope_flag("~saveSucceeded") {
                    self.apply_children(&property.id, &target_ids).await?;
                }
            }
            BranchType::Random => {
                if !children.is_empty() {
                    let rolls = self
                        .roll_dice(&[DiceRequest {
                            number: 1,
                            dice_size: children.len() as u32,
                        }])
                        .await?;
                    let face = rolls.first().and_then(|r| r.first()).copied().unwrap_or(1);
                    let pick = (face.max(1) as usize - 1).min(children.len() - 1);
                    self.apply_selected(&children[pick..=pick], &target_ids).await?;
                }
            }
            BranchType::Index => {
                let index = match self.roll_calculation(&property, "condition").await? {
                    Some(rolled) => rolled.number(),
                    None => None,
                };
                if let Some(index) = index.filter(|index| index.is_finite())
                    && !children.is_empty()
                {
                    let pick = (index.floor().max(1.0) as usize).min(children.len()) - 1;
                    self.apply_selected(&children[pick..=pick], &target_ids).await?;
                }
            }
            BranchType::EachTarget => {
                if target_ids.is_empty() {
                    self.apply_children(&property.id, &[]).await?;
                } else {
                    for target_id in &target_ids {
                        self.apply_children(&property.id, &[target_id.clone()]).await?;
                    }
                }
            }
            BranchType::Choice => {
                if !children.is_empty() {
                    let chosen = self.provider.choose(&children, 1, 1).await?;
                    let chosen: Vec<PropertyId> = children
                        .iter()
                        .filter(|child| chosen.contains(child))
                        .cloned()
                        .collect();
                    self.apply_selected(&chosen, &target_ids).await?;
                }
            }
        }

        self.apply_triggers(
            &property,
            TriggerFamily::Prop,
            TriggerTiming::AfterChildren,
            &target_ids,
        )
        .await
    }

    /// A missing condition holds.
    pub(super) async fn condition_holds(&mut self, property: &Property) -> Result<bool> {
        Ok(match self.roll_calculation(property, "condition").await? {
            Some(rolled) => rolled.is_truthy(),
            None => true,
        })
    }

    fn scope_flag(&self, name: &str) -> bool {
        self.scope()
            .value(name)
            .is_some_and(|value| value.is_truthy())
    }

    async fn apply_selected(
        &mut self,
        children: &[PropertyId],
        target_ids: &[CreatureId],
    ) -> Result<()> {
        for child_id in children {
            self.apply_task(Task::Prop(PropTask {
                prop_id: child_id.clone(),
                target_ids: target_ids.to_vec(),
            }))
            .await?;
        }
        Ok(())
    }
}
