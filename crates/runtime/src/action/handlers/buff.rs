use std::collections::HashMap;

use creature_core::property::{TargetMode, TriggerTiming};
use creature_core::{
    CreatureId, DerivedState, Property, PropertyId, PropertyKind, PropertyType, RootRef,
    TriggerFamily,
};

use crate::action::engine::ActionEngine;
use crate::action::error::Result;
use crate::action::types::{LogContent, Mutation, Removal};

impl ActionEngine<'_> {
    /// Copies the buff and its descendants onto each target with their
    /// calculations frozen against the caster.
    pub(super) async fn apply_buff(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        let PropertyKind::Buff(payload) = &property.kind else {
            return Ok(());
        };
        let payload = payload.clone();
        let target_ids = self.resolve_targets(payload.target, target_ids);
        let index = self.new_result(Some(&property.id), &target_ids);

        let mut content = LogContent::named(property.title()).silenced(payload.silent);
        if let Some(description) = self.render_text(&property, "description").await? {
            content = content.with_value(description);
        }
        self.log(index, content, &target_ids);

        let subtree = self.subtree(&property.id);
        let frozen = self.freeze(&subtree);

        for target_id in &target_ids {
            let next_order = self
                .creature(target_id)?
                .tree
                .iter()
                .map(|existing| existing.order)
                .fold(0.0_f64, f64::max)
                + 1.0;
            let ids: HashMap<PropertyId, PropertyId> = subtree
                .iter()
                .map(|source| (source.id.clone(), self.fresh_id(&source.id, target_id)))
                .collect();
            let inserts = subtree
                .iter()
                .zip(&frozen)
                .map(|(source, calculations)| {
                    let mut copy = source.clone();
                    copy.id = ids[&source.id].clone();
                    copy.root = RootRef::creature(target_id.clone());
                    if source.id == property.id {
                        copy.parent_id = None;
                        copy.order = next_order;
                    } else {
                        copy.parent_id = source
                            .parent_id
                            .as_ref()
                            .and_then(|parent| ids.get(parent))
                            .cloned();
                    }
                    for (path, calculation) in copy.kind.calculations_mut() {
                        if let Some(text) = calculations.get(&path) {
                            calculation.calculation = text.clone();
                        }
                    }
                    copy.derived = DerivedState::default();
                    copy.dirty = true;
                    copy
                })
                .collect();
            self.mutate(
                index,
                Mutation {
                    target_ids: vec![target_id.clone()],
                    inserts,
                    ..Mutation::default()
                },
            )?;
        }

        // The copied children apply on the target when it computes, not now.
        self.apply_triggers(&property, TriggerFamily::Prop, TriggerTiming::After, &target_ids)
            .await?;
        self.apply_triggers(
            &property,
            TriggerFamily::Prop,
            TriggerTiming::AfterChildren,
            &target_ids,
        )
        .await
    }

    /// Compiled text of every calculation in `properties`, keyed by path.
    fn freeze(&self, properties: &[Property]) -> Vec<HashMap<String, String>> {
        properties
            .iter()
            .map(|property| {
                property
                    .kind
                    .calculations()
                    .into_iter()
                    .filter_map(|(path, _)| {
                        let text = self.compile_calculation(property, &path)?;
                        Some((path, text))
                    })
                    .collect()
            })
            .collect()
    }

    /// Removes the parent buff, or the buffs on each target matching the
    /// remover's tags.
    pub(super) async fn apply_buff_remover(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        let PropertyKind::BuffRemover(payload) = &property.kind else {
            return Ok(());
        };
        let payload = payload.clone();
        let task_targets = target_ids.clone();
        let target_ids = match payload.target {
            TargetMode::Caster => vec![self.action.creature_id.clone()],
            TargetMode::Target => target_ids,
        };
        let index = self.new_result(Some(&property.id), &target_ids);
        if property.name.is_some() {
            self.log(
                index,
                LogContent::named(property.title()).silenced(payload.silent),
                &task_targets,
            );
        }

        if payload.target_parent_buff {
            let Some(buff) = self.nearest_ancestor_of_type(&property.id, PropertyType::Buff) else {
                let error = LogContent::error("Buff remover does not have a parent buff to remove")
                    .silenced(payload.silent);
                self.log(index, error, &target_ids);
                return Ok(());
            };
            let owner = self.owner_id(&buff.id).into_iter().collect::<Vec<_>>();
            self.remove_buff(index, &buff, payload.silent, owner)?;
            return self.default_tail(&property, &task_targets).await;
        }

        for target_id in &target_ids {
            self.load(target_id)?;
            let Some(tree) = self.tree(target_id) else {
                continue;
            };
            let mut targeted: Vec<(u32, Property)> = tree
                .of_type(PropertyType::Buff)
                .filter(|buff| buff.is_active())
                .filter(|buff| payload.targeting.matches(&buff.tags))
                .map(|buff| {
                    let left = tree.bounds(&buff.id).map_or(0, |(left, _)| left);
                    (left, buff.clone())
                })
                .collect();
            if payload.remove_all {
                for (_, buff) in &targeted {
                    self.remove_buff(index, buff, payload.silent, vec![target_id.clone()])?;
                }
            } else {
                targeted.sort_by(|a, b| b.0.cmp(&a.0));
                if let Some((_, buff)) = targeted.first() {
                    self.remove_buff(index, buff, payload.silent, vec![target_id.clone()])?;
                }
            }
        }

        self.default_tail(&property, &task_targets).await
    }

    fn remove_buff(
        &mut self,
        index: usize,
        buff: &Property,
        silent: bool,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        self.mutate(
            index,
            Mutation {
                target_ids,
                removals: vec![Removal {
                    prop_id: buff.id.clone(),
                }],
                contents: vec![
                    LogContent::named("Removed")
                        .with_value(buff.title())
                        .silenced(silent),
                ],
                ..Mutation::default()
            },
        )
    }
}
