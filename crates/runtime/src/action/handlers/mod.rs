//! Per-type property handlers.
//!
//! Each handler logs the property's own effect, then usually finishes through
//! [`ActionEngine::default_tail`]. Types with nothing to apply are skipped.

mod action;
mod attack;
mod branch;
mod buff;
mod check;
mod damage;
mod note;
mod reset;
mod roll;
mod spell;

use creature_core::property::TargetMode;
use creature_core::{CreatureId, Property, PropertyKind};

use super::engine::ActionEngine;
use super::error::Result;

impl ActionEngine<'_> {
    pub(super) async fn apply_property(
        &mut self,
        property: Property,
        target_ids: Vec<CreatureId>,
    ) -> Result<()> {
        match &property.kind {
            PropertyKind::Action(_) | PropertyKind::Spell(_) => {
                self.apply_action_prop(property, target_ids).await
            }
            PropertyKind::Adjustment(_) => self.apply_adjustment(property, target_ids).await,
            PropertyKind::Branch(_) => self.apply_branch(property, target_ids).await,
            PropertyKind::Buff(_) => self.apply_buff(property, target_ids).await,
            PropertyKind::BuffRemover(_) => self.apply_buff_remover(property, target_ids).await,
            PropertyKind::Damage(_) => self.apply_damage(property, target_ids).await,
            PropertyKind::Note(_) => self.apply_note(property, target_ids).await,
            PropertyKind::Roll(_) => self.apply_roll(property, target_ids).await,
            PropertyKind::SavingThrow(_) => self.apply_saving_throw(property, target_ids).await,
            PropertyKind::Toggle(_) => self.apply_toggle(property, target_ids).await,
            PropertyKind::Trigger(_) => self.apply_trigger(property, target_ids).await,
            PropertyKind::Container(_) | PropertyKind::Feature(_) | PropertyKind::Folder(_) => {
                self.default_tail(&property, &target_ids).await
            }
            PropertyKind::Attribute(_)
            | PropertyKind::Class(_)
            | PropertyKind::ClassLevel(_)
            | PropertyKind::Constant(_)
            | PropertyKind::DamageMultiplier(_)
            | PropertyKind::Effect(_)
            | PropertyKind::Item(_)
            | PropertyKind::Proficiency(_)
            | PropertyKind::Skill(_)
            | PropertyKind::Slot(_)
            | PropertyKind::SpellList(_) => Ok(()),
        }
    }

    /// `self` aims at the acting creature; `target` keeps the task's targets.
    pub(super) fn resolve_targets(
        &self,
        mode: TargetMode,
        target_ids: Vec<CreatureId>,
    ) -> Vec<CreatureId> {
        match mode {
            TargetMode::Caster => vec![self.action.creature_id.clone()],
            TargetMode::Target => target_ids,
        }
    }
}
