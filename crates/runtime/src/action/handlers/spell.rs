use creature_core::formula::format_number;
use creature_core::property::{AdjustmentOperation, AttributeType};
use creature_core::{Property, PropertyId, PropertyKind, PropertyType, ScopeEntry};

use crate::action::engine::ActionEngine;
use crate::action::error::Result;
use crate::action::types::{CastSpellTask, DamagePropTask, LogContent};
use crate::api::CastOptions;

impl ActionEngine<'_> {
    /// The lowest filled spell slot above the spell's level.
    fn suggested_slot(&self, spell: &Property) -> Option<PropertyId> {
        let PropertyKind::Spell(payload) = &spell.kind else {
            return None;
        };
        if payload.cast_without_spell_slots {
            return None;
        }
        let level = f64::from(payload.level);
        let tree = self.tree(&self.action.creature_id)?;
        let mut slots: Vec<(f64, &Property)> = tree
            .of_type(PropertyType::Attribute)
            .filter(|slot| slot.is_active())
            .filter(|slot| {
                matches!(
                    &slot.kind,
                    PropertyKind::Attribute(attribute)
                        if attribute.attribute_type == AttributeType::SpellSlot
                )
            })
            .filter(|slot| slot.output_number("value").is_some_and(|value| value > 0.0))
            .filter_map(|slot| Some((slot.output_number("spellSlotLevel")?, slot)))
            .filter(|(slot_level, _)| *slot_level > level)
            .collect();
        slots.sort_by(|a, b| a.0.total_cmp(&b.0));
        slots.first().map(|(_, slot)| slot.id.clone())
    }

    /// Asks how the spell is cast, spends the slot, then applies the spell as
    /// an action at the slot's level.
    pub(in crate::action) async fn cast_spell(&mut self, task: CastSpellTask) -> Result<()> {
        let creature_id = self.action.creature_id.clone();
        self.load(&creature_id)?;
        let suggested_spell = task.spell_id.as_deref().and_then(|id| self.property(id)).cloned();
        let suggested = CastOptions {
            spell_id: task.spell_id.clone(),
            slot_id: suggested_spell.as_ref().and_then(|spell| self.suggested_slot(spell)),
            ritual: false,
        };
        let options = self.provider.cast_spell(suggested).await?;
        let index = self.new_result(options.spell_id.as_deref(), &task.target_ids);
        let owner = [creature_id.clone()];

        let Some(spell_id) = options.spell_id.clone() else {
            let error =
                LogContent::named("Error casting spell").with_value("No spell was selected");
            self.log(index, error, &owner);
            return Ok(());
        };
        let Some(spell) = self
            .property(&spell_id)
            .filter(|spell| matches!(spell.kind, PropertyKind::Spell(_)))
            .cloned()
        else {
            let error = LogContent::named("Error casting spell")
                .with_value("The chosen spell was not found");
            self.log(index, error, &owner);
            return Ok(());
        };
        let spell_level = match &spell.kind {
            PropertyKind::Spell(payload) => f64::from(payload.level),
            _ => 0.0,
        };

        let slot = if options.ritual {
            None
        } else {
            options
                .slot_id
                .as_deref()
                .and_then(|id| self.property(id))
                .cloned()
        };
        let slot_level = slot
            .as_ref()
            .and_then(|slot| slot.output_number("spellSlotLevel"))
            .filter(|level| *level != 0.0);

        let cast_level = slot_level.unwrap_or(spell_level);
        let message = match slot_level {
            Some(level) => Some(format!(
                "Casting using a level {} spell slot",
                format_number(level)
            )),
            None if spell_level != 0.0 && options.ritual => {
                Some(format!("Ritual casting at level {}", format_number(spell_level)))
            }
            None if spell_level != 0.0 => {
                Some(format!("Casting at level {}", format_number(spell_level)))
            }
            None => None,
        };
        if let Some(message) = message {
            let content =
                LogContent::named(format!("Casting at level {}", format_number(cast_level)))
                    .with_value(message);
            self.log(index, content, &task.target_ids);
        }

        if let Some(slot) = &slot {
            self.damage_prop(DamagePropTask {
                target_ids: owner.to_vec(),
                title: Some(spell.title()),
                operation: AdjustmentOperation::Increment,
                value: 1.0,
                target_prop_id: Some(slot.id.clone()),
                stat: slot.variable_name().map(str::to_owned),
                silent: spell.kind.is_silent(),
            })
            .await?;
        }

        self.push_scope(index, "~slotLevel", ScopeEntry::new(cast_level));
        self.push_scope(index, "slotLevel", ScopeEntry::new(cast_level));
        self.apply_action_prop(spell, task.target_ids).await
    }
}
