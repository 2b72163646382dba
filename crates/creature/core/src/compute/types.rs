//! Per-type computation of property and variable nodes.
//!
//! Property nodes compute what a property knows on its own. Variable nodes
//! pick the defining property, apply the effects and proficiencies that
//! target the variable by name, and publish the scope entry.
//!
//! When several active properties define one variable, the last in tree order
//! defines it and the others are marked `overridden`. Attributes and skills
//! start from the highest base value among their definers.

use super::activation::deactivate_by_toggle;
use super::aggregate::EffectStack;
use super::evaluate::{Computation, fold, property_entry};
use super::graph::{EdgeKind, NodeKey};
use crate::formula::{CalculationError, Context, Node, ScopeEntry, Value};
use crate::property::{
    AttributeType, CalculationOutcome, Property, PropertyId, PropertyKind, PropertyType,
};

fn calculation_number(property: &Property, path: &str) -> Option<f64> {
    property.calculation(path).and_then(CalculationOutcome::number)
}

fn calculation_value(property: &Property, path: &str) -> Option<Value> {
    property
        .calculation(path)
        .filter(|outcome| outcome.value_node.is_none())
        .and_then(|outcome| outcome.value.clone())
}

impl Computation {
    pub(super) fn compute_property(&mut self, id: &str) {
        let Some(kind) = self.tree.get(id).map(Property::property_type) else {
            return;
        };
        match kind {
            PropertyType::Attribute => {
                self.finish_attribute(id, None, &EffectStack::new());
            }
            PropertyType::Skill => {
                self.finish_skill(id, &EffectStack::new());
            }
            PropertyType::Action | PropertyType::Spell => self.compute_action(id),
            PropertyType::Constant => self.compute_constant(id),
            PropertyType::Slot => self.compute_slot(id),
            PropertyType::Toggle => self.compute_toggle(id),
            _ => {}
        }
    }

    pub(super) fn compute_variable(&mut self, i: usize, name: &str) {
        let levels = self.linked_active(i, EdgeKind::ClassLevel);
        let classes: Vec<String> = self
            .graph
            .linked(i, EdgeKind::Level)
            .filter_map(|key| match key {
                NodeKey::Variable(class) => Some(class.clone()),
                _ => None,
            })
            .collect();
        let multipliers = self.linked_active(i, EdgeKind::DamageMultiplier);
        let definers = self.linked_active(i, EdgeKind::Definition);

        if !classes.is_empty() {
            let total: f64 = classes
                .iter()
                .filter_map(|class| self.scope.number(class))
                .sum();
            self.scope.insert(name, ScopeEntry::new(total));
            return;
        }
        if !levels.is_empty() {
            self.compute_class(name, &levels, definers.last());
            return;
        }
        if !multipliers.is_empty() {
            self.compute_multiplier(name, &multipliers);
            return;
        }
        let Some((defining, overridden)) = definers.split_last() else {
            return;
        };
        for id in overridden {
            if let Some(property) = self.tree.get_mut(id) {
                property
                    .derived
                    .outputs
                    .insert("overridden".to_owned(), Value::Bool(true));
            }
        }

        let effects = self.linked_active(i, EdgeKind::Effect);
        let proficiencies = self.linked_active(i, EdgeKind::Proficiency);
        let kind = self.tree.get(defining).map(Property::property_type);
        let entry = match kind {
            Some(PropertyType::Attribute) => {
                let base = definers
                    .iter()
                    .filter_map(|id| self.tree.get(id))
                    .filter(|p| p.property_type() == PropertyType::Attribute)
                    .map(|p| calculation_number(p, "baseValue").unwrap_or_default())
                    .reduce(f64::max);
                let stack = self.effect_stack(&effects, &proficiencies);
                self.finish_attribute(defining, base, &stack)
            }
            Some(PropertyType::Skill) => {
                let stack = self.effect_stack(&effects, &proficiencies);
                self.finish_skill(defining, &stack)
            }
            Some(_) => self.tree.get(defining).and_then(|p| self.definition_entry(p)),
            None => None,
        };
        if let Some(entry) = entry {
            self.scope.insert(name, entry);
        }
    }

    /// Scope entry of a property that defines a variable without aggregation.
    fn definition_entry(&self, property: &Property) -> Option<ScopeEntry> {
        let entry = match &property.kind {
            PropertyKind::Constant(_) | PropertyKind::Toggle(_) => {
                ScopeEntry::new(property.output("value")?.clone())
            }
            PropertyKind::Roll(_) => ScopeEntry::new(calculation_value(property, "roll")?),
            PropertyKind::Class(_) => ScopeEntry::new(0.0),
            _ => property_entry(property),
        };
        Some(entry.with_prop(property.id.clone()))
    }

    /// Attribute totals. `base` replaces the property's own base value.
    pub(super) fn finish_attribute(
        &mut self,
        id: &str,
        base: Option<f64>,
        stack: &EffectStack,
    ) -> Option<ScopeEntry> {
        let bonus = self.proficiency_bonus();
        let constitution = self
            .scope
            .get("constitution")
            .and_then(|entry| entry.field("modifier"))
            .and_then(Value::as_number);
        let property = self.tree.get_mut(id)?;
        let own_base = calculation_number(property, "baseValue").unwrap_or_default();
        let spell_slot_level = calculation_number(property, "spellSlotLevel");
        let PropertyKind::Attribute(attribute) = &property.kind else {
            return None;
        };
        let base = base.unwrap_or(own_base);
        let mut context = Context::new();
        let total = fold(&stack.apply(Node::number(base), bonus), &mut context)
            .as_number()
            .unwrap_or(base);
        let damage = attribute.damage;
        let value = total - damage;
        let attribute_type = attribute.attribute_type;

        let mut entry = ScopeEntry::new(value)
            .with_field("total", total)
            .with_field("damage", damage)
            .with_field("attributeType", attribute_type.as_ref())
            .with_prop(id);
        let outputs = &mut property.derived.outputs;
        outputs.insert("total".to_owned(), Value::Number(total));
        outputs.insert("value".to_owned(), Value::Number(value));
        if stack.proficiency() > 0.0 {
            outputs.insert("proficiency".to_owned(), Value::Number(stack.proficiency()));
            entry = entry.with_field("proficiency", stack.proficiency());
        }
        match attribute_type {
            AttributeType::Ability => {
                let modifier = ((value - 10.0) / 2.0).floor();
                outputs.insert("modifier".to_owned(), Value::Number(modifier));
                entry = entry.with_field("modifier", modifier);
            }
            AttributeType::SpellSlot => {
                if let Some(level) = spell_slot_level {
                    outputs.insert("spellSlotLevel".to_owned(), Value::Number(level));
                    entry = entry.with_field("spellSlotLevel", level);
                }
            }
            AttributeType::HitDice => {
                if let Some(modifier) = constitution {
                    outputs.insert("constitutionMod".to_owned(), Value::Number(modifier));
                    entry = entry.with_field("constitutionMod", modifier);
                }
            }
            _ => {}
        }
        Some(entry)
    }

    /// Skill value: ability modifier + proficiency + base value + effects.
    pub(super) fn finish_skill(&mut self, id: &str, stack: &EffectStack) -> Option<ScopeEntry> {
        let bonus = self.proficiency_bonus();
        let (ability, base_proficiency) = match &self.tree.get(id)?.kind {
            PropertyKind::Skill(skill) => (skill.ability.clone(), skill.base_proficiency),
            _ => return None,
        };
        let ability_mod = ability
            .as_deref()
            .and_then(|name| self.scope.get(name))
            .and_then(|entry| entry.field("modifier"))
            .and_then(Value::as_number)
            .unwrap_or_default();

        let mut stack = stack.clone();
        if let Some(fraction) = base_proficiency {
            stack.proficient(fraction);
        }
        let property = self.tree.get_mut(id)?;
        let base_value = calculation_number(property, "baseValue").unwrap_or_default();
        let base = ability_mod + base_value;
        let mut context = Context::new();
        let value = fold(&stack.apply(Node::number(base), bonus), &mut context)
            .as_number()
            .unwrap_or(base);
        let passive = 10.0 + value + stack.passive_add();
        let conditional = stack.conditional();

        let outputs = &mut property.derived.outputs;
        outputs.insert("value".to_owned(), Value::Number(value));
        outputs.insert("abilityMod".to_owned(), Value::Number(ability_mod));
        outputs.insert("proficiency".to_owned(), Value::Number(stack.proficiency()));
        outputs.insert("passiveBonus".to_owned(), Value::Number(stack.passive_add()));
        outputs.insert("passive".to_owned(), Value::Number(passive));
        let mut entry = ScopeEntry::new(value)
            .with_field("abilityMod", ability_mod)
            .with_field("proficiency", stack.proficiency())
            .with_field("passive", passive)
            .with_prop(id);
        for (key, count) in [
            ("advantage", stack.advantage()),
            ("disadvantage", stack.disadvantage()),
            ("fail", stack.fail()),
        ] {
            if count > 0 {
                outputs.insert(key.to_owned(), Value::Number(f64::from(count)));
                entry = entry.with_field(key, f64::from(count));
            }
        }
        if !conditional.is_empty() {
            outputs.insert("conditional".to_owned(), Value::Text(conditional.join("\n")));
        }
        Some(entry)
    }

    fn compute_class(&mut self, name: &str, levels: &[PropertyId], class_id: Option<&PropertyId>) {
        let level = levels
            .iter()
            .filter_map(|id| match self.tree.get(id).map(|p| &p.kind) {
                Some(PropertyKind::ClassLevel(class_level)) => Some(class_level.level),
                _ => None,
            })
            .max()
            .unwrap_or_default();
        let level = f64::from(level);
        let mut entry = ScopeEntry::new(level);
        if let Some(class) = class_id.and_then(|id| self.tree.get_mut(id)) {
            class
                .derived
                .outputs
                .insert("level".to_owned(), Value::Number(level));
            entry = entry.with_prop(class.id.clone());
        }
        self.scope.insert(name, entry);
    }

    fn compute_multiplier(&mut self, name: &str, multipliers: &[PropertyId]) {
        let values: Vec<f64> = multipliers
            .iter()
            .filter_map(|id| match self.tree.get(id).map(|p| &p.kind) {
                Some(PropertyKind::DamageMultiplier(multiplier)) => Some(multiplier.value),
                _ => None,
            })
            .collect();
        let immune = values.iter().any(|&v| v == 0.0);
        let resistant = values.iter().any(|&v| v > 0.0 && v < 1.0);
        let vulnerable = values.iter().any(|&v| v > 1.0);
        let multiplier = if immune {
            0.0
        } else if resistant && !vulnerable {
            0.5
        } else if vulnerable && !resistant {
            2.0
        } else {
            1.0
        };
        self.scope.insert(name, ScopeEntry::new(multiplier));
    }

    fn compute_constant(&mut self, id: &str) {
        let Some(property) = self.tree.get_mut(id) else {
            return;
        };
        let value = calculation_value(property, "calculation");
        match value {
            Some(value) => {
                property.derived.outputs.insert("value".to_owned(), value);
            }
            None => {
                if let Some(outcome) = property.derived.calculations.get_mut("calculation")
                    && outcome.errors.is_empty()
                    && outcome.value.is_some()
                {
                    outcome.errors.push(CalculationError::evaluation(
                        "Constants can't contain dice or unresolved names",
                    ));
                }
            }
        }
    }

    fn compute_toggle(&mut self, id: &str) {
        let Some(property) = self.tree.get_mut(id) else {
            return;
        };
        let PropertyKind::Toggle(toggle) = &property.kind else {
            return;
        };
        let condition = property
            .calculation("condition")
            .filter(|outcome| outcome.value_node.is_none())
            .and_then(|outcome| outcome.value.as_ref())
            .is_some_and(Value::is_truthy);
        let enabled = toggle.enabled || (!property.disabled && condition);
        let active = property.is_active();
        property
            .derived
            .outputs
            .insert("value".to_owned(), Value::Bool(enabled));
        if active && !enabled {
            deactivate_by_toggle(&mut self.tree, id);
        }
    }

    fn compute_action(&mut self, id: &str) {
        let Some(property) = self.tree.get(id) else {
            return;
        };
        let Some(action) = property.kind.action() else {
            return;
        };
        let mut outputs: Vec<(String, Value)> = Vec::new();
        let mut insufficient = false;

        if let Some(uses) = calculation_number(property, "uses") {
            let left = uses - action.uses_used;
            outputs.push(("usesLeft".to_owned(), Value::Number(left)));
        }

        for (i, consumed) in action.resources.items_consumed.iter().enumerate() {
            let path = format!("resources.itemsConsumed.{i}");
            let quantity = calculation_number(property, &format!("{path}.quantity")).unwrap_or(1.0);
            let item = consumed
                .item_id
                .as_deref()
                .and_then(|item_id| self.tree.get(item_id))
                .filter(|item| item.is_active());
            match item.map(|item| (item, &item.kind)) {
                Some((item, PropertyKind::Item(payload))) => {
                    outputs.push((format!("{path}.available"), Value::Number(payload.quantity)));
                    outputs.push((format!("{path}.itemName"), Value::text(item.title())));
                    if payload.quantity < quantity {
                        insufficient = true;
                    }
                }
                _ => insufficient = true,
            }
        }

        for (i, consumed) in action.resources.attributes_consumed.iter().enumerate() {
            let path = format!("resources.attributesConsumed.{i}");
            let quantity =
                calculation_number(property, &format!("{path}.quantity")).unwrap_or_default();
            let Some(name) = consumed.variable_name.as_deref().filter(|n| !n.is_empty()) else {
                continue;
            };
            let entry = self.scope.get(name);
            let available = entry
                .and_then(|entry| entry.value.as_ref())
                .and_then(Value::as_number)
                .unwrap_or_default();
            outputs.push((format!("{path}.available"), Value::Number(available)));
            let stat_name = entry
                .and_then(|entry| entry.prop_id.as_deref())
                .and_then(|prop_id| self.tree.get(prop_id))
                .map(Property::title);
            if let Some(stat_name) = stat_name {
                outputs.push((format!("{path}.statName"), Value::text(stat_name)));
            }
            if available < quantity {
                insufficient = true;
            }
        }

        if insufficient {
            outputs.push(("insufficientResources".to_owned(), Value::Bool(true)));
        }
        if let Some(property) = self.tree.get_mut(id) {
            property.derived.outputs.extend(outputs);
        }
    }

    fn compute_slot(&mut self, id: &str) {
        let filled = self
            .tree
            .children(id)
            .into_iter()
            .filter(|child| child.is_active())
            .count() as f64;
        let Some(property) = self.tree.get_mut(id) else {
            return;
        };
        let expected = calculation_number(property, "quantityExpected");
        let outputs = &mut property.derived.outputs;
        outputs.insert("totalFilled".to_owned(), Value::Number(filled));
        if let Some(expected) = expected.filter(|&n| n > 0.0) {
            outputs.insert("spaceLeft".to_owned(), Value::Number(expected - filled));
        }
    }
}
