//! Properties: the typed nodes of a creature's rules tree.

mod kinds;
mod layers;
mod tree;

use std::collections::BTreeSet;

pub use kinds::{
    ActionProp, ActionTarget, ActionType, AdjustmentOperation, AdjustmentProp, AttributeConsumed,
    AttributeProp, AttributeType, BranchProp, BranchType, BuffProp, BuffRemoverProp, Calculation,
    ClassLevelProp, ClassProp, ConstantProp, DamageMultiplierProp, DamageProp, DamageSave,
    EffectOperation, EffectProp, FolderProp, InlineText, ItemConsumed, ItemProp, NoteProp,
    ProficiencyProp, PropertyKind, PropertyType, Resources, RollProp, SavingThrowProp, SkillProp,
    SkillType, SlotProp, SpellListProp, SpellProp, TargetMode, TextProp, ToggleProp, TriggerEvent,
    TriggerProp, TriggerTiming,
};
pub use layers::{
    CalculationOutcome, DerivedChange, DerivedPath, DerivedState, DerivedValue, InactiveReasons,
    InlineOutcome, PropertyUpdate, TriggerFamily, TriggerIds,
};
pub use tree::{PropertyTree, TreeError};

use crate::formula::Value;

pub type PropertyId = String;
pub type CreatureId = String;

/// The document a property tree hangs off.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RootRef {
    pub collection: String,
    pub id: CreatureId,
}

impl RootRef {
    pub fn creature(id: impl Into<CreatureId>) -> Self {
        Self {
            collection: "creatures".to_owned(),
            id: id.into(),
        }
    }
}

/// One property: common stored fields, the typed payload and the derived layer.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Property {
    #[cfg_attr(feature = "serde", serde(rename = "_id"))]
    pub id: PropertyId,
    pub root: RootRef,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub parent_id: Option<PropertyId>,
    /// Sibling ordering key, ascending; ties break by id.
    #[cfg_attr(feature = "serde", serde(default))]
    pub order: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub tags: BTreeSet<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub name: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub disabled: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub removed: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub dirty: bool,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub kind: PropertyKind,
    #[cfg_attr(feature = "serde", serde(default))]
    pub derived: DerivedState,
}

/// A stored field an action tried to write that the property does not have.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{property_type} has no writable field `{field}`")]
pub struct FieldError {
    pub property_type: PropertyType,
    pub field: String,
}

impl Property {
    pub fn new(id: impl Into<PropertyId>, kind: PropertyKind) -> Self {
        Self {
            id: id.into(),
            root: RootRef::default(),
            parent_id: None,
            order: 0.0,
            tags: BTreeSet::new(),
            name: None,
            disabled: false,
            removed: false,
            dirty: false,
            kind,
            derived: DerivedState::default(),
        }
    }

    pub fn in_creature(mut self, creature_id: impl Into<CreatureId>) -> Self {
        self.root = RootRef::creature(creature_id);
        self
    }

    pub fn child_of(mut self, parent_id: impl Into<PropertyId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn ordered(mut self, order: f64) -> Self {
        self.order = order;
        self
    }

    pub fn tagged<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn property_type(&self) -> PropertyType {
        self.kind.property_type()
    }

    pub fn variable_name(&self) -> Option<&str> {
        self.kind.variable_name()
    }

    pub fn is_active(&self) -> bool {
        !self.removed && !self.derived.is_inactive()
    }

    /// Display title: name, else variable name, else the type.
    pub fn title(&self) -> String {
        if let Some(name) = self.name.as_deref().filter(|name| !name.is_empty()) {
            return name.to_owned();
        }
        if let Some(variable) = self.variable_name() {
            return variable.to_owned();
        }
        let kind = self.property_type();
        let mut title = kind.as_ref().to_owned();
        if let Some(first) = title.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        title
    }

    pub fn calculation(&self, path: &str) -> Option<&CalculationOutcome> {
        self.derived.calculations.get(path)
    }

    pub fn output(&self, key: &str) -> Option<&Value> {
        self.derived.outputs.get(key)
    }

    pub fn output_number(&self, key: &str) -> Option<f64> {
        self.output(key).and_then(Value::as_number)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.derived.texts.get(field).map(|text| text.value.as_str())
    }

    /// Sets a stored or output field by name, as action mutations do.
    pub fn set_field(&mut self, field: &str, value: &Value) -> Result<(), FieldError> {
        let number = value.as_number().unwrap_or_default();
        let slot = self.numeric_field(field);
        match slot {
            Some(slot) => *slot = number,
            None if field == "value" => {
                self.derived.outputs.insert("value".to_owned(), value.clone());
            }
            None => return Err(self.field_error(field)),
        }
        Ok(())
    }

    /// Adds to a numeric stored or output field by name.
    pub fn inc_field(&mut self, field: &str, amount: f64) -> Result<(), FieldError> {
        if let Some(slot) = self.numeric_field(field) {
            *slot += amount;
            return Ok(());
        }
        if field == "value" {
            let current = self.output_number("value").unwrap_or_default();
            self.derived
                .outputs
                .insert("value".to_owned(), Value::Number(current + amount));
            return Ok(());
        }
        Err(self.field_error(field))
    }

    fn numeric_field(&mut self, field: &str) -> Option<&mut f64> {
        match (&mut self.kind, field) {
            (PropertyKind::Attribute(attribute), "damage") => Some(&mut attribute.damage),
            (PropertyKind::Action(action), "usesUsed") => Some(&mut action.uses_used),
            (PropertyKind::Spell(spell), "usesUsed") => Some(&mut spell.action.uses_used),
            (PropertyKind::Item(item), "quantity") => Some(&mut item.quantity),
            (PropertyKind::Buff(buff), "durationSpent") => Some(&mut buff.duration_spent),
            _ => None,
        }
    }

    fn field_error(&self, field: &str) -> FieldError {
        FieldError {
            property_type: self.property_type(),
            field: field.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_falls_back_to_variable_then_type() {
        let attribute = Property::new(
            "a",
            PropertyKind::Attribute(AttributeProp {
                variable_name: "strength".into(),
                ..AttributeProp::default()
            }),
        );
        assert_eq!(attribute.title(), "strength");
        assert_eq!(attribute.clone().named("Strength").title(), "Strength");
        let note = Property::new("n", PropertyKind::Note(NoteProp::default()));
        assert_eq!(note.title(), "Note");
    }

    #[test]
    fn action_mutations_write_known_fields() {
        let mut item = Property::new("i", PropertyKind::Item(ItemProp::default()));
        item.inc_field("quantity", -1.0).expect("items have a quantity");
        let PropertyKind::Item(payload) = &item.kind else {
            panic!("still an item");
        };
        assert_eq!(payload.quantity, 0.0);
        assert!(item.inc_field("damage", 1.0).is_err());
    }
}
