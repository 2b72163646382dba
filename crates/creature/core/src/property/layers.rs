//! The derived layer: everything a compute pass writes onto a property.
//!
//! Stored inputs live on [`Property`](super::Property) and its kind payload.
//! A compute pass only ever replaces [`DerivedState`], and write-back diffs
//! only this layer, path by path.

use std::collections::BTreeMap;

use bitflags::bitflags;

use super::PropertyId;
use crate::formula::{CalculationError, Node, Value};

bitflags! {
    /// Why a property is inactive. Empty means active.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[cfg_attr(feature = "serde", serde(transparent))]
    pub struct InactiveReasons: u8 {
        /// Disabled itself, or a disabled toggle.
        const SELF = 1 << 0;
        /// Some ancestor is inactive or an unequipped item.
        const ANCESTOR = 1 << 1;
        /// A toggle ancestor's condition is falsy.
        const TOGGLE = 1 << 2;
    }
}

/// Trigger ids linked to a property, per timing, in tree order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct TriggerIds {
    pub before: Vec<PropertyId>,
    pub after: Vec<PropertyId>,
    pub after_children: Vec<PropertyId>,
}

impl TriggerIds {
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty() && self.after_children.is_empty()
    }
}

/// Which trigger family a set of trigger ids belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum TriggerFamily {
    /// Applying the property itself.
    Prop,
    /// Damage or healing landing on an attribute.
    Damage,
    /// A check rolled against an attribute or skill.
    Check,
    /// An item spent as ammunition.
    Ammo,
}

/// Result of one calculated field.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct CalculationOutcome {
    /// The reduced value, or the rendered expression when dice or transient
    /// names remain.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub value: Option<Value>,
    /// The compiled tree with effects applied, when it is not a constant.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub value_node: Option<Node>,
    /// Value before effects and proficiencies, when any apply.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub unaffected: Option<Value>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub effect_ids: Vec<PropertyId>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub proficiency_ids: Vec<PropertyId>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub errors: Vec<CalculationError>,
    pub advantage: u32,
    pub disadvantage: u32,
    pub fail: u32,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub conditional: Vec<String>,
}

impl CalculationOutcome {
    pub fn number(&self) -> Option<f64> {
        self.value.as_ref().and_then(Value::as_number)
    }

    /// The tree the action engine should roll: the compiled tree when there is
    /// one, otherwise the constant value.
    pub fn node(&self) -> Option<Node> {
        match (&self.value_node, &self.value) {
            (Some(node), _) => Some(node.clone()),
            (None, Some(value)) => Some(Node::constant(value.clone())),
            (None, None) => None,
        }
    }
}

/// Rendered inline text.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct InlineOutcome {
    pub value: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Vec::is_empty"))]
    pub errors: Vec<CalculationError>,
}

/// Everything derived for one property during a compute pass.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct DerivedState {
    pub inactive: InactiveReasons,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub deactivating_toggle_id: Option<PropertyId>,
    pub trigger_ids: BTreeMap<TriggerFamily, TriggerIds>,
    /// Calculated field outcomes keyed by field path (`uses`,
    /// `resources.itemsConsumed.0.quantity`).
    pub calculations: BTreeMap<String, CalculationOutcome>,
    /// Per-type outputs (`value`, `modifier`, `usesLeft`, ...).
    pub outputs: BTreeMap<String, Value>,
    /// Inline text renders keyed by field name.
    pub texts: BTreeMap<String, InlineOutcome>,
}

impl DerivedState {
    pub fn is_inactive(&self) -> bool {
        !self.inactive.is_empty()
    }

    pub fn deactivated_by_self(&self) -> bool {
        self.inactive.contains(InactiveReasons::SELF)
    }

    pub fn deactivated_by_ancestor(&self) -> bool {
        self.inactive.contains(InactiveReasons::ANCESTOR)
    }

    pub fn deactivated_by_toggle(&self) -> bool {
        self.inactive.contains(InactiveReasons::TOGGLE)
    }

    pub fn triggers(&self, family: TriggerFamily) -> Option<&TriggerIds> {
        self.trigger_ids.get(&family)
    }

    /// Flattens the layer into addressable paths for diffing.
    pub fn entries(&self) -> BTreeMap<DerivedPath, DerivedValue> {
        let mut entries = BTreeMap::new();
        if !self.inactive.is_empty() {
            entries.insert(DerivedPath::Inactive, DerivedValue::Inactive(self.inactive));
        }
        if let Some(id) = &self.deactivating_toggle_id {
            entries.insert(DerivedPath::DeactivatingToggleId, DerivedValue::Id(id.clone()));
        }
        for (family, ids) in &self.trigger_ids {
            if !ids.is_empty() {
                entries.insert(DerivedPath::Triggers(*family), DerivedValue::Triggers(ids.clone()));
            }
        }
        for (path, outcome) in &self.calculations {
            entries.insert(
                DerivedPath::Calculation(path.clone()),
                DerivedValue::Calculation(outcome.clone()),
            );
        }
        for (path, value) in &self.outputs {
            entries.insert(DerivedPath::Output(path.clone()), DerivedValue::Value(value.clone()));
        }
        for (path, outcome) in &self.texts {
            entries.insert(DerivedPath::Text(path.clone()), DerivedValue::Inline(outcome.clone()));
        }
        entries
    }

    /// Writes one path. A value of the wrong shape for the path is ignored.
    pub fn set(&mut self, path: &DerivedPath, value: DerivedValue) {
        match (path, value) {
            (DerivedPath::Inactive, DerivedValue::Inactive(flags)) => self.inactive = flags,
            (DerivedPath::DeactivatingToggleId, DerivedValue::Id(id)) => {
                self.deactivating_toggle_id = Some(id);
            }
            (DerivedPath::Triggers(family), DerivedValue::Triggers(ids)) => {
                self.trigger_ids.insert(*family, ids);
            }
            (DerivedPath::Calculation(key), DerivedValue::Calculation(outcome)) => {
                self.calculations.insert(key.clone(), outcome);
            }
            (DerivedPath::Output(key), DerivedValue::Value(value)) => {
                self.outputs.insert(key.clone(), value);
            }
            (DerivedPath::Text(key), DerivedValue::Inline(outcome)) => {
                self.texts.insert(key.clone(), outcome);
            }
            _ => {}
        }
    }

    pub fn unset(&mut self, path: &DerivedPath) {
        match path {
            DerivedPath::Inactive => self.inactive = InactiveReasons::empty(),
            DerivedPath::DeactivatingToggleId => self.deactivating_toggle_id = None,
            DerivedPath::Triggers(family) => {
                self.trigger_ids.remove(family);
            }
            DerivedPath::Calculation(key) => {
                self.calculations.remove(key);
            }
            DerivedPath::Output(key) => {
                self.outputs.remove(key);
            }
            DerivedPath::Text(key) => {
                self.texts.remove(key);
            }
        }
    }
}

/// Address of one derived entry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "layer", content = "key", rename_all = "camelCase"))]
pub enum DerivedPath {
    Inactive,
    DeactivatingToggleId,
    Triggers(TriggerFamily),
    Calculation(String),
    Output(String),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum DerivedValue {
    Inactive(InactiveReasons),
    Id(PropertyId),
    Triggers(TriggerIds),
    Calculation(CalculationOutcome),
    Value(Value),
    Inline(InlineOutcome),
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DerivedChange {
    pub path: DerivedPath,
    pub value: DerivedValue,
}

/// Minimal derived-layer update for one property.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct PropertyUpdate {
    pub prop_id: PropertyId,
    pub set: Vec<DerivedChange>,
    pub unset: Vec<DerivedPath>,
}

impl PropertyUpdate {
    /// Paths whose value differs between `old` and `new`, or `None` when equal.
    pub fn diff(prop_id: &PropertyId, old: &DerivedState, new: &DerivedState) -> Option<Self> {
        let before = old.entries();
        let after = new.entries();
        let set: Vec<DerivedChange> = after
            .iter()
            .filter(|(path, value)| before.get(*path) != Some(*value))
            .map(|(path, value)| DerivedChange {
                path: path.clone(),
                value: value.clone(),
            })
            .collect();
        let unset: Vec<DerivedPath> = before
            .keys()
            .filter(|path| !after.contains_key(*path))
            .cloned()
            .collect();
        if set.is_empty() && unset.is_empty() {
            return None;
        }
        Some(Self {
            prop_id: prop_id.clone(),
            set,
            unset,
        })
    }

    pub fn apply_to(&self, derived: &mut DerivedState) {
        for path in &self.unset {
            derived.unset(path);
        }
        for change in &self.set {
            derived.set(&change.path, change.value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(value: f64) -> DerivedState {
        let mut state = DerivedState::default();
        state.outputs.insert("value".into(), Value::Number(value));
        state.outputs.insert("total".into(), Value::Number(12.0));
        state
    }

    #[test]
    fn diff_lists_only_changed_paths() {
        let id = "prop".to_string();
        let update = PropertyUpdate::diff(&id, &state(10.0), &state(12.0)).expect("changed");
        assert_eq!(update.set.len(), 1);
        assert_eq!(update.set[0].path, DerivedPath::Output("value".into()));
        assert!(update.unset.is_empty());
        assert!(PropertyUpdate::diff(&id, &state(12.0), &state(12.0)).is_none());
    }

    #[test]
    fn applying_a_diff_reproduces_the_new_state() {
        let id = "prop".to_string();
        let old = state(10.0);
        let mut new = DerivedState::default();
        new.inactive = InactiveReasons::TOGGLE;
        new.deactivating_toggle_id = Some("toggle".into());

        let update = PropertyUpdate::diff(&id, &old, &new).expect("changed");
        let mut applied = old.clone();
        update.apply_to(&mut applied);
        assert_eq!(applied, new);
        assert!(applied.deactivated_by_toggle());
    }
}
