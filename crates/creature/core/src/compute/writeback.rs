//! Pass results: compute errors and the minimal updates that persist a pass.

use std::collections::HashMap;

use crate::formula::Scope;
use crate::property::{DerivedState, Property, PropertyId, PropertyTree, PropertyUpdate};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum ComputeErrorKind {
    /// The pass aborted; whatever was collected is still written.
    Crash,
    /// Non-fatal, such as too many properties.
    Warning,
    DependencyLoop,
}

/// A creature-level problem found by a compute pass.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComputeError {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: ComputeErrorKind,
    pub details: String,
}

impl ComputeError {
    pub fn crash(details: impl Into<String>) -> Self {
        Self {
            kind: ComputeErrorKind::Crash,
            details: details.into(),
        }
    }

    pub fn warning(details: impl Into<String>) -> Self {
        Self {
            kind: ComputeErrorKind::Warning,
            details: details.into(),
        }
    }

    pub fn dependency_loop(details: impl Into<String>) -> Self {
        Self {
            kind: ComputeErrorKind::DependencyLoop,
            details: details.into(),
        }
    }

    pub fn too_many_properties(count: usize, limit: usize) -> Self {
        Self::warning(format!(
            "This character sheet has too many properties and may perform poorly ( {count} / {limit} )"
        ))
    }
}

/// Everything one compute pass produced.
#[derive(Clone, Debug, Default)]
pub struct ComputeOutcome {
    /// Derived-layer changes, in tree order; empty when nothing changed.
    pub property_updates: Vec<PropertyUpdate>,
    /// The new variables snapshot, only when it differs from the stored one.
    pub variables: Option<Scope>,
    pub compute_errors: Vec<ComputeError>,
    /// Non-removed properties, active or not.
    pub prop_count: usize,
    /// Every live property with its freshly computed derived layer, in tree order.
    pub properties: Vec<Property>,
    /// The full computed scope.
    pub scope: Scope,
}

impl ComputeOutcome {
    pub fn property(&self, id: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.id == id)
    }

    pub fn has_changes(&self) -> bool {
        !self.property_updates.is_empty() || self.variables.is_some()
    }
}

/// Per-property diffs of the derived layer against the stored one.
pub fn diff_properties(
    stored: &HashMap<PropertyId, DerivedState>,
    tree: &PropertyTree,
) -> Vec<PropertyUpdate> {
    let empty = DerivedState::default();
    tree.iter()
        .filter_map(|property| {
            let before = stored.get(&property.id).unwrap_or(&empty);
            PropertyUpdate::diff(&property.id, before, &property.derived)
        })
        .collect()
}

/// The computed scope when it differs from the stored snapshot.
pub fn diff_variables(stored: Option<&Scope>, computed: &Scope) -> Option<Scope> {
    match stored {
        Some(stored) if stored == computed => None,
        _ => Some(computed.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variables_are_written_only_when_changed() {
        let mut computed = Scope::new();
        computed.set_value("strength", 12.0);
        assert!(diff_variables(None, &computed).is_some());
        assert!(diff_variables(Some(&computed.clone()), &computed).is_none());
        let mut stale = Scope::new();
        stale.set_value("strength", 10.0);
        assert_eq!(diff_variables(Some(&stale), &computed), Some(computed));
    }

    #[test]
    fn warning_names_the_count() {
        let error = ComputeError::too_many_properties(1001, 1000);
        assert_eq!(error.kind, ComputeErrorKind::Warning);
        assert_eq!(
            error.details,
            "This character sheet has too many properties and may perform poorly ( 1001 / 1000 )"
        );
    }
}
