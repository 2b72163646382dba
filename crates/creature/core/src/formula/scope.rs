use std::collections::BTreeMap;

use super::value::Value;

/// One named entry visible to calculations.
///
/// `value` answers a bare symbol (`strength`); `fields` answer accessors
/// (`strength.modifier`).
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ScopeEntry {
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub value: Option<Value>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "BTreeMap::is_empty"))]
    pub fields: BTreeMap<String, Value>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub prop_id: Option<String>,
}

impl ScopeEntry {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_prop(mut self, prop_id: impl Into<String>) -> Self {
        self.prop_id = Some(prop_id.into());
        self
    }

    /// Field lookup where `value` doubles as the `value` field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self.fields.get(name) {
            Some(value) => Some(value),
            None if name == "value" => self.value.as_ref(),
            None => None,
        }
    }
}

/// Anything calculations can look names up in.
pub trait SymbolTable {
    fn entry(&self, name: &str) -> Option<&ScopeEntry>;
}

/// Flat name to entry map: a creature's variables, or an action's effective scope.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Scope {
    entries: BTreeMap<String, ScopeEntry>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&ScopeEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ScopeEntry> {
        self.entries.get_mut(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: ScopeEntry) -> Option<ScopeEntry> {
        self.entries.insert(name.into(), entry)
    }

    /// Sets the entry's value, keeping any fields already present.
    pub fn set_value(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entries.entry(name.into()).or_default().value = Some(value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<ScopeEntry> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).and_then(|entry| entry.value.as_ref())
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.value(name).and_then(Value::as_number)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ScopeEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SymbolTable for Scope {
    fn entry(&self, name: &str) -> Option<&ScopeEntry> {
        self.entries.get(name)
    }
}

impl FromIterator<(String, ScopeEntry)> for Scope {
    fn from_iter<I: IntoIterator<Item = (String, ScopeEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Looks names up in `top` first, then `base`.
pub struct Overlay<'a> {
    pub top: &'a dyn SymbolTable,
    pub base: &'a dyn SymbolTable,
}

impl<'a> Overlay<'a> {
    pub fn new(top: &'a dyn SymbolTable, base: &'a dyn SymbolTable) -> Self {
        Self { top, base }
    }
}

impl SymbolTable for Overlay<'_> {
    fn entry(&self, name: &str) -> Option<&ScopeEntry> {
        self.top.entry(name).or_else(|| self.base.entry(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_prefers_the_top_table() {
        let mut base = Scope::new();
        base.set_value("strength", 10.0);
        base.set_value("level", 3.0);
        let mut top = Scope::new();
        top.set_value("strength", 18.0);

        let overlay = Overlay::new(&top, &base);
        assert_eq!(
            overlay.entry("strength").and_then(|e| e.value.clone()),
            Some(Value::Number(18.0))
        );
        assert_eq!(overlay.entry("level").and_then(|e| e.value.clone()), Some(Value::Number(3.0)));
        assert!(overlay.entry("wisdom").is_none());
    }

    #[test]
    fn value_answers_the_value_field() {
        let entry = ScopeEntry::new(12.0).with_field("modifier", 1.0);
        assert_eq!(entry.field("value"), Some(&Value::Number(12.0)));
        assert_eq!(entry.field("modifier"), Some(&Value::Number(1.0)));
        assert_eq!(entry.field("total"), None);
    }
}
