//! JSON fixtures: creatures with their property forests.
//!
//! ```json
//! { "creatures": [ { "_id": "fighter", "name": "Fighter", "properties": [
//!     { "_id": "str", "type": "attribute", "variableName": "strength",
//!       "attributeType": "ability", "baseValue": { "calculation": "16" } }
//! ] } ] }
//! ```
//!
//! Properties may leave out `root`; they belong to the creature they are
//! listed under.

use std::path::Path;

use anyhow::{Context, Result, bail};
use creature_core::{Property, RootRef};
use creature_runtime::{Creature, Runtime};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub creatures: Vec<FixtureCreature>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureCreature {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Value>,
}

impl FixtureCreature {
    /// The creature's properties, each rooted on it.
    pub fn properties(&self) -> Result<Vec<Property>> {
        self.properties
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let mut property: Property = serde_json::from_value(with_root(raw, &self.id))
                    .with_context(|| format!("Property #{index} of `{}` is malformed", self.id))?;
                property.root = RootRef::creature(self.id.clone());
                Ok(property)
            })
            .collect()
    }
}

fn with_root(raw: &Value, creature_id: &str) -> Value {
    let mut raw = raw.clone();
    if let Value::Object(fields) = &mut raw {
        fields.entry("root").or_insert_with(|| {
            serde_json::json!({ "collection": "creatures", "id": creature_id })
        });
    }
    raw
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse fixture: {}", path.display()))?;
        if fixture.creatures.is_empty() {
            bail!("Fixture {} has no creatures", path.display());
        }
        Ok(fixture)
    }

    /// Inserts every creature and property into the runtime's stores.
    pub fn seed(&self, runtime: &Runtime) -> Result<()> {
        let stores = runtime.stores();
        for creature in &self.creatures {
            stores
                .creatures
                .insert(Creature::new(creature.id.clone()).named(creature.name.clone()))?;
            for property in creature.properties()? {
                stores.properties.insert(property)?;
            }
        }
        tracing::debug!(creatures = self.creatures.len(), "fixture seeded");
        Ok(())
    }

    /// The creature whose properties include `prop_id`.
    pub fn owner_of(&self, prop_id: &str) -> Option<&str> {
        self.creatures
            .iter()
            .find(|creature| {
                creature
                    .properties
                    .iter()
                    .any(|raw| raw.get("_id").and_then(Value::as_str) == Some(prop_id))
            })
            .map(|creature| creature.id.as_str())
    }

    pub fn creature_ids(&self) -> impl Iterator<Item = &str> {
        self.creatures.iter().map(|creature| creature.id.as_str())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const FIGHTER: &str = r#"{
        "creatures": [
            {
                "_id": "fighter",
                "name": "Fighter",
                "properties": [
                    {
                        "_id": "str",
                        "type": "attribute",
                        "variableName": "strength",
                        "attributeType": "ability",
                        "baseValue": { "calculation": "16" }
                    },
                    {
                        "_id": "sword",
                        "type": "damage",
                        "target": "target",
                        "amount": { "calculation": "1d8 + 3" }
                    }
                ]
            },
            {
                "_id": "goblin",
                "name": "Goblin",
                "properties": [
                    {
                        "_id": "goblinHp",
                        "name": "Hit Points",
                        "type": "attribute",
                        "variableName": "hitPoints",
                        "attributeType": "healthBar",
                        "baseValue": { "calculation": "12" }
                    }
                ]
            }
        ]
    }"#;

    pub(crate) fn write_fixture(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(text.as_bytes()).expect("fixture written");
        file
    }

    #[test]
    fn properties_are_rooted_on_their_creature() {
        let file = write_fixture(FIGHTER);
        let fixture = Fixture::load(file.path()).expect("load");
        let properties = fixture.creatures[1].properties().expect("properties");
        assert_eq!(properties[0].root, RootRef::creature("goblin"));
        assert_eq!(properties[0].name.as_deref(), Some("Hit Points"));
    }

    #[test]
    fn finds_the_owner_of_a_property() {
        let file = write_fixture(FIGHTER);
        let fixture = Fixture::load(file.path()).expect("load");
        assert_eq!(fixture.owner_of("sword"), Some("fighter"));
        assert_eq!(fixture.owner_of("axe"), None);
    }

    #[test]
    fn empty_fixtures_are_rejected() {
        let file = write_fixture(r#"{ "creatures": [] }"#);
        let error = Fixture::load(file.path()).expect_err("empty");
        assert!(error.to_string().contains("no creatures"));
    }

    #[test]
    fn malformed_properties_name_their_creature() {
        let file = write_fixture(
            r#"{ "creatures": [ { "_id": "c", "properties": [ { "_id": "x", "type": "nope" } ] } ] }"#,
        );
        let fixture = Fixture::load(file.path()).expect("load");
        let error = fixture.creatures[0].properties().expect_err("bad type");
        assert!(error.to_string().contains("`c`"));
    }

    #[test]
    fn builder_only_property_types_are_not_loaded() {
        for kind in ["pointBuy", "reference", "creatureTemplate"] {
            let raw = serde_json::json!({ "_id": "x", "type": kind });
            let creature = FixtureCreature {
                id: "c".into(),
                name: String::new(),
                properties: vec![raw],
            };
            assert!(creature.properties().is_err(), "{kind} should be rejected");
        }
    }
}
