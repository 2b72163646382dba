//! In-memory PropertyStore implementation for tests and local runs.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use creature_core::{Property, PropertyId, PropertyTree, PropertyUpdate};

use crate::events::{ChangeEvent, ChangeFeed, PropertyEvent};
use crate::repository::{PropertyStore, RepositoryError, Result};

/// In-memory implementation of PropertyStore.
///
/// Removed properties stay in the map with `removed` set, as they would in a
/// document store.
pub struct InMemoryPropertyStore {
    properties: RwLock<HashMap<PropertyId, Property>>,
    feed: Option<ChangeFeed>,
}

impl InMemoryPropertyStore {
    /// Create a new empty store that publishes nothing.
    pub fn new() -> Self {
        Self {
            properties: RwLock::new(HashMap::new()),
            feed: None,
        }
    }

    /// Create a store that publishes every write on `feed`.
    pub fn with_feed(feed: ChangeFeed) -> Self {
        Self {
            properties: RwLock::new(HashMap::new()),
            feed: Some(feed),
        }
    }

    fn publish(&self, event: PropertyEvent) {
        if let Some(feed) = &self.feed {
            feed.publish(ChangeEvent::Property(event));
        }
    }

    fn changed(&self, property: &Property) {
        self.publish(PropertyEvent::Changed {
            root_id: property.root.id.clone(),
            property: Box::new(property.clone()),
        });
    }
}

impl Default for InMemoryPropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Sorts one creature's properties into tree order. A malformed forest falls
/// back to sibling order so callers still see every property.
fn tree_order(mut properties: Vec<Property>) -> Vec<Property> {
    match PropertyTree::new(properties.clone()) {
        Ok(tree) => tree.into_properties(),
        Err(error) => {
            tracing::warn!(target: "runtime::store", %error, "property forest is malformed");
            properties.sort_by(|a, b| a.order.total_cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
            properties
        }
    }
}

impl PropertyStore for InMemoryPropertyStore {
    fn get(&self, id: &str) -> Result<Option<Property>> {
        let properties = self
            .properties
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(properties.get(id).cloned())
    }

    fn for_root(&self, creature_id: &str) -> Result<Vec<Property>> {
        let owned: Vec<Property> = {
            let properties = self
                .properties
                .read()
                .map_err(|_| RepositoryError::LockPoisoned)?;
            properties
                .values()
                .filter(|property| property.root.id == creature_id && !property.removed)
                .cloned()
                .collect()
        };
        Ok(tree_order(owned))
    }

    fn insert(&self, property: Property) -> Result<()> {
        {
            let mut properties = self
                .properties
                .write()
                .map_err(|_| RepositoryError::LockPoisoned)?;
            if properties.contains_key(&property.id) {
                return Err(RepositoryError::AlreadyExists {
                    kind: "property",
                    id: property.id.clone(),
                });
            }
            properties.insert(property.id.clone(), property.clone());
        }
        self.publish(PropertyEvent::Added {
            root_id: property.root.id.clone(),
            property: Box::new(property),
        });
        Ok(())
    }

    fn update(&self, property: Property) -> Result<()> {
        {
            let mut properties = self
                .properties
                .write()
                .map_err(|_| RepositoryError::LockPoisoned)?;
            if !properties.contains_key(&property.id) {
                return Err(RepositoryError::PropertyNotFound(property.id.clone()));
            }
            properties.insert(property.id.clone(), property.clone());
        }
        self.changed(&property);
        Ok(())
    }

    fn apply_update(&self, update: &PropertyUpdate) -> Result<()> {
        let property = {
            let mut properties = self
                .properties
                .write()
                .map_err(|_| RepositoryError::LockPoisoned)?;
            let property = properties
                .get_mut(&update.prop_id)
                .ok_or_else(|| RepositoryError::PropertyNotFound(update.prop_id.clone()))?;
            update.apply_to(&mut property.derived);
            property.clone()
        };
        self.changed(&property);
        Ok(())
    }

    fn clear_dirty(&self, creature_id: &str) -> Result<usize> {
        let cleared: Vec<Property> = {
            let mut properties = self
                .properties
                .write()
                .map_err(|_| RepositoryError::LockPoisoned)?;
            properties
                .values_mut()
                .filter(|property| property.root.id == creature_id && property.dirty)
                .map(|property| {
                    property.dirty = false;
                    property.clone()
                })
                .collect()
        };
        for property in &cleared {
            self.changed(property);
        }
        Ok(cleared.len())
    }

    fn soft_remove(&self, id: &str) -> Result<()> {
        let root_id = {
            let mut properties = self
                .properties
                .write()
                .map_err(|_| RepositoryError::LockPoisoned)?;
            let property = properties
                .get_mut(id)
                .ok_or_else(|| RepositoryError::PropertyNotFound(id.to_owned()))?;
            property.removed = true;
            property.root.id.clone()
        };
        self.publish(PropertyEvent::Removed {
            root_id,
            prop_id: id.to_owned(),
        });
        Ok(())
    }

    fn remove_subtree(&self, id: &str) -> Result<usize> {
        let removed: Vec<(String, PropertyId)> = {
            let mut properties = self
                .properties
                .write()
                .map_err(|_| RepositoryError::LockPoisoned)?;
            let root_id = properties
                .get(id)
                .map(|property| property.root.id.clone())
                .ok_or_else(|| RepositoryError::PropertyNotFound(id.to_owned()))?;

            let mut subtree: HashSet<PropertyId> = HashSet::from([id.to_owned()]);
            loop {
                let before = subtree.len();
                for property in properties.values() {
                    if property.root.id == root_id
                        && let Some(parent) = &property.parent_id
                        && subtree.contains(parent)
                    {
                        subtree.insert(property.id.clone());
                    }
                }
                if subtree.len() == before {
                    break;
                }
            }

            subtree
                .into_iter()
                .filter_map(|prop_id| {
                    let property = properties.get_mut(&prop_id)?;
                    if property.removed {
                        return None;
                    }
                    property.removed = true;
                    Some((root_id.clone(), prop_id))
                })
                .collect()
        };
        for (root_id, prop_id) in &removed {
            self.publish(PropertyEvent::Removed {
                root_id: root_id.clone(),
                prop_id: prop_id.clone(),
            });
        }
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creature_core::PropertyKind;
    use creature_core::property::{FolderProp, NoteProp};

    fn store() -> InMemoryPropertyStore {
        let store = InMemoryPropertyStore::new();
        let properties = [
            Property::new("b", PropertyKind::Note(NoteProp::default())).ordered(2.0),
            Property::new("a", PropertyKind::Folder(FolderProp::default())).ordered(1.0),
            Property::new("a1", PropertyKind::Note(NoteProp::default())).child_of("a"),
            Property::new("a1x", PropertyKind::Note(NoteProp::default())).child_of("a1"),
        ];
        for property in properties {
            store
                .insert(property.in_creature("c1"))
                .expect("insert property");
        }
        store
    }

    fn ids(properties: &[Property]) -> Vec<&str> {
        properties.iter().map(|property| property.id.as_str()).collect()
    }

    #[test]
    fn for_root_returns_tree_order() {
        let store = store();
        let properties = store.for_root("c1").expect("for_root");
        assert_eq!(ids(&properties), vec!["a", "a1", "a1x", "b"]);
        assert!(store.for_root("other").expect("for_root").is_empty());
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let store = store();
        let duplicate = Property::new("a", PropertyKind::Note(NoteProp::default()));
        assert!(matches!(
            store.insert(duplicate),
            Err(RepositoryError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn remove_subtree_flags_descendants() {
        let store = store();
        assert_eq!(store.remove_subtree("a").expect("remove"), 3);
        assert_eq!(ids(&store.for_root("c1").expect("for_root")), vec!["b"]);
        let removed = store.get("a1x").expect("get").expect("still stored");
        assert!(removed.removed);
    }

    #[tokio::test]
    async fn writes_are_published() {
        let feed = ChangeFeed::new();
        let mut rx = feed.subscribe(crate::events::Topic::Properties);
        let store = InMemoryPropertyStore::with_feed(feed);
        store
            .insert(Property::new("n", PropertyKind::Note(NoteProp::default())).in_creature("c1"))
            .expect("insert");
        store.soft_remove("n").expect("remove");

        let added = rx.recv().await.expect("added");
        assert!(matches!(added, ChangeEvent::Property(PropertyEvent::Added { .. })));
        let removed = rx.recv().await.expect("removed");
        assert!(matches!(
            removed,
            ChangeEvent::Property(PropertyEvent::Removed { ref prop_id, .. }) if prop_id == "n"
        ));
    }
}
