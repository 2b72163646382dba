//! Refcounted creature sessions.
//!
//! The first [`SessionRegistry::acquire`] of a creature loads it into a
//! [`LoadedCreature`] cache and starts a watcher that keeps the cache current
//! from the change feed and recomputes the creature once its changes settle.
//! The last [`SessionRegistry::release`] stops the watcher and drops the cache.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

use creature_core::{CreatureId, EngineConfig, Property, PropertyTree, PropertyType, Scope};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::{Result, RuntimeError};
use crate::events::{ChangeEvent, ChangeFeed, PropertyEvent, Topic};
use crate::repository::{Creature, Stores};
use crate::workers::Watcher;

/// One creature held in memory while a session is open.
#[derive(Clone, Debug)]
pub struct LoadedCreature {
    pub creature: Creature,
    pub variables: Scope,
    tree: PropertyTree,
}

impl LoadedCreature {
    pub fn load(stores: &Stores, creature_id: &str) -> Result<Self> {
        let creature = stores
            .creatures
            .get(creature_id)?
            .ok_or_else(|| RuntimeError::CreatureNotFound(creature_id.to_owned()))?;
        let properties = stores.properties.for_root(creature_id)?;
        let variables = stores.variables.get(creature_id)?.unwrap_or_default();
        Ok(Self {
            creature,
            variables,
            tree: PropertyTree::new(properties)?,
        })
    }

    pub fn tree(&self) -> &PropertyTree {
        &self.tree
    }

    /// Folds one change into the cache. Returns whether the creature needs a
    /// recompute.
    pub fn apply(&mut self, event: &ChangeEvent) -> bool {
        match event {
            ChangeEvent::Property(PropertyEvent::Added { property, .. })
            | ChangeEvent::Property(PropertyEvent::Changed { property, .. }) => {
                self.upsert(property);
                property.dirty || property.removed
            }
            ChangeEvent::Property(PropertyEvent::Removed { prop_id, .. }) => {
                self.remove(prop_id);
                true
            }
            ChangeEvent::Creature(event) => {
                self.creature = event.creature.clone();
                event.creature.dirty
            }
            ChangeEvent::Variables(_) => false,
        }
    }

    /// Replaces a property in place when its position is unchanged; anything
    /// that moves, adds or removes a node rebuilds the tree.
    fn upsert(&mut self, property: &Property) {
        if !property.removed
            && let Some(cached) = self.tree.get_mut(&property.id)
            && cached.parent_id == property.parent_id
            && cached.order == property.order
        {
            *cached = property.clone();
            return;
        }
        let mut properties: Vec<Property> = self
            .tree
            .iter()
            .filter(|cached| cached.id != property.id)
            .cloned()
            .collect();
        if !property.removed {
            properties.push(property.clone());
        }
        self.rebuild(properties);
    }

    fn remove(&mut self, prop_id: &str) {
        if !self.tree.contains(prop_id) {
            return;
        }
        let properties: Vec<Property> = self
            .tree
            .iter()
            .filter(|cached| cached.id != prop_id)
            .cloned()
            .collect();
        self.rebuild(properties);
    }

    fn rebuild(&mut self, properties: Vec<Property>) {
        match PropertyTree::new(properties) {
            Ok(tree) => self.tree = tree,
            Err(error) => {
                warn!(
                    target: "runtime::session",
                    creature_id = %self.creature.id,
                    %error,
                    "cached tree is malformed, keeping the last good one"
                );
            }
        }
    }
}

pub(crate) fn read(cache: &RwLock<LoadedCreature>) -> RwLockReadGuard<'_, LoadedCreature> {
    cache.read().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A reader's hold on one loaded creature. Reads return owned copies.
#[derive(Clone)]
pub struct SessionHandle {
    id: u64,
    creature_id: CreatureId,
    cache: Arc<RwLock<LoadedCreature>>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn creature_id(&self) -> &str {
        &self.creature_id
    }

    pub fn creature(&self) -> Creature {
        read(&self.cache).creature.clone()
    }

    pub fn variables(&self) -> Scope {
        read(&self.cache).variables.clone()
    }

    pub fn property(&self, prop_id: &str) -> Option<Property> {
        read(&self.cache).tree.get(prop_id).cloned()
    }

    /// Every live property, in tree order.
    pub fn properties(&self) -> Vec<Property> {
        read(&self.cache).tree.iter().cloned().collect()
    }

    pub fn properties_of_type(&self, kind: PropertyType) -> Vec<Property> {
        read(&self.cache).tree.of_type(kind).cloned().collect()
    }

    /// Nearest first.
    pub fn ancestors(&self, prop_id: &str) -> Vec<Property> {
        read(&self.cache)
            .tree
            .ancestors(prop_id)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn descendants(&self, prop_id: &str) -> Vec<Property> {
        read(&self.cache).tree.descendants(prop_id).to_vec()
    }

    pub fn children(&self, prop_id: &str) -> Vec<Property> {
        read(&self.cache)
            .tree
            .children(prop_id)
            .into_iter()
            .cloned()
            .collect()
    }
}

struct Session {
    cache: Arc<RwLock<LoadedCreature>>,
    handles: HashSet<u64>,
    watcher: JoinHandle<()>,
}

/// Loaded creatures, shared by everyone reading them.
pub struct SessionRegistry {
    stores: Stores,
    feed: ChangeFeed,
    engine: EngineConfig,
    debounce: Duration,
    sessions: Mutex<HashMap<CreatureId, Session>>,
    next_handle: AtomicU64,
}

impl SessionRegistry {
    pub fn new(stores: Stores, feed: ChangeFeed, engine: EngineConfig, debounce: Duration) -> Self {
        Self {
            stores,
            feed,
            engine,
            debounce,
            sessions: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Opens a hold on `creature_id`, loading it on first use.
    ///
    /// Must be called from within a Tokio runtime; the first hold spawns the
    /// creature's watcher.
    pub async fn acquire(&self, creature_id: &str) -> Result<SessionHandle> {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let mut sessions = lock(&self.sessions);
        if let Some(session) = sessions.get_mut(creature_id) {
            session.handles.insert(id);
            return Ok(SessionHandle {
                id,
                creature_id: creature_id.to_owned(),
                cache: session.cache.clone(),
            });
        }

        // Subscribe before loading so no write between the two is missed.
        let properties = self.feed.subscribe(Topic::Properties);
        let creatures = self.feed.subscribe(Topic::Creatures);
        let variables = self.feed.subscribe(Topic::Variables);
        let cache = Arc::new(RwLock::new(LoadedCreature::load(&self.stores, creature_id)?));

        let watcher = Watcher {
            creature_id: creature_id.to_owned(),
            cache: Arc::downgrade(&cache),
            stores: self.stores.clone(),
            engine: self.engine.clone(),
            debounce: self.debounce,
            properties,
            creatures,
            variables,
        };
        let watcher = tokio::spawn(watcher.run());
        sessions.insert(
            creature_id.to_owned(),
            Session {
                cache: cache.clone(),
                handles: HashSet::from([id]),
                watcher,
            },
        );
        debug!(target: "runtime::session", creature_id, handle = id, "creature loaded");
        Ok(SessionHandle {
            id,
            creature_id: creature_id.to_owned(),
            cache,
        })
    }

    /// Drops a hold. The last one unloads the creature and cancels any
    /// pending recompute.
    pub fn release(&self, handle: SessionHandle) -> Result<()> {
        let mut sessions = lock(&self.sessions);
        let Some(session) = sessions.get_mut(&handle.creature_id) else {
            return Err(RuntimeError::SessionReleased(handle.id));
        };
        if !session.handles.remove(&handle.id) {
            return Err(RuntimeError::SessionReleased(handle.id));
        }
        if session.handles.is_empty()
            && let Some(session) = sessions.remove(&handle.creature_id)
        {
            session.watcher.abort();
            debug!(
                target: "runtime::session",
                creature_id = %handle.creature_id,
                "creature unloaded"
            );
        }
        Ok(())
    }

    pub fn is_loaded(&self, creature_id: &str) -> bool {
        lock(&self.sessions).contains_key(creature_id)
    }

    /// Number of open holds on `creature_id`.
    pub fn holds(&self, creature_id: &str) -> usize {
        lock(&self.sessions)
            .get(creature_id)
            .map_or(0, |session| session.handles.len())
    }

    /// Unloads everything.
    pub fn clear(&self) {
        for (_, session) in lock(&self.sessions).drain() {
            session.watcher.abort();
        }
    }

    /// Unloads everything and waits for the watchers to stop.
    pub async fn close(&self) -> Result<()> {
        let watchers: Vec<JoinHandle<()>> = lock(&self.sessions)
            .drain()
            .map(|(_, session)| session.watcher)
            .collect();
        for watcher in watchers {
            watcher.abort();
            match watcher.await {
                Ok(()) => {}
                Err(error) if error.is_cancelled() => {}
                Err(error) => return Err(RuntimeError::WorkerJoin(error)),
            }
        }
        Ok(())
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CreatureEvent, PropertyEvent};
    use creature_core::PropertyKind;
    use creature_core::property::NoteProp;

    fn note(id: &str) -> Property {
        Property::new(id, PropertyKind::Note(NoteProp::default())).in_creature("c1")
    }

    fn loaded() -> LoadedCreature {
        LoadedCreature {
            creature: Creature::new("c1"),
            variables: Scope::new(),
            tree: PropertyTree::default(),
        }
    }

    #[test]
    fn dirty_properties_ask_for_a_recompute() {
        let mut cache = loaded();
        let mut property = note("n1");
        assert!(!cache.apply(&ChangeEvent::Property(PropertyEvent::Added {
            root_id: "c1".into(),
            property: Box::new(property.clone()),
        })));
        assert!(cache.tree().contains("n1"));

        property.dirty = true;
        assert!(cache.apply(&ChangeEvent::Property(PropertyEvent::Changed {
            root_id: "c1".into(),
            property: Box::new(property),
        })));
    }

    #[test]
    fn removals_drop_the_property() {
        let mut cache = loaded();
        cache.apply(&ChangeEvent::Property(PropertyEvent::Added {
            root_id: "c1".into(),
            property: Box::new(note("n1")),
        }));
        assert!(cache.apply(&ChangeEvent::Property(PropertyEvent::Removed {
            root_id: "c1".into(),
            prop_id: "n1".into(),
        })));
        assert!(!cache.tree().contains("n1"));
    }

    #[test]
    fn value_changes_patch_the_cached_node() {
        let mut cache = loaded();
        for id in ["n1", "n2"] {
            cache.apply(&ChangeEvent::Property(PropertyEvent::Added {
                root_id: "c1".into(),
                property: Box::new(note(id)),
            }));
        }
        let mut renamed = note("n1").named("Renamed");
        renamed.dirty = true;
        cache.apply(&ChangeEvent::Property(PropertyEvent::Changed {
            root_id: "c1".into(),
            property: Box::new(renamed),
        }));
        let names: Vec<Option<&str>> = cache.tree().iter().map(|p| p.name.as_deref()).collect();
        assert_eq!(names, vec![Some("Renamed"), None]);

        let moved = note("n2").child_of("n1");
        cache.apply(&ChangeEvent::Property(PropertyEvent::Changed {
            root_id: "c1".into(),
            property: Box::new(moved),
        }));
        assert_eq!(cache.tree().parent("n2").map(|p| p.id.as_str()), Some("n1"));
    }

    #[test]
    fn a_clean_creature_needs_nothing() {
        let mut cache = loaded();
        let mut creature = Creature::new("c1");
        creature.dirty = false;
        assert!(!cache.apply(&ChangeEvent::Creature(CreatureEvent { creature })));
        assert!(!cache.creature.dirty);
    }
}
