//! In-memory creature, variables, log and action stores.

use std::collections::HashMap;
use std::sync::RwLock;

use creature_core::{CreatureId, Scope};

use crate::action::EngineAction;
use crate::events::{ChangeEvent, ChangeFeed, CreatureEvent, VariablesEvent};
use crate::repository::{
    ActionStore, Creature, CreatureStore, CreatureUpdate, LogEntry, LogStore, RepositoryError,
    Result, VariablesStore,
};

/// In-memory implementation of CreatureStore.
pub struct InMemoryCreatureStore {
    creatures: RwLock<HashMap<CreatureId, Creature>>,
    feed: Option<ChangeFeed>,
}

impl InMemoryCreatureStore {
    pub fn new() -> Self {
        Self {
            creatures: RwLock::new(HashMap::new()),
            feed: None,
        }
    }

    pub fn with_feed(feed: ChangeFeed) -> Self {
        Self {
            creatures: RwLock::new(HashMap::new()),
            feed: Some(feed),
        }
    }

    fn publish(&self, creature: Creature) {
        if let Some(feed) = &self.feed {
            feed.publish(ChangeEvent::Creature(CreatureEvent { creature }));
        }
    }

    fn modify(&self, id: &str, change: impl FnOnce(&mut Creature)) -> Result<()> {
        let creature = {
            let mut creatures = self
                .creatures
                .write()
                .map_err(|_| RepositoryError::LockPoisoned)?;
            let creature = creatures
                .get_mut(id)
                .ok_or_else(|| RepositoryError::CreatureNotFound(id.to_owned()))?;
            change(creature);
            creature.clone()
        };
        self.publish(creature);
        Ok(())
    }
}

impl Default for InMemoryCreatureStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CreatureStore for InMemoryCreatureStore {
    fn get(&self, id: &str) -> Result<Option<Creature>> {
        let creatures = self
            .creatures
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(creatures.get(id).cloned())
    }

    fn insert(&self, creature: Creature) -> Result<()> {
        {
            let mut creatures = self
                .creatures
                .write()
                .map_err(|_| RepositoryError::LockPoisoned)?;
            if creatures.contains_key(&creature.id) {
                return Err(RepositoryError::AlreadyExists {
                    kind: "creature",
                    id: creature.id.clone(),
                });
            }
            creatures.insert(creature.id.clone(), creature.clone());
        }
        self.publish(creature);
        Ok(())
    }

    fn apply_update(&self, id: &str, update: &CreatureUpdate) -> Result<()> {
        self.modify(id, |creature| update.apply_to(creature))
    }

    fn mark_dirty(&self, id: &str) -> Result<()> {
        self.modify(id, |creature| creature.dirty = true)
    }
}

/// In-memory implementation of VariablesStore.
pub struct InMemoryVariablesStore {
    variables: RwLock<HashMap<CreatureId, Scope>>,
    feed: Option<ChangeFeed>,
}

impl InMemoryVariablesStore {
    pub fn new() -> Self {
        Self {
            variables: RwLock::new(HashMap::new()),
            feed: None,
        }
    }

    pub fn with_feed(feed: ChangeFeed) -> Self {
        Self {
            variables: RwLock::new(HashMap::new()),
            feed: Some(feed),
        }
    }
}

impl Default for InMemoryVariablesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl VariablesStore for InMemoryVariablesStore {
    fn get(&self, creature_id: &str) -> Result<Option<Scope>> {
        let variables = self
            .variables
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(variables.get(creature_id).cloned())
    }

    fn put(&self, creature_id: &str, scope: Scope) -> Result<()> {
        {
            let mut variables = self
                .variables
                .write()
                .map_err(|_| RepositoryError::LockPoisoned)?;
            variables.insert(creature_id.to_owned(), scope);
        }
        if let Some(feed) = &self.feed {
            feed.publish(ChangeEvent::Variables(VariablesEvent {
                creature_id: creature_id.to_owned(),
            }));
        }
        Ok(())
    }
}

/// In-memory implementation of LogStore.
#[derive(Default)]
pub struct InMemoryLogStore {
    entries: RwLock<Vec<LogEntry>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, oldest first.
    pub fn all(&self) -> Result<Vec<LogEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(entries.clone())
    }
}

impl LogStore for InMemoryLogStore {
    fn append(&self, entry: LogEntry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        entries.push(entry);
        Ok(())
    }

    fn for_creature(&self, creature_id: &str) -> Result<Vec<LogEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(entries
            .iter()
            .filter(|entry| entry.creature_id == creature_id)
            .cloned()
            .collect())
    }
}

/// In-memory implementation of ActionStore.
#[derive(Default)]
pub struct InMemoryActionStore {
    actions: RwLock<HashMap<String, EngineAction>>,
}

impl InMemoryActionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ActionStore for InMemoryActionStore {
    fn insert(&self, action: EngineAction) -> Result<()> {
        let mut actions = self
            .actions
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        if actions.contains_key(&action.id) {
            return Err(RepositoryError::AlreadyExists {
                kind: "action",
                id: action.id.clone(),
            });
        }
        actions.insert(action.id.clone(), action);
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<EngineAction>> {
        let actions = self
            .actions
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(actions.get(id).cloned())
    }

    fn remove(&self, id: &str) -> Result<Option<EngineAction>> {
        let mut actions = self
            .actions
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(actions.remove(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creature_core::ComputeError;

    #[test]
    fn compute_update_clears_dirty_and_stamps_version() {
        let store = InMemoryCreatureStore::new();
        store.insert(Creature::new("c1")).expect("insert");
        assert!(store.get("c1").expect("get").is_some_and(|c| c.dirty));

        let update = CreatureUpdate::new(vec![ComputeError::warning("slow")], 4);
        store.apply_update("c1", &update).expect("update");

        let creature = store.get("c1").expect("get").expect("stored");
        assert!(!creature.dirty);
        assert_eq!(creature.prop_count, 4);
        assert_eq!(creature.compute_errors.len(), 1);
        assert_eq!(creature.compute_version.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn missing_creature_cannot_be_marked_dirty() {
        let store = InMemoryCreatureStore::new();
        assert!(matches!(
            store.mark_dirty("ghost"),
            Err(RepositoryError::CreatureNotFound(_))
        ));
    }

    #[test]
    fn log_entries_filter_by_creature() {
        let store = InMemoryLogStore::new();
        for creature_id in ["c1", "c2", "c1"] {
            store
                .append(LogEntry {
                    creature_id: creature_id.into(),
                    tabletop_id: None,
                    action_id: None,
                    content: Vec::new(),
                    target_ids: Vec::new(),
                    date: chrono::Utc::now(),
                })
                .expect("append");
        }
        assert_eq!(store.for_creature("c1").expect("query").len(), 2);
        assert_eq!(store.all().expect("all").len(), 3);
    }
}
