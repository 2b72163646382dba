//! High-level runtime orchestrator.
//!
//! The runtime owns the stores, the change feed they publish on, and the
//! session registry whose watchers keep loaded creatures computed. It exposes
//! a builder-based API for clients to compute creatures and drive actions.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use creature_core::{EngineConfig, Scope};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::action::{
    self, ApplyOptions, EngineAction, Simulation, StoreSource, write_action_results,
};
use crate::api::{Decision, InputProvider, Result};
use crate::compute::{ComputeSummary, compute_creature};
use crate::events::{ChangeEvent, ChangeFeed, Topic};
use crate::repository::{Creature, LogEntry, Stores};
use crate::session::{SessionHandle, SessionRegistry};

/// Runtime configuration shared across the orchestrator and workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Quiet interval before a dirty loaded creature is recomputed.
    pub recompute_debounce: Duration,
    pub event_capacity: usize,
    pub max_tasks_per_action: usize,
    pub engine: EngineConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            recompute_debounce: Duration::from_millis(100),
            event_capacity: 256,
            max_tasks_per_action: 1000,
            engine: EngineConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by `CREATURE_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(millis) = env_value::<u64>("CREATURE_RECOMPUTE_DEBOUNCE_MS") {
            config.recompute_debounce = Duration::from_millis(millis);
        }
        if let Some(capacity) = env_value("CREATURE_EVENT_CAPACITY") {
            config.event_capacity = capacity;
        }
        if let Some(max_tasks) = env_value("CREATURE_MAX_TASKS") {
            config.max_tasks_per_action = max_tasks;
        }
        if let Some(max_props) = env_value("CREATURE_MAX_PROPS") {
            config.engine.max_props = max_props;
        }
        config
    }

    pub fn with_recompute_debounce(mut self, debounce: Duration) -> Self {
        self.recompute_debounce = debounce;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_max_tasks_per_action(mut self, max_tasks: usize) -> Self {
        self.max_tasks_per_action = max_tasks;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(target: "runtime::config", key, value = %raw, "ignoring unparseable setting");
            None
        }
    }
}

/// Main runtime that owns the stores and the creature sessions.
pub struct Runtime {
    config: RuntimeConfig,
    stores: Stores,
    feed: ChangeFeed,
    sessions: SessionRegistry,
}

impl Runtime {
    /// Create a new runtime builder
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Subscribe to store changes on one topic.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<ChangeEvent> {
        self.feed.subscribe(topic)
    }

    pub async fn acquire(&self, creature_id: &str) -> Result<SessionHandle> {
        self.sessions.acquire(creature_id).await
    }

    pub fn release(&self, handle: SessionHandle) -> Result<()> {
        self.sessions.release(handle)
    }

    pub fn creature(&self, creature_id: &str) -> Result<Option<Creature>> {
        Ok(self.stores.creatures.get(creature_id)?)
    }

    pub fn variables(&self, creature_id: &str) -> Result<Option<Scope>> {
        Ok(self.stores.variables.get(creature_id)?)
    }

    pub fn logs(&self, creature_id: &str) -> Result<Vec<LogEntry>> {
        Ok(self.stores.logs.for_creature(creature_id)?)
    }

    pub async fn compute_creature(&self, creature_id: &str) -> Result<ComputeSummary> {
        compute_creature(&self.stores, &self.config.engine, creature_id).await
    }

    /// Stores a pending action so it can be simulated and run by id.
    pub fn submit_action(&self, action: EngineAction) -> Result<()> {
        self.stores.actions.insert(action)?;
        Ok(())
    }

    /// Applies an action against the stores without writing anything.
    pub async fn apply_action(
        &self,
        action: &mut EngineAction,
        provider: &dyn InputProvider,
        options: ApplyOptions,
    ) -> Result<()> {
        let source = StoreSource::new(&self.stores);
        action::apply_action(
            action,
            provider,
            &source,
            options,
            self.config.max_tasks_per_action,
        )
        .await?;
        Ok(())
    }

    pub async fn simulate_action(
        &self,
        action_id: &str,
        provider: &dyn InputProvider,
    ) -> Result<Simulation> {
        action::simulate_action(
            &self.stores,
            action_id,
            provider,
            self.config.max_tasks_per_action,
        )
        .await
    }

    /// Replays a submitted action with `decisions`, then writes it.
    pub async fn run_action(
        &self,
        action_id: &str,
        decisions: Vec<Decision>,
    ) -> Result<EngineAction> {
        action::run_action(
            &self.stores,
            &self.config.engine,
            action_id,
            decisions,
            self.config.max_tasks_per_action,
        )
        .await
    }

    pub async fn write_action_results(&self, action: &EngineAction) -> Result<Vec<ComputeSummary>> {
        write_action_results(&self.stores, &self.config.engine, action).await
    }

    /// Shutdown the runtime gracefully
    pub async fn shutdown(self) -> Result<()> {
        self.sessions.close().await?;
        info!(target: "runtime::session", "runtime shut down");
        Ok(())
    }
}

/// Builder for [`Runtime`] with flexible configuration.
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    stores: Option<(Stores, ChangeFeed)>,
}

impl RuntimeBuilder {
    fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            stores: None,
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Use existing stores. `feed` must be the feed they publish on, or loaded
    /// creatures will never see their writes.
    pub fn stores(mut self, stores: Stores, feed: ChangeFeed) -> Self {
        self.stores = Some((stores, feed));
        self
    }

    /// Build the runtime; without explicit stores it starts from empty
    /// in-memory ones.
    pub fn build(self) -> Runtime {
        let (stores, feed) = self.stores.unwrap_or_else(|| {
            let feed = ChangeFeed::with_capacity(self.config.event_capacity);
            (Stores::in_memory(&feed), feed)
        });
        let sessions = SessionRegistry::new(
            stores.clone(),
            feed.clone(),
            self.config.engine.clone(),
            self.config.recompute_debounce,
        );
        Runtime {
            config: self.config,
            stores,
            feed,
            sessions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_override_defaults() {
        let config = RuntimeConfig::default()
            .with_recompute_debounce(Duration::from_millis(5))
            .with_max_tasks_per_action(10)
            .with_engine(EngineConfig::with_max_props(3));
        assert_eq!(config.recompute_debounce, Duration::from_millis(5));
        assert_eq!(config.max_tasks_per_action, 10);
        assert_eq!(config.engine.max_props, 3);
        assert_eq!(config.event_capacity, 256);
    }

    #[tokio::test]
    async fn missing_actions_are_reported() {
        let runtime = Runtime::builder().build();
        let error = runtime
            .run_action("nope", Vec::new())
            .await
            .expect_err("missing");
        assert!(matches!(error, crate::api::RuntimeError::ActionNotFound(_)));
        runtime.shutdown().await.expect("shutdown");
    }
}
