//! Keeps one loaded creature current and recomputes it when it goes dirty.
//!
//! Every relevant change pushes the recompute deadline back by the debounce
//! interval, so a burst of writes costs a single compute pass.

use std::sync::{PoisonError, RwLock, Weak};

use creature_core::{CreatureId, EngineConfig};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Duration, Instant, sleep_until};
use tracing::{debug, trace, warn};

use crate::compute::compute_creature;
use crate::events::ChangeEvent;
use crate::repository::Stores;
use crate::session::LoadedCreature;

/// Background task owned by one session.
pub(crate) struct Watcher {
    pub creature_id: CreatureId,
    pub cache: Weak<RwLock<LoadedCreature>>,
    pub stores: Stores,
    pub engine: EngineConfig,
    pub debounce: Duration,
    pub properties: broadcast::Receiver<ChangeEvent>,
    pub creatures: broadcast::Receiver<ChangeEvent>,
    pub variables: broadcast::Receiver<ChangeEvent>,
}

enum Received {
    Ignored,
    Applied { recompute: bool },
    Closed,
}

impl Watcher {
    pub async fn run(mut self) {
        debug!(target: "runtime::watcher", creature_id = %self.creature_id, "watcher started");
        let mut deadline: Option<Instant> = None;
        loop {
            let received = tokio::select! {
                event = self.properties.recv() => self.receive(event),
                event = self.creatures.recv() => self.receive(event),
                event = self.variables.recv() => self.receive(event),
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    self.recompute().await;
                    continue;
                }
            };
            match received {
                Received::Ignored | Received::Applied { recompute: false } => {}
                Received::Applied { recompute: true } => {
                    deadline = Some(Instant::now() + self.debounce);
                }
                Received::Closed => break,
            }
        }
        debug!(target: "runtime::watcher", creature_id = %self.creature_id, "watcher stopped");
    }

    fn receive(&self, event: Result<ChangeEvent, RecvError>) -> Received {
        match event {
            Ok(event) if event.creature_id() == self.creature_id => self.apply(&event),
            Ok(_) => Received::Ignored,
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    target: "runtime::watcher",
                    creature_id = %self.creature_id,
                    skipped,
                    "change feed lagged, reloading"
                );
                self.reload()
            }
            Err(RecvError::Closed) => Received::Closed,
        }
    }

    fn apply(&self, event: &ChangeEvent) -> Received {
        let Some(cache) = self.cache.upgrade() else {
            return Received::Closed;
        };
        let mut cache = cache.write().unwrap_or_else(PoisonError::into_inner);
        let recompute = match event {
            ChangeEvent::Variables(_) => {
                match self.stores.variables.get(&self.creature_id) {
                    Ok(variables) => cache.variables = variables.unwrap_or_default(),
                    Err(error) => {
                        warn!(
                            target: "runtime::watcher",
                            creature_id = %self.creature_id,
                            %error,
                            "variables reload failed"
                        );
                    }
                }
                false
            }
            event => cache.apply(event),
        };
        trace!(
            target: "runtime::watcher",
            creature_id = %self.creature_id,
            topic = ?event.topic(),
            recompute
        );
        Received::Applied { recompute }
    }

    fn reload(&self) -> Received {
        let Some(cache) = self.cache.upgrade() else {
            return Received::Closed;
        };
        match LoadedCreature::load(&self.stores, &self.creature_id) {
            Ok(loaded) => {
                *cache.write().unwrap_or_else(PoisonError::into_inner) = loaded;
            }
            Err(error) => {
                warn!(
                    target: "runtime::watcher",
                    creature_id = %self.creature_id,
                    %error,
                    "reload failed"
                );
            }
        }
        Received::Applied { recompute: true }
    }

    async fn recompute(&self) {
        if self.cache.upgrade().is_none() {
            trace!(
                target: "runtime::watcher",
                creature_id = %self.creature_id,
                "session gone, skipping recompute"
            );
            return;
        }
        match compute_creature(&self.stores, &self.engine, &self.creature_id).await {
            Ok(summary) => debug!(
                target: "runtime::watcher",
                creature_id = %self.creature_id,
                diffs = summary.property_updates,
                errors = summary.compute_errors.len(),
                "debounced recompute finished"
            ),
            Err(error) => warn!(
                target: "runtime::watcher",
                creature_id = %self.creature_id,
                %error,
                "debounced recompute failed"
            ),
        }
    }
}
