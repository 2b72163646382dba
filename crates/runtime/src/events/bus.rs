//! Topic-based change feed implementation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::types::{CreatureEvent, PropertyEvent, VariablesEvent};

/// Topics for event routing
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Topic {
    /// Property added, changed or removed
    Properties,
    /// Creature document changes
    Creatures,
    /// Variables snapshot replaced
    Variables,
}

/// Event wrapper that carries the topic and typed event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChangeEvent {
    Property(PropertyEvent),
    Creature(CreatureEvent),
    Variables(VariablesEvent),
}

impl ChangeEvent {
    pub fn topic(&self) -> Topic {
        match self {
            ChangeEvent::Property(_) => Topic::Properties,
            ChangeEvent::Creature(_) => Topic::Creatures,
            ChangeEvent::Variables(_) => Topic::Variables,
        }
    }

    /// The creature the change belongs to.
    pub fn creature_id(&self) -> &str {
        match self {
            ChangeEvent::Property(event) => event.root_id(),
            ChangeEvent::Creature(event) => &event.creature.id,
            ChangeEvent::Variables(event) => &event.creature_id,
        }
    }
}

struct Channels {
    properties: broadcast::Sender<ChangeEvent>,
    creatures: broadcast::Sender<ChangeEvent>,
    variables: broadcast::Sender<ChangeEvent>,
}

/// Topic-based change feed
///
/// Stores publish every write here; session watchers subscribe to the topics
/// they need. Delivery is best-effort: a lagging subscriber is told how many
/// events it missed and is expected to reload.
#[derive(Clone)]
pub struct ChangeFeed {
    channels: Arc<Channels>,
}

impl ChangeFeed {
    /// Creates a new feed with default capacity for each topic
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Creates a new feed with specified capacity per topic
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            channels: Arc::new(Channels {
                properties: broadcast::channel(capacity).0,
                creatures: broadcast::channel(capacity).0,
                variables: broadcast::channel(capacity).0,
            }),
        }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<ChangeEvent> {
        match topic {
            Topic::Properties => &self.channels.properties,
            Topic::Creatures => &self.channels.creatures,
            Topic::Variables => &self.channels.variables,
        }
    }

    /// Publish an event to its corresponding topic
    pub fn publish(&self, event: ChangeEvent) {
        let topic = event.topic();
        if self.sender(topic).send(event).is_err() {
            // No subscribers for this topic - this is normal, not an error
            tracing::trace!(target: "runtime::events", ?topic, "no subscribers");
        }
    }

    /// Subscribe to a specific topic
    ///
    /// Returns a receiver that will only receive events for that topic.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<ChangeEvent> {
        self.sender(topic).subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_only_their_topic() {
        let feed = ChangeFeed::with_capacity(8);
        let mut variables = feed.subscribe(Topic::Variables);
        let mut creatures = feed.subscribe(Topic::Creatures);

        feed.publish(ChangeEvent::Variables(VariablesEvent {
            creature_id: "c1".into(),
        }));

        let event = variables.recv().await.expect("variables event");
        assert_eq!(event.creature_id(), "c1");
        assert!(creatures.try_recv().is_err());
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let feed = ChangeFeed::new();
        feed.publish(ChangeEvent::Variables(VariablesEvent {
            creature_id: "c1".into(),
        }));
    }
}
