//! Tag-based invalidation after writes.
//!
//! A successful write endpoint reports the tags it invalidates. Every cached
//! entry providing a matching tag is marked stale; watched entries refetch,
//! unwatched ones wait for their next subscriber. Failed writes never reach
//! the bus.

use serde_json::Value;
use tokio::sync::broadcast;

use crate::registry::EndpointDescriptor;
use crate::tag::{Tag, dedup_tags};

use super::query::QueryClient;

/// One processed invalidation, as broadcast to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    /// The write endpoint that caused it, or `"manual"`.
    pub endpoint: &'static str,
    pub tags: Vec<Tag>,
    /// Number of cache entries that were marked stale.
    pub affected: usize,
}

#[derive(Debug, Clone)]
pub struct InvalidationBus {
    cache: QueryClient,
    events: broadcast::Sender<Invalidation>,
}

impl InvalidationBus {
    #[must_use]
    pub fn new(cache: QueryClient) -> Self {
        let (events, _) = broadcast::channel(100);
        Self { cache, events }
    }

    /// Invalidates the tags `descriptor` reports for a successful write.
    pub fn notify(&self, descriptor: &EndpointDescriptor, args: &Value, result: &Value) -> Invalidation {
        let tags = descriptor.invalidated_tags(args, result);
        self.process(descriptor.name(), tags)
    }

    /// Invalidates `tags` directly, outside any write.
    pub fn invalidate(&self, tags: Vec<Tag>) -> Invalidation {
        self.process("manual", tags)
    }

    /// Listens for processed invalidations.
    pub fn subscribe(&self) -> broadcast::Receiver<Invalidation> {
        self.events.subscribe()
    }

    fn process(&self, endpoint: &'static str, tags: Vec<Tag>) -> Invalidation {
        let tags = dedup_tags(tags);
        let affected = self.cache.mark_stale(&tags);
        if !tags.is_empty() {
            tracing::debug!(
                endpoint,
                tags = ?tags.iter().map(ToString::to_string).collect::<Vec<_>>(),
                affected,
                "invalidated"
            );
        }

        let event = Invalidation {
            endpoint,
            tags,
            affected,
        };
        // No listener is fine.
        let _ = self.events.send(event.clone());
        event
    }
}
