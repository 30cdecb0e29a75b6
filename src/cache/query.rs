//! The subscription cache.
//!
//! [`QueryClient`] keeps one [`CacheEntry`] per [`CacheKey`] and guarantees:
//!
//! 1. At most one request per key is in flight; later callers join it
//! 2. Every subscriber observes the same state through a watch channel
//! 3. An entry nobody subscribes to is evicted after `cache_time`
//! 4. A response for an entry that has since been evicted is discarded
//!
//! Entries are created by [`QueryClient::subscribe`] and refreshed by
//! [`QueryClient::mark_stale`], which the [`InvalidationBus`](super::InvalidationBus)
//! calls after successful writes.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::FutureExt as _;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{NoticeLevel, NotificationSink, TracingSink};
use crate::error::QueryError;
use crate::executor::RequestExecutor;
use crate::registry::{CacheKey, EndpointKind, PredictFn, ReconcileFn, Registry};
use crate::tag::Tag;

use super::config::QueryConfig;
use super::entry::{CacheEntry, OptimisticSnapshot, QueryResult, QueryStatus, SharedFetch};
use super::subscription::Subscription;

/// A client owning the query cache.
///
/// Cloning is cheap and every clone shares the same entries.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use quire::cache::{QueryClient, QueryConfig};
/// use quire::collaborators::TokenStore;
/// use quire::endpoints::{self, names};
/// use quire::executor::RequestExecutor;
/// use quire::mock::MockTransport;
/// use quire::registry::Method;
/// use serde_json::{Value, json};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), quire::QueryError> {
/// let mock = MockTransport::new();
/// mock.on(Method::Get, "categories/", 200, json!(["news"]));
///
/// let config = QueryConfig::default();
/// let executor = RequestExecutor::new(
///     Arc::new(mock.clone()),
///     Arc::new(TokenStore::new()),
///     &config.base_url,
/// );
/// let client = QueryClient::new(Arc::new(endpoints::content_platform()?), executor, config);
///
/// let mut categories = client.subscribe(names::GET_CATEGORIES, Value::Null)?;
/// let result = categories.settled().await?;
/// assert_eq!(result.data, Some(json!(["news"])));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct QueryClient {
    registry: Arc<Registry>,
    executor: RequestExecutor,
    entries: Arc<DashMap<CacheKey, CacheEntry>>,
    config: QueryConfig,
    next_id: Arc<AtomicU64>,
    shutdown: CancellationToken,
    sink: Arc<dyn NotificationSink>,
}

impl QueryClient {
    #[must_use]
    pub fn new(registry: Arc<Registry>, executor: RequestExecutor, config: QueryConfig) -> Self {
        Self {
            registry,
            executor,
            entries: Arc::new(DashMap::new()),
            config,
            next_id: Arc::new(AtomicU64::new(1)),
            shutdown: CancellationToken::new(),
            sink: Arc::new(TracingSink),
        }
    }

    /// Routes failed reads to `sink` instead of the log.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub const fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Subscribes to the read endpoint `endpoint` with `args`.
    ///
    /// Creates the entry on first use. A fetch starts when the entry has no
    /// data yet, failed last time, or is stale; otherwise the cached state is
    /// served as is. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is unknown, is a write endpoint, or
    /// the client has been disposed.
    pub fn subscribe(&self, endpoint: &str, args: Value) -> Result<Subscription, QueryError> {
        if self.is_disposed() {
            return Err(QueryError::Disposed);
        }
        let descriptor = self.registry.lookup(endpoint)?;
        descriptor.expect_kind(EndpointKind::Read)?;
        let key = CacheKey::new(endpoint, &args);

        let (receiver, should_fetch) = {
            let mut entry = self.entries.entry(key.clone()).or_insert_with(|| {
                tracing::debug!(%key, "cache entry created");
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                CacheEntry::new(id, key.clone(), descriptor, args)
            });

            entry.subscriber_count += 1;
            if let Some(eviction) = entry.eviction.take() {
                tracing::trace!(%key, "eviction cancelled");
                eviction.cancel();
            }

            let status = entry.status;
            let stale_time = self.config.stale_time;
            let should_fetch = entry.in_flight.is_none()
                && match status {
                    QueryStatus::Idle | QueryStatus::Failed => true,
                    QueryStatus::Succeeded => entry.check_staleness(stale_time),
                    QueryStatus::Loading => false,
                };
            (entry.watch(), should_fetch)
        };

        if should_fetch {
            self.fetch(&key);
        }
        Ok(Subscription::new(key, self.clone(), receiver))
    }

    /// Starts a request for `key`, or joins the one already in flight.
    ///
    /// Returns `None` if no entry exists for `key`. The request runs on its own
    /// task, so dropping the returned future does not cancel it.
    pub fn fetch(&self, key: &CacheKey) -> Option<SharedFetch> {
        let mut entry = self.entries.get_mut(key)?;
        if let Some(flight) = &entry.in_flight {
            tracing::trace!(%key, "joining in-flight request");
            return Some(flight.clone());
        }

        let client = self.clone();
        let descriptor = Arc::clone(&entry.descriptor);
        let args = entry.args.clone();
        let incarnation = entry.id;
        let owned_key = key.clone();
        let flight = async move {
            let result = client.executor.execute(&descriptor, &args).await;
            client.complete(&owned_key, incarnation, &result);
            result
        }
        .boxed()
        .shared();

        tracing::debug!(%key, "fetch started");
        entry.status = QueryStatus::Loading;
        entry.in_flight = Some(flight.clone());
        entry.publish();
        drop(entry);

        tokio::spawn(flight.clone());
        Some(flight)
    }

    /// Records the outcome of a request for the entry it was issued for.
    /// Failures are also reported to the notification sink once per request.
    fn complete(&self, key: &CacheKey, incarnation: u64, result: &Result<Value, QueryError>) {
        let refetch = {
            let Some(mut entry) = self.entries.get_mut(key).filter(|e| e.id == incarnation) else {
                let discarded = QueryError::StaleEvictedResponse(key.to_string());
                tracing::trace!(%discarded);
                return;
            };

            entry.in_flight = None;
            match result {
                Ok(data) => {
                    let tags = entry.descriptor.provided_tags(&entry.args, data);
                    entry.update(data.clone(), tags);
                    tracing::debug!(%key, "fetch succeeded");
                }
                Err(err) => {
                    tracing::debug!(%key, %err, "fetch failed");
                    entry.fail(err.clone());
                }
            }

            let refetch = std::mem::take(&mut entry.refetch_pending);
            if refetch {
                entry.mark_stale();
                if entry.subscriber_count == 0 {
                    entry.status = QueryStatus::Idle;
                }
            }
            entry.publish();
            refetch && entry.subscriber_count > 0
        };

        if let Err(err) = result {
            self.sink.notify(NoticeLevel::Error, &err.message());
        }
        if refetch {
            self.fetch(key);
        }
    }

    /// Drops one subscriber from `key`. The last one out schedules eviction.
    pub(crate) fn release(&self, key: &CacheKey) {
        let Some(mut entry) = self.entries.get_mut(key) else {
            return;
        };
        entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
        if entry.subscriber_count > 0 {
            return;
        }

        let token = self.shutdown.child_token();
        if let Some(previous) = entry.eviction.replace(token.clone()) {
            previous.cancel();
        }
        let incarnation = entry.id;
        drop(entry);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.evict(key, incarnation, &token);
            return;
        };

        let client = self.clone();
        let key = key.clone();
        let grace = self.config.cache_time;
        tracing::trace!(%key, ?grace, "eviction scheduled");
        runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(grace) => client.evict(&key, incarnation, &token),
            }
        });
    }

    fn evict(&self, key: &CacheKey, incarnation: u64, token: &CancellationToken) {
        let removed = self.entries.remove_if(key, |_, entry| {
            entry.id == incarnation && entry.subscriber_count == 0 && !token.is_cancelled()
        });
        if removed.is_some() {
            tracing::debug!(%key, "cache entry evicted");
        }
    }

    /// Marks every entry providing one of `tags` stale.
    ///
    /// Watched entries refetch at once. An entry with a request in flight
    /// refetches when it completes. Unwatched entries go idle and refetch on
    /// their next subscriber. Returns the number of entries affected.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn mark_stale(&self, tags: &[Tag]) -> usize {
        let keys = self.keys_providing(tags);
        let mut refetch = Vec::new();

        for key in &keys {
            let Some(mut entry) = self.entries.get_mut(key) else {
                continue;
            };
            entry.mark_stale();
            if entry.in_flight.is_some() {
                entry.refetch_pending = true;
            } else if entry.subscriber_count > 0 {
                refetch.push(key.clone());
            } else {
                entry.status = QueryStatus::Idle;
            }
            entry.publish();
        }

        for key in &refetch {
            self.fetch(key);
        }
        keys.len()
    }

    /// Keys of the entries whose provided tags intersect `tags`.
    pub fn keys_providing(&self, tags: &[Tag]) -> Vec<CacheKey> {
        if tags.is_empty() {
            return Vec::new();
        }
        let mut keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| entry.provides_any(tags))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        keys
    }

    pub(crate) fn apply_optimistic(
        &self,
        key: &CacheKey,
        mutation_id: u64,
        args: &Value,
        predict: PredictFn,
    ) -> bool {
        self.entries
            .get_mut(key)
            .is_some_and(|mut entry| entry.apply_optimistic(mutation_id, args, predict))
    }

    pub(crate) fn confirm_optimistic(
        &self,
        key: &CacheKey,
        mutation_id: u64,
        args: &Value,
        response: &Value,
        reconcile: Option<&ReconcileFn>,
    ) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.confirm_optimistic(mutation_id, args, response, reconcile);
        }
    }

    pub(crate) fn rollback_optimistic(&self, key: &CacheKey, mutation_id: u64) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.rollback_optimistic(mutation_id);
        }
    }

    /// The current state of `key`, if it is cached.
    pub fn snapshot(&self, key: &CacheKey) -> Option<QueryResult> {
        self.entries.get(key).map(|entry| entry.snapshot())
    }

    /// The snapshot an optimistic write on `key` would roll back to.
    pub fn optimistic_snapshot(&self, key: &CacheKey) -> Option<OptimisticSnapshot> {
        self.entries
            .get(key)
            .and_then(|entry| entry.optimistic_snapshot().cloned())
    }

    pub fn subscriber_count(&self, key: &CacheKey) -> Option<usize> {
        self.entries.get(key).map(|entry| entry.subscriber_count)
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cancels every eviction timer and drops all entries.
    ///
    /// Subscriptions observe the closed channel; requests still in flight
    /// complete into nothing.
    pub fn dispose(&self) {
        tracing::debug!(entries = self.entries.len(), "disposing query cache");
        self.shutdown.cancel();
        self.entries.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryClient")
            .field("entries", &self.entries.len())
            .field("config", &self.config)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
