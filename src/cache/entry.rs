use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::QueryError;
use crate::registry::{CacheKey, EndpointDescriptor, PredictFn, ReconcileFn};
use crate::tag::Tag;

/// A request in flight, awaitable by any number of callers.
pub type SharedFetch = Shared<BoxFuture<'static, Result<Value, QueryError>>>;

/// Lifecycle of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    /// Nothing requested yet, or invalidated while no one was watching.
    Idle,
    Loading,
    Succeeded,
    Failed,
}

/// What subscribers observe for one cache key.
///
/// `data` survives a failed refetch, so a view can keep showing the last good
/// value next to the error.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub status: QueryStatus,
    pub data: Option<Value>,
    pub error: Option<QueryError>,
    pub is_stale: bool,
    /// `true` while a predicted value is layered over the server's data.
    pub is_optimistic: bool,
    pub updated_at: Option<Instant>,
}

impl QueryResult {
    pub const fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_stale: false,
            is_optimistic: false,
            updated_at: None,
        }
    }

    /// Returns the data, if any has been received.
    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Deserializes the data into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Decode`] if the data does not match `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, QueryError> {
        self.data
            .as_ref()
            .map(|data| serde_json::from_value(data.clone()).map_err(QueryError::from))
            .transpose()
    }

    pub const fn is_loading(&self) -> bool {
        matches!(self.status, QueryStatus::Loading)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self.status, QueryStatus::Succeeded)
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.status, QueryStatus::Failed)
    }

    pub const fn is_stale(&self) -> bool {
        self.is_stale
    }

    /// Returns `true` once a request has finished, successfully or not.
    pub const fn is_settled(&self) -> bool {
        matches!(self.status, QueryStatus::Succeeded | QueryStatus::Failed)
    }
}

/// The server-confirmed value an optimistic write was layered over.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticSnapshot {
    pub key: CacheKey,
    pub previous_data: Value,
}

struct Layer {
    mutation_id: u64,
    args: Value,
    predict: PredictFn,
    confirmed: bool,
}

/// Pending predictions stacked over a snapshot, oldest first.
pub(crate) struct OptimisticState {
    snapshot: OptimisticSnapshot,
    layers: Vec<Layer>,
}

impl OptimisticState {
    fn project(&self, upto: usize) -> Value {
        self.layers[..upto]
            .iter()
            .fold(self.snapshot.previous_data.clone(), |data, layer| {
                (layer.predict)(&data, &layer.args)
            })
    }

    fn position(&self, mutation_id: u64) -> Option<usize> {
        self.layers
            .iter()
            .position(|layer| layer.mutation_id == mutation_id)
    }

    fn is_settled(&self) -> bool {
        self.layers.iter().all(|layer| layer.confirmed)
    }
}

/// A cached query and everything needed to refetch, evict and observe it.
pub(crate) struct CacheEntry {
    /// Distinguishes this entry from an earlier one under the same key.
    pub id: u64,
    pub key: CacheKey,
    pub descriptor: Arc<EndpointDescriptor>,
    pub args: Value,
    pub status: QueryStatus,
    pub data: Option<Value>,
    pub error: Option<QueryError>,
    pub is_stale: bool,
    pub subscriber_count: usize,
    pub provided_tags: Vec<Tag>,
    pub updated_at: Option<Instant>,
    pub in_flight: Option<SharedFetch>,
    /// Invalidated while a request was in flight; its response predates the write.
    pub refetch_pending: bool,
    pub eviction: Option<CancellationToken>,
    optimistic: Option<OptimisticState>,
    tx: watch::Sender<QueryResult>,
}

impl CacheEntry {
    pub fn new(id: u64, key: CacheKey, descriptor: Arc<EndpointDescriptor>, args: Value) -> Self {
        let (tx, _) = watch::channel(QueryResult::idle());
        Self {
            id,
            key,
            descriptor,
            args,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            is_stale: false,
            subscriber_count: 0,
            provided_tags: Vec::new(),
            updated_at: None,
            in_flight: None,
            refetch_pending: false,
            eviction: None,
            optimistic: None,
            tx,
        }
    }

    pub fn snapshot(&self) -> QueryResult {
        QueryResult {
            status: self.status,
            data: self.data.clone(),
            error: self.error.clone(),
            is_stale: self.is_stale,
            is_optimistic: self.optimistic.is_some(),
            updated_at: self.updated_at,
        }
    }

    /// Pushes the current state to every subscriber.
    pub fn publish(&self) {
        self.tx.send_replace(self.snapshot());
    }

    pub fn watch(&self) -> watch::Receiver<QueryResult> {
        self.tx.subscribe()
    }

    /// Checks staleness against `stale_time`; `None` never ages out.
    /// Ages are measured on Tokio's clock.
    pub fn check_staleness(&mut self, stale_time: Option<Duration>) -> bool {
        if let (Some(limit), Some(at)) = (stale_time, self.updated_at) {
            if at.elapsed() > limit {
                self.is_stale = true;
            }
        }
        self.is_stale
    }

    pub const fn mark_stale(&mut self) {
        self.is_stale = true;
    }

    /// Stores a successful response.
    ///
    /// Server data supersedes confirmed predictions. Layers whose writes are
    /// still pending are replayed over it, so an unrelated refetch cannot undo
    /// a prediction before its write resolves.
    pub fn update(&mut self, data: Value, provided_tags: Vec<Tag>) {
        self.status = QueryStatus::Succeeded;
        self.error = None;
        self.is_stale = false;
        self.provided_tags = provided_tags;
        self.updated_at = Some(Instant::now());

        let Some(state) = self.optimistic.as_mut() else {
            self.data = Some(data);
            return;
        };
        state.layers.retain(|layer| !layer.confirmed);
        state.snapshot.previous_data = data;
        self.data = Some(state.project(state.layers.len()));
        if state.layers.is_empty() {
            self.optimistic = None;
        }
    }

    pub fn fail(&mut self, error: QueryError) {
        self.status = QueryStatus::Failed;
        self.error = Some(error);
    }

    pub fn provides_any(&self, tags: &[Tag]) -> bool {
        self.provided_tags
            .iter()
            .any(|provided| provided.is_invalidated_by(tags))
    }

    pub fn optimistic_snapshot(&self) -> Option<&OptimisticSnapshot> {
        self.optimistic.as_ref().map(|state| &state.snapshot)
    }

    /// Layers a prediction over the current data. Entries without data are
    /// left alone.
    pub fn apply_optimistic(&mut self, mutation_id: u64, args: &Value, predict: PredictFn) -> bool {
        let Some(current) = self.data.take() else {
            return false;
        };
        let next = predict(&current, args);
        let state = self.optimistic.get_or_insert_with(|| OptimisticState {
            snapshot: OptimisticSnapshot {
                key: self.key.clone(),
                previous_data: current,
            },
            layers: Vec::new(),
        });
        state.layers.push(Layer {
            mutation_id,
            args: args.clone(),
            predict,
            confirmed: false,
        });
        self.data = Some(next);
        self.publish();
        true
    }

    /// Settles a layer after the server accepted the write.
    ///
    /// With a reconciled value, that value becomes the new base and every layer
    /// up to this one is folded into it. Otherwise the prediction is kept as
    /// confirmed until the entry is refetched.
    pub fn confirm_optimistic(
        &mut self,
        mutation_id: u64,
        args: &Value,
        response: &Value,
        reconcile: Option<&ReconcileFn>,
    ) {
        let Some(state) = self.optimistic.as_mut() else {
            return;
        };
        let Some(pos) = state.position(mutation_id) else {
            return;
        };

        let reconciled = reconcile.and_then(|reconcile| {
            let predicted = state.project(pos + 1);
            reconcile(&predicted, args, response)
        });
        match reconciled {
            Some(base) => {
                state.layers.drain(..=pos);
                state.snapshot.previous_data = base;
            }
            None => state.layers[pos].confirmed = true,
        }

        self.data = Some(state.project(state.layers.len()));
        if state.is_settled() {
            self.optimistic = None;
        }
        self.publish();
    }

    /// Removes a failed layer; later layers are replayed over what remains.
    pub fn rollback_optimistic(&mut self, mutation_id: u64) {
        let Some(state) = self.optimistic.as_mut() else {
            return;
        };
        let Some(pos) = state.position(mutation_id) else {
            return;
        };

        state.layers.remove(pos);
        self.data = Some(state.project(state.layers.len()));
        if state.is_settled() {
            self.optimistic = None;
        }
        self.publish();
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("status", &self.status)
            .field("subscriber_count", &self.subscriber_count)
            .field("is_stale", &self.is_stale)
            .field("in_flight", &self.in_flight.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RequestSpec;
    use crate::tag::ResourceCategory;
    use serde_json::json;
    use std::thread::sleep;

    fn entry() -> CacheEntry {
        let descriptor = Arc::new(EndpointDescriptor::query("get_stats", |_| {
            Ok(RequestSpec::get("stats/"))
        }));
        CacheEntry::new(1, CacheKey::new("get_stats", &Value::Null), descriptor, Value::Null)
    }

    fn add(field: &'static str) -> PredictFn {
        Arc::new(move |data, args| {
            let mut next = data.clone();
            let by = args["by"].as_i64().unwrap_or(1);
            next[field] = json!(next[field].as_i64().unwrap_or(0) + by);
            next
        })
    }

    #[test]
    fn test_new_entry() {
        let entry = entry();
        assert_eq!(entry.status, QueryStatus::Idle);
        assert!(entry.data.is_none());
        assert!(!entry.is_stale);
    }

    #[test]
    fn test_check_staleness_without_limit() {
        let mut entry = entry();
        entry.update(json!(1), Vec::new());
        assert!(!entry.check_staleness(None));
    }

    #[test]
    fn test_check_staleness_stale() {
        let mut entry = entry();
        entry.update(json!(1), Vec::new());
        sleep(Duration::from_millis(10));
        assert!(entry.check_staleness(Some(Duration::from_millis(5))));
        assert!(entry.is_stale);
    }

    #[test]
    fn test_update_clears_staleness_and_error() {
        let mut entry = entry();
        entry.fail(QueryError::Transport("down".to_string()));
        entry.mark_stale();

        entry.update(json!(100), vec![Tag::category(ResourceCategory::Stats)]);
        assert_eq!(entry.status, QueryStatus::Succeeded);
        assert_eq!(entry.data, Some(json!(100)));
        assert!(entry.error.is_none());
        assert!(!entry.is_stale);
        assert!(entry.provides_any(&[Tag::category(ResourceCategory::Stats)]));
    }

    #[test]
    fn test_fail_keeps_last_good_data() {
        let mut entry = entry();
        entry.update(json!({ "views": 3 }), Vec::new());
        entry.fail(QueryError::Transport("down".to_string()));

        let result = entry.snapshot();
        assert!(result.is_error());
        assert_eq!(result.data, Some(json!({ "views": 3 })));
    }

    #[test]
    fn test_publish_reaches_watchers() {
        let mut entry = entry();
        let rx = entry.watch();
        entry.update(json!(7), Vec::new());
        entry.publish();
        assert_eq!(rx.borrow().data, Some(json!(7)));
    }

    #[test]
    fn test_optimistic_requires_data() {
        let mut entry = entry();
        assert!(!entry.apply_optimistic(1, &json!({}), add("likes")));
        assert!(entry.optimistic_snapshot().is_none());
    }

    #[test]
    fn test_rollback_restores_snapshot() {
        let mut entry = entry();
        entry.update(json!({ "likes": 3 }), Vec::new());

        assert!(entry.apply_optimistic(1, &json!({}), add("likes")));
        assert_eq!(entry.data, Some(json!({ "likes": 4 })));
        assert!(entry.snapshot().is_optimistic);
        assert_eq!(
            entry.optimistic_snapshot().map(|s| s.previous_data.clone()),
            Some(json!({ "likes": 3 }))
        );

        entry.rollback_optimistic(1);
        assert_eq!(entry.data, Some(json!({ "likes": 3 })));
        assert!(entry.optimistic_snapshot().is_none());
    }

    #[test]
    fn test_rollback_replays_later_layers() {
        let mut entry = entry();
        entry.update(json!({ "likes": 3 }), Vec::new());

        entry.apply_optimistic(1, &json!({ "by": 1 }), add("likes"));
        entry.apply_optimistic(2, &json!({ "by": 10 }), add("likes"));
        assert_eq!(entry.data, Some(json!({ "likes": 14 })));

        entry.rollback_optimistic(1);
        assert_eq!(entry.data, Some(json!({ "likes": 13 })));
        assert!(entry.snapshot().is_optimistic);

        entry.rollback_optimistic(2);
        assert_eq!(entry.data, Some(json!({ "likes": 3 })));
        assert!(!entry.snapshot().is_optimistic);
    }

    #[test]
    fn test_confirm_with_reconciled_value() {
        let mut entry = entry();
        entry.update(json!({ "likes": 3 }), Vec::new());
        entry.apply_optimistic(1, &json!({}), add("likes"));

        let reconcile: ReconcileFn = Arc::new(|_, _, response| Some(response.clone()));
        entry.confirm_optimistic(1, &json!({}), &json!({ "likes": 9 }), Some(&reconcile));

        assert_eq!(entry.data, Some(json!({ "likes": 9 })));
        assert!(entry.optimistic_snapshot().is_none());
    }

    #[test]
    fn test_confirm_without_reconcile_keeps_prediction() {
        let mut entry = entry();
        entry.update(json!({ "likes": 3 }), Vec::new());
        entry.apply_optimistic(1, &json!({}), add("likes"));
        entry.apply_optimistic(2, &json!({}), add("likes"));

        entry.confirm_optimistic(1, &json!({}), &Value::Null, None);
        assert_eq!(entry.data, Some(json!({ "likes": 5 })));
        assert!(entry.snapshot().is_optimistic);

        // The confirmed layer survives the rollback of a later one.
        entry.rollback_optimistic(2);
        assert_eq!(entry.data, Some(json!({ "likes": 4 })));
        assert!(!entry.snapshot().is_optimistic);
    }

    #[test]
    fn test_refetch_replays_pending_prediction() {
        let mut entry = entry();
        entry.update(json!({ "likes": 3 }), Vec::new());
        entry.apply_optimistic(1, &json!({}), add("likes"));

        entry.update(json!({ "likes": 20 }), Vec::new());
        assert_eq!(entry.data, Some(json!({ "likes": 21 })));
        assert!(entry.snapshot().is_optimistic);
        assert_eq!(
            entry.optimistic_snapshot().map(|s| s.previous_data.clone()),
            Some(json!({ "likes": 20 }))
        );

        entry.rollback_optimistic(1);
        assert_eq!(entry.data, Some(json!({ "likes": 20 })));
        assert!(!entry.snapshot().is_optimistic);
    }

    #[test]
    fn test_refetch_supersedes_confirmed_prediction() {
        let mut entry = entry();
        entry.update(json!({ "likes": 3 }), Vec::new());
        entry.apply_optimistic(1, &json!({}), add("likes"));
        entry.apply_optimistic(2, &json!({ "by": 10 }), add("likes"));
        entry.confirm_optimistic(1, &json!({}), &Value::Null, None);

        entry.update(json!({ "likes": 4 }), Vec::new());
        assert_eq!(entry.data, Some(json!({ "likes": 14 })));

        entry.confirm_optimistic(2, &json!({ "by": 10 }), &Value::Null, None);
        assert_eq!(entry.data, Some(json!({ "likes": 14 })));
        assert!(!entry.snapshot().is_optimistic);

        entry.update(json!({ "likes": 15 }), Vec::new());
        assert_eq!(entry.data, Some(json!({ "likes": 15 })));
    }
}
