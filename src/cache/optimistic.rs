//! Optimistic writes.
//!
//! Before a write is sent, its predicted effect is layered over every cached
//! entry the write targets, so subscribers see the result immediately. When
//! the server answers, the layer is either confirmed (and replaced by the
//! server's value when one can be derived) or rolled back.
//!
//! Overlapping writes on the same entry stack in issue order. Rolling back one
//! of them replays the others over the snapshot, so a failure never
//! resurrects data another write has already changed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::error::QueryError;
use crate::executor::RequestExecutor;
use crate::registry::{CacheKey, EndpointDescriptor, OptimisticPolicy};

use super::query::QueryClient;

#[derive(Debug, Clone)]
pub struct OptimisticReconciler {
    cache: QueryClient,
    executor: RequestExecutor,
    next_id: Arc<AtomicU64>,
}

impl OptimisticReconciler {
    #[must_use]
    pub fn new(cache: QueryClient, executor: RequestExecutor) -> Self {
        Self {
            cache,
            executor,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Applies `policy`'s prediction, executes the write, then confirms or
    /// rolls back.
    ///
    /// The prediction is visible to subscribers before the request is sent.
    /// Entries that have no data yet are skipped.
    ///
    /// # Errors
    ///
    /// Returns the executor's error after the prediction has been rolled back.
    pub async fn mutate_optimistically(
        &self,
        descriptor: &EndpointDescriptor,
        args: &Value,
        policy: &OptimisticPolicy,
    ) -> Result<Value, QueryError> {
        let mutation_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let targets = (policy.targets)(args);
        let applied: Vec<CacheKey> = self
            .cache
            .keys_providing(&targets)
            .into_iter()
            .filter(|key| {
                self.cache
                    .apply_optimistic(key, mutation_id, args, Arc::clone(&policy.predict))
            })
            .collect();
        tracing::debug!(
            endpoint = descriptor.name(),
            mutation_id,
            entries = applied.len(),
            "optimistic update applied"
        );

        let outcome = self.executor.execute(descriptor, args).await;
        match &outcome {
            Ok(response) => {
                for key in &applied {
                    self.cache.confirm_optimistic(
                        key,
                        mutation_id,
                        args,
                        response,
                        policy.reconcile.as_ref(),
                    );
                }
            }
            Err(err) => {
                tracing::debug!(endpoint = descriptor.name(), mutation_id, %err, "rolling back");
                for key in &applied {
                    self.cache.rollback_optimistic(key, mutation_id);
                }
            }
        }
        outcome
    }
}
