use std::fmt;

use futures::StreamExt as _;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::error::QueryError;
use crate::registry::CacheKey;

use super::entry::{QueryResult, SharedFetch};
use super::query::QueryClient;

/// A live handle on one cache entry.
///
/// While the handle exists the entry is protected from eviction. Dropping it
/// (or calling [`release`](Self::release)) gives up that claim; the entry is
/// evicted once the last handle is gone for longer than `cache_time`.
pub struct Subscription {
    key: CacheKey,
    client: QueryClient,
    receiver: watch::Receiver<QueryResult>,
}

impl Subscription {
    pub(crate) const fn new(
        key: CacheKey,
        client: QueryClient,
        receiver: watch::Receiver<QueryResult>,
    ) -> Self {
        Self {
            key,
            client,
            receiver,
        }
    }

    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The latest published state.
    pub fn current(&self) -> QueryResult {
        self.receiver.borrow().clone()
    }

    /// Deserializes the current data into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Decode`] if the data does not match `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>, QueryError> {
        self.receiver.borrow().data_as()
    }

    /// Waits for the next state change.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Disposed`] once the entry is gone.
    pub async fn changed(&mut self) -> Result<QueryResult, QueryError> {
        self.receiver
            .changed()
            .await
            .map_err(|_| QueryError::Disposed)?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// Waits until the state satisfies `predicate`, checking the current state
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Disposed`] once the entry is gone.
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&QueryResult) -> bool,
    ) -> Result<QueryResult, QueryError> {
        self.receiver
            .wait_for(predicate)
            .await
            .map(|result| result.clone())
            .map_err(|_| QueryError::Disposed)
    }

    /// Waits until the entry is neither idle nor loading.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Disposed`] once the entry is gone.
    pub async fn settled(&mut self) -> Result<QueryResult, QueryError> {
        self.wait_for(QueryResult::is_settled).await
    }

    /// Forces a request, joining one already in flight.
    pub fn refetch(&self) -> Option<SharedFetch> {
        self.client.fetch(&self.key)
    }

    /// Every state from now on, starting with the current one.
    pub fn stream(&self) -> BoxStream<'static, QueryResult> {
        WatchStream::new(self.receiver.clone()).boxed()
    }

    /// Gives up this handle's claim on the entry.
    pub fn release(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.client.release(&self.key);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("current", &*self.receiver.borrow())
            .finish_non_exhaustive()
    }
}
