//! Write endpoints.
//!
//! Every write goes through the same path:
//!
//! 1. If the endpoint declares an [`OptimisticPolicy`](crate::registry::OptimisticPolicy),
//!    its prediction is applied to the targeted entries
//! 2. The request is executed
//! 3. On success, the endpoint's invalidation tags are sent to the
//!    [`InvalidationBus`]
//! 4. On failure, the error message goes to the
//!    [`NotificationSink`] and the prediction is rolled back
//!
//! A [`Mutation`] wraps this path for one endpoint and publishes its state
//! (`Idle → Loading → Success | Error`), like a form's submit button would
//! observe it.
//!
//! # Example
//!
//! ```rust
//! use quire::mock::MockTransport;
//! use quire::prelude::*;
//! use quire::registry::Method;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), QueryError> {
//! let mock = MockTransport::new();
//! mock.on(Method::Post, "content/create/", 201, json!({ "id": 99 }));
//! let client = ApiClient::builder().transport(mock).init()?;
//!
//! let create = client.mutation(names::CREATE_CONTENT)?;
//! let mut state = create.watch();
//!
//! let created = create.trigger(json!({ "title": "Hello" })).await?;
//! assert_eq!(created["id"], 99);
//! assert!(state.borrow_and_update().is_success());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use crate::collaborators::{NoticeLevel, NotificationSink};
use crate::error::QueryError;
use crate::executor::RequestExecutor;
use crate::registry::EndpointDescriptor;

use super::invalidation::InvalidationBus;
use super::optimistic::OptimisticReconciler;
use super::query::QueryClient;

/// The state of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationState {
    /// Mutation is idle (not yet started).
    Idle,
    /// Mutation is in progress.
    Loading,
    /// Mutation succeeded with the server's response.
    Success(Value),
    /// Mutation failed with an error.
    Error(QueryError),
}

/// A mutation result containing the current state.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationResult {
    /// The current state of the mutation.
    pub state: MutationState,
}

impl MutationResult {
    pub const fn idle() -> Self {
        Self {
            state: MutationState::Idle,
        }
    }

    /// Returns the response if the mutation succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&Value> {
        match &self.state {
            MutationState::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the error if the mutation failed, otherwise `None`.
    pub const fn error(&self) -> Option<&QueryError> {
        match &self.state {
            MutationState::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Returns `true` if the mutation is currently loading.
    pub const fn is_loading(&self) -> bool {
        matches!(self.state, MutationState::Loading)
    }

    /// Returns `true` if the mutation succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.state, MutationState::Success(_))
    }

    /// Returns `true` if the mutation failed.
    pub const fn is_error(&self) -> bool {
        matches!(self.state, MutationState::Error(_))
    }
}

/// Executes writes and fans their outcome out to the cache and the user.
#[derive(Clone)]
pub(crate) struct WritePath {
    cache: QueryClient,
    executor: RequestExecutor,
    bus: InvalidationBus,
    reconciler: OptimisticReconciler,
    sink: Arc<dyn NotificationSink>,
}

impl WritePath {
    pub fn new(
        cache: QueryClient,
        executor: RequestExecutor,
        bus: InvalidationBus,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let reconciler = OptimisticReconciler::new(cache.clone(), executor.clone());
        Self {
            cache,
            executor,
            bus,
            reconciler,
            sink,
        }
    }

    pub async fn run(&self, descriptor: &EndpointDescriptor, args: &Value) -> Result<Value, QueryError> {
        if self.cache.is_disposed() {
            return Err(QueryError::Disposed);
        }

        let outcome = match descriptor.optimistic_policy() {
            Some(policy) => {
                self.reconciler
                    .mutate_optimistically(descriptor, args, policy)
                    .await
            }
            None => self.executor.execute(descriptor, args).await,
        };

        match outcome {
            Ok(response) => {
                self.bus.notify(descriptor, args, &response);
                Ok(response)
            }
            Err(err) => {
                tracing::debug!(endpoint = descriptor.name(), %err, "write failed");
                self.sink.notify(NoticeLevel::Error, &err.message());
                Err(err)
            }
        }
    }
}

/// A handle on one write endpoint with observable state.
///
/// Cloning shares the state, so a clone can be handed to whatever renders it.
#[derive(Clone)]
pub struct Mutation {
    descriptor: Arc<EndpointDescriptor>,
    path: WritePath,
    state: Arc<watch::Sender<MutationResult>>,
}

impl Mutation {
    pub(crate) fn new(descriptor: Arc<EndpointDescriptor>, path: WritePath) -> Self {
        let (state, _) = watch::channel(MutationResult::idle());
        Self {
            descriptor,
            path,
            state: Arc::new(state),
        }
    }

    pub fn name(&self) -> &'static str {
        self.descriptor.name()
    }

    /// Executes the write with `args`.
    ///
    /// # Errors
    ///
    /// Returns the request's error. Its message has already been sent to the
    /// notification sink.
    pub async fn trigger(&self, args: Value) -> Result<Value, QueryError> {
        self.state.send_replace(MutationResult {
            state: MutationState::Loading,
        });

        let outcome = self.path.run(&self.descriptor, &args).await;
        let state = match &outcome {
            Ok(response) => MutationState::Success(response.clone()),
            Err(err) => MutationState::Error(err.clone()),
        };
        self.state.send_replace(MutationResult { state });
        outcome
    }

    /// The latest state.
    pub fn state(&self) -> MutationResult {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<MutationResult> {
        self.state.subscribe()
    }

    /// Returns to [`MutationState::Idle`].
    pub fn reset(&self) {
        self.state.send_replace(MutationResult::idle());
    }
}

impl fmt::Debug for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("endpoint", &self.descriptor.name())
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}
