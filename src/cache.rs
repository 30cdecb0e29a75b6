//! Query caching, invalidation and optimistic writes.
//!
//! This module holds the stateful half of the crate, similar to SWR or
//! TanStack Query.
//!
//! # Features
//!
//! - **Queries**: Subscription-based reads with deduplication and shared state
//! - **Invalidation**: Tag-based refetching after successful writes
//! - **Optimistic updates**: Predicted results shown before the server answers
//! - **Eviction**: Unused entries are dropped after `cache_time`
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
//! mock.on(Method::Get, "content/", 200, json!({ "count": 0, "results": [] }))
//!     .on(Method::Get, "content/", 200, json!({ "count": 1, "results": [{ "id": 99 }] }));
//! mock.on(Method::Post, "content/create/", 201, json!({ "id": 99 }));
//! let client = ApiClient::builder().transport(mock).init()?;
//!
//! let mut list = client.query(names::LIST_CONTENT, json!({ "page": 1 }))?;
//! list.settled().await?;
//!
//! // The list refetches once the write succeeds.
//! client.mutate(names::CREATE_CONTENT, json!({ "title": "Hello" })).await?;
//! let refreshed = list
//!     .wait_for(|r| r.is_success() && !r.is_stale)
//!     .await?;
//! assert_eq!(refreshed.data.map(|page| page["count"].clone()), Some(json!(1)));
//! # Ok(())
//! # }
//! ```

mod config;
mod entry;
pub mod invalidation;
pub mod mutation;
pub mod optimistic;
pub mod query;
pub mod subscription;

pub use config::{BASE_URL_ENV, DEFAULT_BASE_URL, QueryConfig, normalize_base_url};
pub use entry::{OptimisticSnapshot, QueryResult, QueryStatus, SharedFetch};
pub use invalidation::{Invalidation, InvalidationBus};
pub use mutation::{Mutation, MutationResult, MutationState};
pub use optimistic::OptimisticReconciler;
pub use query::QueryClient;
pub use subscription::Subscription;
