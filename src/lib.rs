//! # Quire - a resource cache for the content platform API
//!
//! Quire sits between views and the platform's REST API. Views subscribe to
//! named read endpoints and observe shared, deduplicated state; writes go
//! through the same client and refresh whatever they affected.
//!
//! ## Architecture
//!
//! 1. **Registry**: Declarative endpoint descriptors mapping names to requests
//!    and resource tags
//! 2. **Executor**: One HTTP call per request, with bearer auth and error
//!    normalization
//! 3. **Cache**: One entry per endpoint and argument set, shared by every
//!    subscriber
//! 4. **Invalidation**: Successful writes mark entries with matching tags stale
//! 5. **Optimistic updates**: Predicted results applied before the server
//!    answers, rolled back on failure
//!
//! ## Core Components
//!
//! - [`ApiClient`](client::ApiClient): The service object views talk to
//! - [`QueryClient`](cache::QueryClient): The subscription cache
//! - [`Subscription`](cache::Subscription): A live handle on one cache entry
//! - [`Mutation`](cache::Mutation): A write endpoint with observable state
//!
//! ## Example
//!
//! ```rust,no_run
//! use quire::prelude::*;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), QueryError> {
//! let client = ApiClient::builder()
//!     .config(QueryConfig::from_env())
//!     .init()?;
//!
//! let mut post = client.query(names::GET_CONTENT, json!({ "id": 42 }))?;
//! let current = post.settled().await?;
//! println!("{:?}", current.data);
//!
//! // Shown immediately, rolled back if the server refuses.
//! client
//!     .toggle_reaction(&ToggleReaction::new(42, ReactionType::Like))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod collaborators;
pub mod endpoints;
pub mod error;
pub mod executor;
pub mod mock;
pub mod prelude;
pub mod reaction;
pub mod registry;
pub mod tag;
pub mod transport;

pub use error::QueryError;
