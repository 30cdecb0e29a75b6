//! Prelude module for convenient imports.
//!
//! ```
//! use quire::prelude::*;
//! ```
//!
//! # What's included
//!
//! - [`ApiClient`] - The service object for reads and writes
//! - [`QueryConfig`] - Base URL and cache timings
//! - [`Subscription`] and [`QueryResult`] - Observing a read endpoint
//! - [`Mutation`] and [`MutationResult`] - Observing a write endpoint
//! - [`Tag`] and [`ResourceCategory`] - Manual invalidation
//! - [`names`] - Endpoint names

pub use crate::cache::{
    Mutation, MutationResult, MutationState, QueryConfig, QueryResult, QueryStatus, Subscription,
};
pub use crate::client::ApiClient;
pub use crate::collaborators::{AuthProvider, Navigator, NoticeLevel, NotificationSink};
pub use crate::endpoints::names;
pub use crate::error::QueryError;
pub use crate::reaction::{ReactionType, ToggleReaction};
pub use crate::tag::{ResourceCategory, Tag};
