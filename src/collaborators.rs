//! Collaborators the cache calls out to but does not own: the auth provider
//! (current credential and logout), the notification sink (user-visible
//! messages), and the navigator (redirects after writes).

use std::sync::{Arc, PoisonError, RwLock};

/// Supplies the bearer credential and reacts to authentication failures.
pub trait AuthProvider: Send + Sync {
    /// The current bearer token, if the user is signed in.
    fn token(&self) -> Option<String>;

    /// Called once for every 401 response, whichever endpoint produced it.
    fn on_unauthorized(&self);
}

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Receives user-visible messages (the toast equivalent).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Performs navigation after a write completes.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// In-memory credential holder. A 401 clears the token, signing the user out.
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    token: Arc<RwLock<Option<String>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_signed_in(&self) -> bool {
        self.token().is_some()
    }
}

impl AuthProvider for TokenStore {
    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn on_unauthorized(&self) {
        tracing::info!("signing out after unauthorized response");
        self.clear();
    }
}

/// Forwards notices to `tracing`. Used when no UI sink is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Success => tracing::info!(%message, "notice"),
            NoticeLevel::Error => tracing::warn!(%message, "notice"),
        }
    }
}
