use std::time::Duration;

/// Base URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "QUIRE_API_URL";

/// Configuration for cache and request behavior.
///
/// This controls where requests go, how long cached data is trusted, and how
/// long unused data is kept around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// API root, always ending in exactly one `/api`.
    pub base_url: String,

    /// How long data is considered fresh before a new subscriber refetches it.
    ///
    /// `None` keeps data fresh until a write invalidates it.
    pub stale_time: Option<Duration>,

    /// How long an entry with no subscribers is retained before eviction.
    ///
    /// A new subscriber within this window cancels the eviction.
    pub cache_time: Duration,

    /// Upper bound for a single request. An elapsed timeout is a transport error.
    pub request_timeout: Option<Duration>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            base_url: normalize_base_url(DEFAULT_BASE_URL),
            stale_time: None,
            cache_time: Duration::from_secs(60),
            request_timeout: None,
        }
    }
}

impl QueryConfig {
    /// Creates a new configuration with the given stale and cache times.
    #[must_use]
    pub fn new(stale_time: Option<Duration>, cache_time: Duration) -> Self {
        Self {
            stale_time,
            cache_time,
            ..Self::default()
        }
    }

    /// Reads the base URL from `QUIRE_API_URL`, falling back to the default.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(BASE_URL_ENV) {
            Some(raw) if !raw.trim().is_empty() => Self::default().with_base_url(&raw),
            _ => Self::default(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, raw: &str) -> Self {
        self.base_url = normalize_base_url(raw);
        self
    }

    #[must_use]
    pub const fn with_stale_time(mut self, stale_time: Option<Duration>) -> Self {
        self.stale_time = stale_time;
        self
    }

    #[must_use]
    pub const fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Trims trailing slashes and appends a single `/api`.
pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let root = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    format!("{root}/api")
}
