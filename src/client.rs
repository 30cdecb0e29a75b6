//! The service object tying the cache to its collaborators.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::cache::mutation::WritePath;
use crate::cache::{Invalidation, InvalidationBus, Mutation, QueryClient, QueryConfig, Subscription};
use crate::collaborators::{AuthProvider, Navigator, NotificationSink, TokenStore, TracingSink};
use crate::endpoints;
use crate::error::QueryError;
use crate::executor::RequestExecutor;
use crate::reaction::ToggleReaction;
use crate::registry::{EndpointDescriptor, EndpointKind, Registry};
use crate::tag::Tag;
use crate::transport::Transport;

/// Builder for [`ApiClient`].
///
/// Every collaborator has a default: the content platform catalogue, a
/// `reqwest` transport (with the `http` feature), an in-memory [`TokenStore`]
/// and a sink that logs through `tracing`.
#[derive(Default)]
#[must_use]
pub struct ApiClientBuilder {
    config: QueryConfig,
    registry: Option<Registry>,
    endpoints: Vec<EndpointDescriptor>,
    transport: Option<Arc<dyn Transport>>,
    auth: Option<Arc<dyn AuthProvider>>,
    sink: Option<Arc<dyn NotificationSink>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl ApiClientBuilder {
    pub fn config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the default catalogue.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Adds an endpoint on top of the catalogue.
    pub fn endpoint(mut self, descriptor: EndpointDescriptor) -> Self {
        self.endpoints.push(descriptor);
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn auth(mut self, auth: impl AuthProvider + 'static) -> Self {
        self.auth = Some(Arc::new(auth));
        self
    }

    pub fn sink(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    pub fn navigator(mut self, navigator: impl Navigator + 'static) -> Self {
        self.navigator = Some(Arc::new(navigator));
        self
    }

    /// Validates the registry and wires the client together.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::DuplicateEndpoint`] if two endpoints share a name,
    /// or a transport error if the default HTTP client cannot be built.
    pub fn init(self) -> Result<ApiClient, QueryError> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => endpoints::content_platform()?,
        };
        for descriptor in self.endpoints {
            registry.register(descriptor)?;
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };
        let auth = self
            .auth
            .unwrap_or_else(|| Arc::new(TokenStore::new()) as Arc<dyn AuthProvider>);
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn NotificationSink>);

        let executor = RequestExecutor::new(transport, auth, &self.config.base_url)
            .with_timeout(self.config.request_timeout);
        tracing::debug!(
            base_url = executor.base_url(),
            endpoints = registry.len(),
            "api client initialized"
        );

        let cache = QueryClient::new(Arc::new(registry), executor.clone(), self.config)
            .with_sink(Arc::clone(&sink));
        let bus = InvalidationBus::new(cache.clone());
        let writes = WritePath::new(cache.clone(), executor, bus.clone(), sink);

        Ok(ApiClient {
            cache,
            bus,
            writes,
            navigator: self.navigator,
        })
    }
}

#[cfg(feature = "http")]
fn default_transport() -> Result<Arc<dyn Transport>, QueryError> {
    Ok(Arc::new(crate::transport::ReqwestTransport::new()?))
}

#[cfg(not(feature = "http"))]
fn default_transport() -> Result<Arc<dyn Transport>, QueryError> {
    Err(QueryError::Transport(
        "no transport configured and the `http` feature is disabled".to_string(),
    ))
}

/// Entry point for reads and writes against the content platform API.
///
/// Cloning is cheap; clones share the cache.
///
/// # Example
///
/// ```rust
/// use quire::client::ApiClient;
/// use quire::endpoints::names;
/// use quire::mock::MockTransport;
/// use quire::registry::Method;
/// use serde_json::{Value, json};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), quire::QueryError> {
/// let mock = MockTransport::new();
/// mock.on(Method::Get, "stats/", 200, json!({ "posts": 3 }));
///
/// let client = ApiClient::builder().transport(mock).init()?;
/// let mut stats = client.query(names::GET_STATS, Value::Null)?;
/// assert_eq!(stats.settled().await?.data, Some(json!({ "posts": 3 })));
///
/// client.dispose();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiClient {
    cache: QueryClient,
    bus: InvalidationBus,
    writes: WritePath,
    navigator: Option<Arc<dyn Navigator>>,
}

impl ApiClient {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Subscribes to a read endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is unknown or not a read endpoint, or the
    /// client has been disposed.
    pub fn query(&self, name: &str, args: Value) -> Result<Subscription, QueryError> {
        self.cache.subscribe(name, args)
    }

    /// A handle on a write endpoint with observable state.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is unknown or not a write endpoint, or the
    /// client has been disposed.
    pub fn mutation(&self, name: &str) -> Result<Mutation, QueryError> {
        if self.is_disposed() {
            return Err(QueryError::Disposed);
        }
        let descriptor = self.cache.registry().lookup(name)?;
        descriptor.expect_kind(EndpointKind::Write)?;
        Ok(Mutation::new(descriptor, self.writes.clone()))
    }

    /// Executes a write endpoint once.
    ///
    /// # Errors
    ///
    /// Returns the lookup error or the request's error.
    pub async fn mutate(&self, name: &str, args: Value) -> Result<Value, QueryError> {
        self.mutation(name)?.trigger(args).await
    }

    /// Executes a write endpoint, then navigates to the route `route` derives
    /// from the response, if any.
    ///
    /// # Errors
    ///
    /// Returns the lookup error or the request's error. Nothing is navigated
    /// on failure.
    pub async fn mutate_and_navigate<F>(
        &self,
        name: &str,
        args: Value,
        route: F,
    ) -> Result<Value, QueryError>
    where
        F: FnOnce(&Value) -> Option<String>,
    {
        let response = self.mutate(name, args).await?;
        if let (Some(navigator), Some(route)) = (&self.navigator, route(&response)) {
            tracing::debug!(%route, "navigating after write");
            navigator.navigate(&route);
        }
        Ok(response)
    }

    /// Toggles the viewer's reaction on a content item.
    ///
    /// # Errors
    ///
    /// Returns the request's error after the prediction has been rolled back.
    pub async fn toggle_reaction(&self, toggle: &ToggleReaction) -> Result<Value, QueryError> {
        self.mutate(endpoints::names::TOGGLE_REACTION, toggle.to_args())
            .await
    }

    /// Marks every entry providing one of `tags` stale.
    pub fn invalidate(&self, tags: Vec<Tag>) -> Invalidation {
        self.bus.invalidate(tags)
    }

    /// Listens for processed invalidations.
    pub fn invalidations(&self) -> broadcast::Receiver<Invalidation> {
        self.bus.subscribe()
    }

    pub const fn cache(&self) -> &QueryClient {
        &self.cache
    }

    pub fn registry(&self) -> &Registry {
        self.cache.registry()
    }

    /// Drops every entry and rejects further calls.
    pub fn dispose(&self) {
        tracing::info!("api client disposed");
        self.cache.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.cache.is_disposed()
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("cache", &self.cache)
            .field("navigator", &self.navigator.is_some())
            .finish_non_exhaustive()
    }
}
