//! Request executor: one HTTP call per invocation.
//!
//! The executor resolves a descriptor's [`RequestSpec`](crate::registry::RequestSpec)
//! against the base URL, attaches the bearer credential and standard headers,
//! and folds every outcome into `Result<Value, QueryError>`:
//!
//! - 2xx: `Ok(body)`
//! - 4xx/5xx: [`QueryError::Http`]
//! - no response: [`QueryError::Transport`]
//!
//! It never retries. A 401 is reported to the [`AuthProvider`] before the error
//! is returned.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::Instrument as _;

use crate::collaborators::AuthProvider;
use crate::error::QueryError;
use crate::registry::EndpointDescriptor;
use crate::transport::{HttpRequest, Transport};

#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthProvider>,
    base_url: Arc<str>,
    timeout: Option<Duration>,
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthProvider>,
        base_url: &str,
    ) -> Self {
        Self {
            transport,
            auth,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            timeout: None,
        }
    }

    /// Bounds every call; an elapsed timeout resolves to a transport error.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves a descriptor and arguments into a wire request.
    pub fn prepare(
        &self,
        descriptor: &EndpointDescriptor,
        args: &Value,
    ) -> Result<HttpRequest, QueryError> {
        let spec = descriptor.build_request(args)?;
        let path = spec.path.trim_start_matches('/').to_string();

        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(token) = self.auth.token() {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }
        if spec.body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        Ok(HttpRequest {
            method: spec.method,
            url: format!("{}/{path}", self.base_url),
            path,
            query: spec.query,
            headers,
            body: spec.body,
        })
    }

    /// Executes `descriptor` with `args`.
    pub async fn execute(
        &self,
        descriptor: &EndpointDescriptor,
        args: &Value,
    ) -> Result<Value, QueryError> {
        let request = self.prepare(descriptor, args)?;
        let span = tracing::debug_span!(
            "execute",
            endpoint = descriptor.name(),
            method = %request.method,
            path = %request.path,
        );

        async move {
            let sending = self.transport.send(request);
            let response = match self.timeout {
                Some(limit) => tokio::time::timeout(limit, sending)
                    .await
                    .map_err(|_| QueryError::Transport(format!("timed out after {limit:?}")))?,
                None => sending.await,
            }
            .inspect_err(|err| tracing::debug!(%err, "no response"))?;

            let body = response.body_json();
            if response.is_success() {
                tracing::debug!(status = response.status, "ok");
                return Ok(body);
            }

            let err = QueryError::Http {
                status: response.status,
                body,
            };
            if err.is_unauthorized() {
                tracing::warn!("unauthorized, notifying auth provider");
                self.auth.on_unauthorized();
            } else {
                tracing::debug!(status = response.status, "request failed");
            }
            Err(err)
        }
        .instrument(span)
        .await
    }
}

impl fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
