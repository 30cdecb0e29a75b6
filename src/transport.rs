//! HTTP transport seam.
//!
//! The [`RequestExecutor`](crate::executor::RequestExecutor) builds fully
//! resolved [`HttpRequest`]s and hands them to a [`Transport`]. The default
//! implementation is backed by `reqwest`; tests use
//! [`MockTransport`](crate::mock::MockTransport).

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::QueryError;
use crate::registry::Method;

/// A request ready to be put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL without the query string.
    pub url: String,
    /// Path relative to the API base, e.g. `content/42/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// The raw answer of the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            body: body.to_string().into_bytes(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Parses the body as JSON. An empty body is `null`, a non-JSON body is
    /// returned as a string.
    pub fn body_json(&self) -> Value {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Value::Null;
        }
        serde_json::from_slice(&self.body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }
}

/// Sends one request and reports the server's answer.
///
/// Implementations return [`QueryError::Transport`] only when no response was
/// received; HTTP failure statuses are ordinary responses.
pub trait Transport: Send + Sync {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, QueryError>>;
}

#[cfg(feature = "http")]
pub use self::reqwest_transport::ReqwestTransport;

#[cfg(feature = "http")]
mod reqwest_transport {
    use futures::FutureExt as _;
    use futures::future::BoxFuture;

    use super::{HttpRequest, HttpResponse, Transport};
    use crate::error::QueryError;
    use crate::registry::Method;

    /// [`Transport`] backed by a shared `reqwest::Client` with a cookie store.
    #[derive(Debug, Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        /// # Errors
        ///
        /// Returns an error if the TLS backend cannot be initialized.
        pub fn new() -> Result<Self, QueryError> {
            let client = reqwest::Client::builder()
                .cookie_store(true)
                .build()
                .map_err(|e| QueryError::Transport(e.to_string()))?;
            Ok(Self { client })
        }

        pub const fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    impl From<Method> for reqwest::Method {
        fn from(method: Method) -> Self {
            match method {
                Method::Get => Self::GET,
                Method::Post => Self::POST,
                Method::Put => Self::PUT,
                Method::Patch => Self::PATCH,
                Method::Delete => Self::DELETE,
            }
        }
    }

    impl Transport for ReqwestTransport {
        fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, QueryError>> {
            let client = self.client.clone();

            async move {
                let mut builder = client
                    .request(request.method.into(), &request.url)
                    .query(&request.query);
                for (name, value) in &request.headers {
                    builder = builder.header(name, value);
                }
                if let Some(body) = &request.body {
                    builder = builder.json(body);
                }

                let response = builder
                    .send()
                    .await
                    .map_err(|e| QueryError::Transport(e.to_string()))?;
                let status = response.status().as_u16();
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| QueryError::Transport(e.to_string()))?;

                Ok(HttpResponse {
                    status,
                    body: body.to_vec(),
                })
            }
            .boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_json() {
        let response = HttpResponse::json(200, &json!({ "id": 1 }));
        assert!(response.is_success());
        assert_eq!(response.body_json(), json!({ "id": 1 }));

        let empty = HttpResponse {
            status: 204,
            body: Vec::new(),
        };
        assert_eq!(empty.body_json(), Value::Null);

        let text = HttpResponse {
            status: 502,
            body: b"Bad Gateway".to_vec(),
        };
        assert!(!text.is_success());
        assert_eq!(text.body_json(), json!("Bad Gateway"));
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = HttpRequest {
            method: Method::Get,
            url: "http://localhost/api/content/".to_string(),
            path: "content/".to_string(),
            query: Vec::new(),
            headers: vec![("Accept".to_string(), "application/json".to_string())],
            body: None,
        };
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(request.header("authorization"), None);
    }
}
