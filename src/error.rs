use serde_json::Value;
use thiserror::Error;

/// Error type shared by every layer of the cache.
///
/// Errors are `Clone` because a single in-flight fetch resolves for every
/// subscriber that joined it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Endpoint registered twice: {0}")]
    DuplicateEndpoint(String),

    #[error("Endpoint {name} is a {actual}, not a {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid arguments for {endpoint}: {reason}")]
    InvalidArgs { endpoint: String, reason: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {}", extract_message(.body).unwrap_or("request failed"))]
    Http { status: u16, body: Value },

    #[error("Response for evicted entry {0} discarded")]
    StaleEvictedResponse(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Client has been disposed")]
    Disposed,
}

impl QueryError {
    /// Returns the HTTP status if the server answered with a failure.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` for a 401 response, which signs the user out.
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Http { status: 401, .. })
    }

    /// The text shown to the user for this error.
    pub fn message(&self) -> String {
        match self {
            Self::Http { status, body } => match extract_message(body) {
                Some(message) => message.to_string(),
                None => match status {
                    401 => "Your session has expired, please log in again".to_string(),
                    403 => "You do not have permission to do that".to_string(),
                    404 => "Not found".to_string(),
                    500..=599 => "The server encountered an error".to_string(),
                    _ => format!("Request failed with status {status}"),
                },
            },
            Self::Transport(_) => "Unable to reach the server".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

fn extract_message(body: &Value) -> Option<&str> {
    match body {
        Value::String(text) if !text.is_empty() => Some(text),
        Value::Object(map) => ["message", "detail", "error"]
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_error_display() {
        let err = QueryError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "Network error: connection refused");

        let err = QueryError::UnknownEndpoint("get_everything".to_string());
        assert_eq!(err.to_string(), "Unknown endpoint: get_everything");
    }

    #[test]
    fn test_message_prefers_body_fields() {
        let err = QueryError::Http {
            status: 400,
            body: json!({ "message": "Title is required" }),
        };
        assert_eq!(err.message(), "Title is required");

        let err = QueryError::Http {
            status: 403,
            body: json!({ "detail": "Not an editor" }),
        };
        assert_eq!(err.message(), "Not an editor");
    }

    #[test]
    fn test_message_falls_back_to_status() {
        let err = QueryError::Http {
            status: 503,
            body: Value::Null,
        };
        assert_eq!(err.message(), "The server encountered an error");
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_unauthorized());

        let err = QueryError::Http {
            status: 401,
            body: json!({}),
        };
        assert!(err.is_unauthorized());
    }
}
