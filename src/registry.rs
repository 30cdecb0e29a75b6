//! Resource registry: the static catalogue of endpoints.
//!
//! Every read and write the application performs is declared once, at startup,
//! as an [`EndpointDescriptor`]. A descriptor knows how to turn JSON arguments
//! into a [`RequestSpec`], and which [`Tag`]s its result provides (reads) or
//! invalidates (writes). The [`Registry`] owns the descriptors for the life of
//! the process and refuses to register a name twice.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::error::QueryError;
use crate::tag::Tag;

/// HTTP methods used by the platform API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The endpoint-relative description of one HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    /// Path relative to the API base, e.g. `content/42/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Adds a query parameter, skipping empty values.
    #[must_use]
    pub fn with_query(mut self, name: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        if !value.is_empty() {
            self.query.push((name.to_string(), value));
        }
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Whether an endpoint reads (and is cached) or writes (and invalidates).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Read,
    Write,
}

impl EndpointKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "query",
            Self::Write => "mutation",
        }
    }
}

pub type BuildRequest = Arc<dyn Fn(&Value) -> Result<RequestSpec, QueryError> + Send + Sync>;

/// Computes tags from `(args, result)`.
pub type TagFn = Arc<dyn Fn(&Value, &Value) -> Vec<Tag> + Send + Sync>;

/// Computes the predicted data of a cache entry from `(current, args)`.
pub type PredictFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// Folds a confirmed write response into entry data: `(current, args, response)`.
pub type ReconcileFn = Arc<dyn Fn(&Value, &Value, &Value) -> Option<Value> + Send + Sync>;

/// How a write is shown before the server confirms it.
#[derive(Clone)]
pub struct OptimisticPolicy {
    /// Tags naming the cache entries the prediction applies to.
    pub targets: Arc<dyn Fn(&Value) -> Vec<Tag> + Send + Sync>,
    pub predict: PredictFn,
    /// Replaces the prediction with server data when the response carries it.
    pub reconcile: Option<ReconcileFn>,
}

impl fmt::Debug for OptimisticPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticPolicy")
            .field("reconcile", &self.reconcile.is_some())
            .finish_non_exhaustive()
    }
}

/// An immutable endpoint declaration.
#[derive(Clone)]
pub struct EndpointDescriptor {
    name: &'static str,
    kind: EndpointKind,
    build: BuildRequest,
    provides: Option<TagFn>,
    invalidates: Option<TagFn>,
    optimistic: Option<OptimisticPolicy>,
}

impl EndpointDescriptor {
    /// Declares a read endpoint.
    pub fn query<F>(name: &'static str, build: F) -> Self
    where
        F: Fn(&Value) -> Result<RequestSpec, QueryError> + Send + Sync + 'static,
    {
        Self {
            name,
            kind: EndpointKind::Read,
            build: Arc::new(build),
            provides: None,
            invalidates: None,
            optimistic: None,
        }
    }

    /// Declares a write endpoint.
    pub fn mutation<F>(name: &'static str, build: F) -> Self
    where
        F: Fn(&Value) -> Result<RequestSpec, QueryError> + Send + Sync + 'static,
    {
        Self {
            kind: EndpointKind::Write,
            ..Self::query(name, build)
        }
    }

    #[must_use]
    pub fn provides<F>(mut self, tags: F) -> Self
    where
        F: Fn(&Value, &Value) -> Vec<Tag> + Send + Sync + 'static,
    {
        self.provides = Some(Arc::new(tags));
        self
    }

    #[must_use]
    pub fn invalidates<F>(mut self, tags: F) -> Self
    where
        F: Fn(&Value, &Value) -> Vec<Tag> + Send + Sync + 'static,
    {
        self.invalidates = Some(Arc::new(tags));
        self
    }

    #[must_use]
    pub fn optimistic(mut self, policy: OptimisticPolicy) -> Self {
        self.optimistic = Some(policy);
        self
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub const fn optimistic_policy(&self) -> Option<&OptimisticPolicy> {
        self.optimistic.as_ref()
    }

    pub fn build_request(&self, args: &Value) -> Result<RequestSpec, QueryError> {
        (self.build)(args)
    }

    pub fn provided_tags(&self, args: &Value, result: &Value) -> Vec<Tag> {
        self.provides
            .as_ref()
            .map(|tags| tags(args, result))
            .unwrap_or_default()
    }

    pub fn invalidated_tags(&self, args: &Value, result: &Value) -> Vec<Tag> {
        self.invalidates
            .as_ref()
            .map(|tags| tags(args, result))
            .unwrap_or_default()
    }

    /// Fails with [`QueryError::WrongKind`] unless this endpoint is of `kind`.
    pub fn expect_kind(&self, kind: EndpointKind) -> Result<(), QueryError> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(QueryError::WrongKind {
                name: self.name.to_string(),
                expected: kind.as_str(),
                actual: self.kind.as_str(),
            })
        }
    }
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("optimistic", &self.optimistic.is_some())
            .finish_non_exhaustive()
    }
}

/// Write-once catalogue of endpoint descriptors.
#[derive(Debug, Default)]
pub struct Registry {
    endpoints: DashMap<&'static str, Arc<EndpointDescriptor>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor. A name can only be registered once.
    pub fn register(&self, descriptor: EndpointDescriptor) -> Result<(), QueryError> {
        match self.endpoints.entry(descriptor.name) {
            dashmap::Entry::Occupied(entry) => {
                Err(QueryError::DuplicateEndpoint(entry.key().to_string()))
            }
            dashmap::Entry::Vacant(entry) => {
                tracing::trace!(endpoint = descriptor.name, kind = ?descriptor.kind, "registered");
                entry.insert(Arc::new(descriptor));
                Ok(())
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<EndpointDescriptor>, QueryError> {
        self.endpoints
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| QueryError::UnknownEndpoint(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

/// Deterministic identity of one `(endpoint, args)` read.
///
/// Object keys are serialized in sorted order, so structurally equal arguments
/// always produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(endpoint: &str, args: &Value) -> Self {
        let mut key = String::with_capacity(endpoint.len() + 16);
        key.push_str(endpoint);
        key.push('(');
        write_canonical(&mut key, args);
        key.push(')');
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, item)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(out, item);
            }
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Renders a JSON scalar id (`42` or `"42"`) as a path segment.
pub fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Reads a required id argument, e.g. `{"id": 42}`.
pub fn arg_id(endpoint: &str, args: &Value, field: &str) -> Result<String, QueryError> {
    args.get(field)
        .and_then(id_of)
        .ok_or_else(|| QueryError::InvalidArgs {
            endpoint: endpoint.to_string(),
            reason: format!("missing `{field}`"),
        })
}

/// Reads an optional string-like argument, returning an empty string if absent.
pub fn arg_str(args: &Value, field: &str) -> String {
    match args.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::ResourceCategory;
    use serde_json::json;

    fn categories() -> EndpointDescriptor {
        EndpointDescriptor::query("get_categories", |_| Ok(RequestSpec::get("categories/")))
            .provides(|_, _| vec![Tag::category(ResourceCategory::Category)])
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = Registry::new();
        registry.register(categories()).expect("first registration");

        let descriptor = registry.lookup("get_categories").expect("registered");
        assert_eq!(descriptor.kind(), EndpointKind::Read);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_twice_fails() {
        let registry = Registry::new();
        registry.register(categories()).expect("first registration");

        let err = registry.register(categories()).unwrap_err();
        assert_eq!(err, QueryError::DuplicateEndpoint("get_categories".to_string()));
    }

    #[test]
    fn test_lookup_unknown() {
        let registry = Registry::new();
        let err = registry.lookup("nope").unwrap_err();
        assert_eq!(err, QueryError::UnknownEndpoint("nope".to_string()));
    }

    #[test]
    fn test_expect_kind() {
        let descriptor = categories();
        assert!(descriptor.expect_kind(EndpointKind::Read).is_ok());
        assert!(matches!(
            descriptor.expect_kind(EndpointKind::Write),
            Err(QueryError::WrongKind { .. })
        ));
    }

    #[test]
    fn test_cache_key_ignores_field_order() {
        let a = CacheKey::new("list_content", &json!({ "page": 1, "search": "rust" }));
        let b = CacheKey::new("list_content", &json!({ "search": "rust", "page": 1 }));
        assert_eq!(a, b);
        assert_eq!(a.as_str(), r#"list_content({"page":1,"search":"rust"})"#);
    }

    #[test]
    fn test_cache_key_distinguishes_args_and_endpoints() {
        let a = CacheKey::new("get_content", &json!({ "id": 1 }));
        let b = CacheKey::new("get_content", &json!({ "id": 2 }));
        let c = CacheKey::new("get_comments", &json!({ "id": 1 }));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_request_spec_skips_empty_query_values() {
        let spec = RequestSpec::get("content/")
            .with_query("page", 2)
            .with_query("search", "");
        assert_eq!(spec.query, vec![("page".to_string(), "2".to_string())]);
    }

    #[test]
    fn test_arg_helpers() {
        let args = json!({ "id": 42, "slug": "hello" });
        assert_eq!(arg_id("get_content", &args, "id").unwrap(), "42");
        assert_eq!(arg_str(&args, "slug"), "hello");
        assert_eq!(arg_str(&args, "missing"), "");
        assert!(matches!(
            arg_id("get_content", &json!({}), "id"),
            Err(QueryError::InvalidArgs { .. })
        ));
    }
}
