// Integration tests for client lifecycle, auth and eviction

use std::sync::{Arc, Mutex};

use color_eyre::eyre::Result;
use quire::collaborators::TokenStore;
use quire::mock::MockTransport;
use quire::prelude::*;
use quire::registry::{CacheKey, Method};
use serde_json::{Value, json};
use tokio::time::{Duration, sleep, timeout};

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

impl Navigator for Recorder {
    fn navigate(&self, route: &str) {
        self.0.lock().unwrap().push(route.to_string());
    }
}

impl NotificationSink for Recorder {
    fn notify(&self, _level: NoticeLevel, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

#[tokio::test]
async fn test_unauthorized_read_signs_out() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Get, "profile/", 401, json!({ "detail": "Token expired" }));
    let auth = TokenStore::with_token("stale-token");
    let client = ApiClient::builder()
        .transport(mock.clone())
        .auth(auth.clone())
        .init()?;

    let mut profile = client.query(names::GET_PROFILE, Value::Null)?;
    let result = timeout(Duration::from_secs(1), profile.settled()).await??;

    assert!(result.is_error());
    assert!(result.error.is_some_and(|e| e.is_unauthorized()));
    assert!(!auth.is_signed_in());
    assert_eq!(mock.requests()[0].header("Authorization"), Some("Bearer stale-token"));
    Ok(())
}

#[tokio::test]
async fn test_unauthorized_write_signs_out_and_notifies() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Post, "categories/create/", 401, Value::Null);
    let auth = TokenStore::with_token("stale-token");
    let sink = Recorder::default();
    let client = ApiClient::builder()
        .transport(mock.clone())
        .auth(auth.clone())
        .sink(sink.clone())
        .init()?;

    let err = client
        .mutate(names::CREATE_CATEGORY, json!({ "name": "rust" }))
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
    assert!(!auth.is_signed_in());
    assert_eq!(
        sink.entries(),
        vec!["Your session has expired, please log in again".to_string()]
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_read_notifies_once_per_request() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(
        Method::Get,
        "categories/",
        500,
        json!({ "message": "Failed to load categories" }),
    )
    .on(Method::Get, "categories/", 200, json!(["news"]));
    let sink = Recorder::default();
    let client = ApiClient::builder()
        .transport(mock.clone())
        .sink(sink.clone())
        .init()?;

    let mut first = client.query(names::GET_CATEGORIES, Value::Null)?;
    let mut second = client.query(names::GET_CATEGORIES, Value::Null)?;
    let result = timeout(Duration::from_secs(1), first.settled()).await??;
    assert!(result.is_error());
    assert!(timeout(Duration::from_secs(1), second.settled()).await??.is_error());

    assert_eq!(mock.count(Method::Get, "categories/"), 1);
    assert_eq!(sink.entries(), vec!["Failed to load categories".to_string()]);

    // A successful retry adds nothing.
    let mut retry = client.query(names::GET_CATEGORIES, Value::Null)?;
    let result = timeout(
        Duration::from_secs(1),
        retry.wait_for(QueryResult::is_success),
    )
    .await??;
    assert_eq!(result.data, Some(json!(["news"])));
    assert_eq!(sink.entries().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_mutate_and_navigate() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Post, "content/create/", 201, json!({ "id": 99, "slug": "hello" }));
    mock.on(Method::Post, "content/create/", 400, json!({ "message": "Title required" }));
    let navigator = Recorder::default();
    let client = ApiClient::builder()
        .transport(mock.clone())
        .navigator(navigator.clone())
        .init()?;

    let to_post = |created: &Value| created["id"].as_u64().map(|id| format!("/content/{id}"));
    client
        .mutate_and_navigate(names::CREATE_CONTENT, json!({ "title": "Hello" }), to_post)
        .await?;
    assert_eq!(navigator.entries(), vec!["/content/99".to_string()]);

    let result = client
        .mutate_and_navigate(names::CREATE_CONTENT, json!({}), to_post)
        .await;
    assert!(result.is_err());
    assert_eq!(navigator.entries().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_mutation_state_is_observable() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Delete, "content/42/delete/", 204, Value::Null);
    mock.pause();
    let client = ApiClient::builder().transport(mock.clone()).init()?;

    let delete = client.mutation(names::DELETE_CONTENT)?;
    let mut state = delete.watch();
    assert!(!state.borrow().is_loading());

    let running = tokio::spawn({
        let delete = delete.clone();
        async move { delete.trigger(json!({ "id": 42 })).await }
    });
    timeout(Duration::from_secs(1), state.wait_for(MutationResult::is_loading)).await??;

    mock.resume();
    timeout(Duration::from_secs(1), running).await???;
    assert_eq!(delete.state().data(), Some(&Value::Null));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_entry_is_evicted_after_grace_window() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Get, "stats/", 200, json!({ "posts": 1 }));
    let config = QueryConfig::default().with_cache_time(Duration::from_secs(30));
    let client = ApiClient::builder()
        .config(config)
        .transport(mock.clone())
        .init()?;
    let key = CacheKey::new(names::GET_STATS, &Value::Null);

    let mut stats = client.query(names::GET_STATS, Value::Null)?;
    stats.settled().await?;
    stats.release();

    sleep(Duration::from_secs(29)).await;
    assert!(client.cache().contains(&key));

    sleep(Duration::from_secs(2)).await;
    assert!(!client.cache().contains(&key));

    // A fresh subscriber starts over.
    let mut stats = client.query(names::GET_STATS, Value::Null)?;
    stats.settled().await?;
    assert_eq!(mock.count(Method::Get, "stats/"), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_late_response_does_not_recreate_entry() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Get, "stats/", 200, json!({ "posts": 1 }));
    mock.pause();
    let config = QueryConfig::default().with_cache_time(Duration::from_secs(1));
    let client = ApiClient::builder()
        .config(config)
        .transport(mock.clone())
        .init()?;
    let key = CacheKey::new(names::GET_STATS, &Value::Null);

    let stats = client.query(names::GET_STATS, Value::Null)?;
    mock.wait_for_requests(1).await;
    drop(stats);

    sleep(Duration::from_secs(2)).await;
    assert!(!client.cache().contains(&key));

    mock.resume();
    sleep(Duration::from_millis(10)).await;
    assert!(!client.cache().contains(&key));
    assert!(client.cache().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_dispose_closes_subscriptions() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Get, "stats/", 200, json!({}));
    let client = ApiClient::builder().transport(mock.clone()).init()?;

    let mut stats = client.query(names::GET_STATS, Value::Null)?;
    stats.settled().await?;

    client.dispose();
    assert!(client.cache().is_empty());
    assert_eq!(stats.changed().await.unwrap_err(), QueryError::Disposed);
    assert_eq!(
        client.mutation(names::CREATE_CATEGORY).unwrap_err(),
        QueryError::Disposed
    );
    Ok(())
}
