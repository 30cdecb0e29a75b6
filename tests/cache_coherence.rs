// Integration tests for request dedup and tag invalidation

use color_eyre::eyre::Result;
use quire::mock::MockTransport;
use quire::prelude::*;
use quire::registry::{CacheKey, Method};
use serde_json::{Value, json};
use tokio::time::{Duration, timeout};

fn client(mock: &MockTransport) -> Result<ApiClient> {
    Ok(ApiClient::builder().transport(mock.clone()).init()?)
}

#[tokio::test]
async fn test_concurrent_subscribers_share_one_request() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Get, "categories/", 200, json!([{ "id": 1, "name": "news" }]));
    mock.pause();
    let client = client(&mock)?;

    let mut sidebar = client.query(names::GET_CATEGORIES, Value::Null)?;
    let mut editor = client.query(names::GET_CATEGORIES, Value::Null)?;
    mock.wait_for_requests(1).await;
    mock.resume();

    let (a, b) = timeout(Duration::from_secs(1), async {
        tokio::join!(sidebar.settled(), editor.settled())
    })
    .await?;
    let (a, b) = (a?, b?);

    assert_eq!(a.data, Some(json!([{ "id": 1, "name": "news" }])));
    assert_eq!(a, b);
    assert_eq!(mock.count(Method::Get, "categories/"), 1);
    Ok(())
}

#[tokio::test]
async fn test_args_are_part_of_the_key() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Get, "content/", 200, json!({ "results": [] }));
    let client = client(&mock)?;

    let mut first = client.query(names::LIST_CONTENT, json!({ "page": 1, "search": "rust" }))?;
    let mut same = client.query(names::LIST_CONTENT, json!({ "search": "rust", "page": 1 }))?;
    let mut other = client.query(names::LIST_CONTENT, json!({ "page": 2, "search": "rust" }))?;
    first.settled().await?;
    same.settled().await?;
    other.settled().await?;

    assert_eq!(first.key(), same.key());
    assert_ne!(first.key(), other.key());
    assert_eq!(mock.count(Method::Get, "content/"), 2);

    let queries: Vec<_> = mock.requests().into_iter().map(|r| r.query).collect();
    assert!(queries.contains(&vec![
        ("page".to_string(), "2".to_string()),
        ("search".to_string(), "rust".to_string()),
    ]));
    Ok(())
}

#[tokio::test]
async fn test_update_refetches_list_and_detail() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Get, "content/", 200, json!({ "results": [{ "id": 42, "title": "Old" }] }))
        .on(Method::Get, "content/", 200, json!({ "results": [{ "id": 42, "title": "New" }] }));
    mock.on(Method::Get, "content/42/", 200, json!({ "id": 42, "title": "Old" }))
        .on(Method::Get, "content/42/", 200, json!({ "id": 42, "title": "New" }));
    mock.on(Method::Get, "categories/", 200, json!([]));
    mock.on(Method::Put, "content/42/update/", 200, json!({ "id": 42, "title": "New" }));
    let client = client(&mock)?;

    let mut list = client.query(names::LIST_CONTENT, json!({}))?;
    let mut detail = client.query(names::GET_CONTENT, json!({ "id": 42 }))?;
    let mut categories = client.query(names::GET_CATEGORIES, Value::Null)?;
    list.settled().await?;
    detail.settled().await?;
    categories.settled().await?;

    let mut events = client.invalidations();
    client
        .mutate(names::UPDATE_CONTENT, json!({ "id": 42, "data": { "title": "New" } }))
        .await?;
    assert_eq!(events.recv().await?.affected, 2);

    let fresh = |r: &QueryResult| r.is_success() && !r.is_stale;
    let list = timeout(Duration::from_secs(1), list.wait_for(fresh)).await??;
    let detail = timeout(Duration::from_secs(1), detail.wait_for(fresh)).await??;
    assert_eq!(list.data.expect("list data")["results"][0]["title"], "New");
    assert_eq!(detail.data.expect("detail data")["title"], "New");

    // Categories provide no content tag.
    assert_eq!(mock.count(Method::Get, "categories/"), 1);
    assert!(!categories.current().is_stale);

    let body = mock.requests().into_iter().find(|r| r.method == Method::Put).and_then(|r| r.body);
    assert_eq!(body, Some(json!({ "title": "New" })));
    Ok(())
}

#[tokio::test]
async fn test_unwatched_entry_goes_idle_and_refetches_on_next_subscribe() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Get, "content/42/", 200, json!({ "id": 42, "title": "Old" }))
        .on(Method::Get, "content/42/", 200, json!({ "id": 42, "title": "New" }));
    mock.on(Method::Delete, "content/7/delete/", 204, Value::Null);
    let client = client(&mock)?;
    let key = CacheKey::new(names::GET_CONTENT, &json!({ "id": 42 }));

    let mut detail = client.query(names::GET_CONTENT, json!({ "id": 42 }))?;
    detail.settled().await?;
    drop(detail);

    client.mutate(names::DELETE_CONTENT, json!({ "id": 7 })).await?;

    let snapshot = client.cache().snapshot(&key).expect("entry is still cached");
    assert_eq!(snapshot.status, QueryStatus::Idle);
    assert!(snapshot.is_stale);
    assert_eq!(mock.count(Method::Get, "content/42/"), 1);

    let mut detail = client.query(names::GET_CONTENT, json!({ "id": 42 }))?;
    let result = timeout(Duration::from_secs(1), detail.settled()).await??;
    assert_eq!(result.data, Some(json!({ "id": 42, "title": "New" })));
    assert_eq!(mock.count(Method::Get, "content/42/"), 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_refetch_keeps_last_good_data() -> Result<()> {
    let mock = MockTransport::new();
    mock.on(Method::Get, "stats/", 200, json!({ "posts": 3 }))
        .fail(Method::Get, "stats/", "connection reset");
    let client = client(&mock)?;

    let mut stats = client.query(names::GET_STATS, Value::Null)?;
    stats.settled().await?;

    client.invalidate(vec![Tag::category(ResourceCategory::Stats)]);
    let failed = timeout(Duration::from_secs(1), stats.wait_for(QueryResult::is_error)).await??;
    assert_eq!(failed.data, Some(json!({ "posts": 3 })));
    assert!(matches!(failed.error, Some(QueryError::Transport(_))));
    Ok(())
}
