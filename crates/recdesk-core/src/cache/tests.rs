#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

use recdesk_api::{AuthPaths, Error, RawResponse, RequestSpec, Session, Transport};

use super::*;
use crate::endpoint::{EndpointDef, decode_body};

// ── Fixtures ─────────────────────────────────────────────────────────

/// In-memory backend: one JSON body per path, a call counter per path.
#[derive(Default)]
struct FakeBackend {
    bodies: Mutex<HashMap<String, Value>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Duration,
}

impl FakeBackend {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn set(&self, path: &str, body: Value) {
        self.bodies.lock().unwrap().insert(path.to_owned(), body);
    }

    fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

impl Transport for FakeBackend {
    fn send<'a>(&'a self, spec: &'a RequestSpec) -> BoxFuture<'a, Result<RawResponse, Error>> {
        Box::pin(async move {
            *self
                .calls
                .lock()
                .unwrap()
                .entry(spec.path.clone())
                .or_default() += 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let body = self.bodies.lock().unwrap().get(&spec.path).cloned();
            body.map(|body| RawResponse::new(200, body))
                .ok_or_else(|| Error::http(404, r#"{"message":"no such path"}"#))
        })
    }
}

/// Lists whatever JSON array lives at the path given as argument.
struct ListDef {
    name: &'static str,
    kind: &'static str,
}

impl EndpointDef for ListDef {
    type Arg = String;
    type Output = Vec<Value>;

    fn name(&self) -> &str {
        self.name
    }

    fn tag_type(&self) -> &str {
        self.kind
    }

    fn build_request(&self, arg: &String) -> Result<RequestSpec, CoreError> {
        Ok(RequestSpec::get(arg.clone()))
    }

    fn transform_response(&self, raw: RawResponse) -> Result<Vec<Value>, CoreError> {
        decode_body(raw.body, "test list")
    }
}

impl QueryDef for ListDef {
    fn provides_tags(&self, result: &Vec<Value>, _arg: &String) -> Vec<Tag> {
        let mut tags = vec![Tag::list(self.kind)];
        tags.extend(
            result
                .iter()
                .filter_map(|item| item.get("_id").and_then(Value::as_str))
                .map(|id| Tag::id(self.kind, id)),
        );
        tags
    }
}

fn setup_with(
    backend: FakeBackend,
    config: QueryConfig,
) -> (Arc<FakeBackend>, QueryCache, QueryEndpoint<ListDef>) {
    let backend = Arc::new(backend);
    let client = ApiClient::new(backend.clone(), Session::new(), AuthPaths::default());
    let cache = QueryCache::new(client, config);
    let endpoint = cache
        .register_query(ListDef {
            name: "assets.list",
            kind: "Asset",
        })
        .unwrap();
    backend.set("/assets", json!([{ "_id": "a1" }, { "_id": "a2" }]));
    (backend, cache, endpoint)
}

fn setup() -> (Arc<FakeBackend>, QueryCache, QueryEndpoint<ListDef>) {
    setup_with(FakeBackend::default(), QueryConfig::default())
}

fn assets() -> String {
    "/assets".to_owned()
}

fn ids(data: &[Value]) -> Vec<&str> {
    data.iter()
        .filter_map(|item| item.get("_id").and_then(Value::as_str))
        .collect()
}

// ── Coalescing & freshness ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn concurrent_subscribers_share_one_request() {
    let (backend, cache, endpoint) =
        setup_with(FakeBackend::with_delay(Duration::from_millis(50)), QueryConfig::default());

    let mut first = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    let mut second = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    assert!(first.state().is_loading());

    let (a, b) = tokio::join!(first.settled(), second.settled());
    assert_eq!(ids(&a.unwrap()), vec!["a1", "a2"]);
    assert_eq!(ids(&b.unwrap()), vec!["a1", "a2"]);
    assert_eq!(backend.calls("/assets"), 1);
    assert_eq!(cache.entry_count(), 1);
    assert_eq!(cache.subscriber_count(first.key()), 2);
}

#[tokio::test(start_paused = true)]
async fn fresh_entry_is_served_from_cache() {
    let (backend, _cache, endpoint) = setup();

    endpoint.fetch(assets()).await.unwrap();
    endpoint.fetch(assets()).await.unwrap();

    assert_eq!(backend.calls("/assets"), 1);
}

#[tokio::test(start_paused = true)]
async fn refetch_on_mount_bypasses_fresh_entry() {
    let (backend, _cache, endpoint) = setup();

    let mut first = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    first.settled().await.unwrap();

    let mut second = endpoint
        .subscribe(assets(), SubscribeOptions::default().refetch_on_mount())
        .unwrap();
    second.settled().await.unwrap();

    assert_eq!(backend.calls("/assets"), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_time_expires_entries() {
    let config = QueryConfig {
        stale_time: Some(Duration::from_secs(30)),
        ..QueryConfig::default()
    };
    let (backend, _cache, endpoint) = setup_with(FakeBackend::default(), config);

    let _keep = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    endpoint.fetch(assets()).await.unwrap();
    assert_eq!(backend.calls("/assets"), 1);

    tokio::time::sleep(Duration::from_secs(31)).await;
    endpoint.fetch(assets()).await.unwrap();
    assert_eq!(backend.calls("/assets"), 2);
}

#[tokio::test(start_paused = true)]
async fn expired_result_is_flagged_stale() {
    let config = QueryConfig {
        stale_time: Some(Duration::from_secs(30)),
        ..QueryConfig::default()
    };
    let (backend, _cache, endpoint) = setup_with(FakeBackend::default(), config);
    let mut sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    sub.settled().await.unwrap();

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(!sub.state().is_stale);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(sub.state().is_stale);
    assert_eq!(backend.calls("/assets"), 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_errors_are_values() {
    let (backend, _cache, endpoint) = setup();

    let err = endpoint.fetch("/missing".to_owned()).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    assert_eq!(err.server_message(), Some("no such path"));
    assert_eq!(backend.calls("/missing"), 1);
}

// ── Invalidation ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn invalidation_refetches_subscribed_entries() {
    let (backend, cache, endpoint) = setup();
    let mut sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    sub.settled().await.unwrap();

    backend.set("/assets", json!([{ "_id": "a2" }]));
    let keys = cache.invalidate_tags(&[Tag::id("Asset", "a1"), Tag::list("Asset")]);
    assert_eq!(keys, vec![sub.key().clone()]);

    let state = sub
        .wait_for(|s| s.is_settled() && s.data.as_ref().is_some_and(|d| d.len() == 1))
        .await
        .unwrap();
    assert_eq!(ids(state.data.as_ref().unwrap()), vec!["a2"]);
    assert!(!state.is_stale);
    assert_eq!(backend.calls("/assets"), 2);
}

#[tokio::test(start_paused = true)]
async fn unrelated_tags_leave_entries_untouched() {
    let (backend, cache, endpoint) = setup();
    let mut sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    sub.settled().await.unwrap();

    let keys = cache.invalidate_tags(&[Tag::list("User"), Tag::id("Asset", "zzz")]);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(keys.is_empty());
    assert!(!sub.state().is_stale);
    assert_eq!(backend.calls("/assets"), 1);
}

#[tokio::test(start_paused = true)]
async fn invalidation_without_subscribers_is_deferred() {
    let (backend, cache, endpoint) = setup();
    endpoint.fetch(assets()).await.unwrap();

    cache.invalidate_tags(&[Tag::list("Asset")]);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.calls("/assets"), 1);
    assert!(endpoint.select(&assets()).unwrap().is_stale);

    endpoint.fetch(assets()).await.unwrap();
    assert_eq!(backend.calls("/assets"), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidation_mid_fetch_queues_exactly_one_follow_up() {
    let (backend, cache, endpoint) =
        setup_with(FakeBackend::with_delay(Duration::from_millis(100)), QueryConfig::default());
    let mut sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    sub.settled().await.unwrap();

    cache.invalidate_tags(&[Tag::list("Asset")]);
    assert!(sub.state().is_fetching);
    cache.invalidate_tags(&[Tag::list("Asset")]);
    cache.invalidate_tags(&[Tag::id("Asset", "a1")]);

    sub.settled().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(backend.calls("/assets"), 3);
}

#[tokio::test(start_paused = true)]
async fn invalidation_during_first_fetch_is_not_lost() {
    let (backend, cache, endpoint) =
        setup_with(FakeBackend::with_delay(Duration::from_millis(100)), QueryConfig::default());
    let mut sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    assert!(sub.state().is_fetching);

    // Nothing provided yet, so nothing is invalidated right away.
    assert!(cache.invalidate_tags(&[Tag::list("Asset")]).is_empty());

    let state = sub
        .wait_for(|s| s.is_success() && !s.is_fetching && !s.is_stale)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(ids(state.data.as_ref().unwrap()), vec!["a1", "a2"]);
    assert_eq!(backend.calls("/assets"), 2);
    assert!(!sub.state().is_stale);
}

#[tokio::test(start_paused = true)]
async fn unrelated_invalidation_during_first_fetch_is_ignored() {
    let (backend, cache, endpoint) =
        setup_with(FakeBackend::with_delay(Duration::from_millis(100)), QueryConfig::default());
    let mut sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();

    cache.invalidate_tags(&[Tag::list("User")]);
    sub.settled().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(backend.calls("/assets"), 1);
    assert!(!sub.state().is_stale);
}

#[tokio::test(start_paused = true)]
async fn transform_failure_keeps_previous_value() {
    let (backend, cache, endpoint) = setup();
    let mut sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    sub.settled().await.unwrap();

    backend.set("/assets", json!({ "unexpected": "shape" }));
    cache.invalidate_tags(&[Tag::list("Asset")]);
    let state = sub.wait_for(|s| s.is_error()).await.unwrap();

    assert!(state.error.as_ref().unwrap().is_transform());
    assert_eq!(ids(state.data.as_ref().unwrap()), vec!["a1", "a2"]);
}

#[tokio::test(start_paused = true)]
async fn provided_tags_follow_latest_result() {
    let (backend, cache, endpoint) = setup();
    let mut sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    sub.settled().await.unwrap();

    let tags = cache.provided_tags(sub.key());
    assert_eq!(
        tags,
        vec![Tag::list("Asset"), Tag::id("Asset", "a1"), Tag::id("Asset", "a2")]
    );

    backend.set("/assets", json!([{ "_id": "a3" }]));
    sub.refetch().await.unwrap();
    assert!(cache.invalidate_tags(&[Tag::id("Asset", "a1")]).is_empty());
    assert_eq!(cache.invalidate_tags(&[Tag::id("Asset", "a3")]).len(), 1);
}

// ── Subscriber lifecycle ─────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn polling_runs_while_subscribed() {
    let (backend, _cache, endpoint) = setup();

    let mut sub = endpoint
        .subscribe(
            assets(),
            SubscribeOptions::default().polling(Duration::from_secs(10)),
        )
        .unwrap();
    sub.settled().await.unwrap();

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(backend.calls("/assets"), 4);

    drop(sub);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(backend.calls("/assets"), 4);
}

#[tokio::test(start_paused = true)]
async fn polling_uses_smallest_interval() {
    let (backend, _cache, endpoint) = setup();

    let mut slow = endpoint
        .subscribe(
            assets(),
            SubscribeOptions::default().polling(Duration::from_secs(30)),
        )
        .unwrap();
    slow.settled().await.unwrap();
    let fast = endpoint
        .subscribe(
            assets(),
            SubscribeOptions::default().polling(Duration::from_secs(5)),
        )
        .unwrap();

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(backend.calls("/assets"), 3);

    // Back to the 30s cadence once the fast subscriber leaves.
    drop(fast);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(backend.calls("/assets"), 3);
}

#[tokio::test(start_paused = true)]
async fn unused_entries_are_evicted_after_grace_period() {
    let config = QueryConfig {
        keep_unused_for: Duration::from_secs(5),
        ..QueryConfig::default()
    };
    let (_backend, cache, endpoint) = setup_with(FakeBackend::default(), config);

    endpoint.fetch(assets()).await.unwrap();
    assert_eq!(cache.entry_count(), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(cache.entry_count(), 0);
    assert!(endpoint.select(&assets()).is_none());
}

#[tokio::test(start_paused = true)]
async fn resubscribe_within_grace_period_reuses_entry() {
    let config = QueryConfig {
        keep_unused_for: Duration::from_secs(5),
        ..QueryConfig::default()
    };
    let (backend, cache, endpoint) = setup_with(FakeBackend::default(), config);

    endpoint.fetch(assets()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let mut sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    sub.settled().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(cache.entry_count(), 1);
    assert_eq!(backend.calls("/assets"), 1);
}

#[tokio::test(start_paused = true)]
async fn result_is_discarded_when_nobody_is_subscribed() {
    let (backend, _cache, endpoint) =
        setup_with(FakeBackend::with_delay(Duration::from_millis(100)), QueryConfig::default());

    let sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    sub.unsubscribe();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let state = endpoint.select(&assets()).unwrap();
    assert_eq!(backend.calls("/assets"), 1);
    assert!(state.data.is_none());
    assert!(state.is_stale);
    assert!(!state.is_fetching);
}

#[tokio::test(start_paused = true)]
async fn change_arg_moves_to_new_key() {
    let (backend, _cache, endpoint) = setup();
    backend.set("/archive", json!([{ "_id": "old" }]));

    let mut sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    sub.settled().await.unwrap();

    sub.change_arg("/archive".to_owned()).unwrap();
    let data = sub.settled().await.unwrap();

    assert_eq!(ids(&data), vec!["old"]);
    assert_eq!(sub.arg(), "/archive");
    assert_eq!(backend.calls("/archive"), 1);
}

// ── Triggers & reset ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn focus_refetches_only_opted_in_entries() {
    let (backend, cache, endpoint) = setup();
    backend.set("/users", json!([]));

    let mut focused = endpoint
        .subscribe(assets(), SubscribeOptions::default().refetch_on_focus())
        .unwrap();
    let mut plain = endpoint
        .subscribe("/users".to_owned(), SubscribeOptions::default())
        .unwrap();
    focused.settled().await.unwrap();
    plain.settled().await.unwrap();

    cache.on_focus();
    focused.settled().await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(backend.calls("/assets"), 2);
    assert_eq!(backend.calls("/users"), 1);
}

#[tokio::test(start_paused = true)]
async fn reconnect_refetches_opted_in_entries() {
    let (backend, cache, endpoint) = setup();
    let mut sub = endpoint
        .subscribe(assets(), SubscribeOptions::default().refetch_on_reconnect())
        .unwrap();
    sub.settled().await.unwrap();

    cache.on_reconnect();
    sub.settled().await.unwrap();
    assert_eq!(backend.calls("/assets"), 2);
}

#[tokio::test(start_paused = true)]
async fn reset_evicts_everything() {
    let (_backend, cache, endpoint) = setup();
    let mut sub = endpoint.subscribe(assets(), SubscribeOptions::default()).unwrap();
    sub.settled().await.unwrap();

    cache.reset();

    assert_eq!(cache.entry_count(), 0);
    let err = sub.settled().await.unwrap_err();
    assert!(matches!(err, CoreError::Evicted { .. }));
    assert!(sub.data().is_none());

    // A new subscription starts from scratch.
    endpoint.fetch(assets()).await.unwrap();
    assert_eq!(cache.entry_count(), 1);
}

// ── Registry ─────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_endpoint_names_are_rejected() {
    let (_backend, cache, _endpoint) = setup();
    let err = cache
        .register_query(ListDef {
            name: "assets.list",
            kind: "Asset",
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::DuplicateEndpoint { .. }));
    assert_eq!(cache.endpoint_kind("assets.list"), Some(EndpointKind::Query));
    assert_eq!(cache.endpoint_count(), 1);
}

#[test]
fn subscribe_outside_runtime_is_an_error() {
    let (_backend, _cache, endpoint) = setup();
    let err = endpoint
        .subscribe(assets(), SubscribeOptions::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::Internal(_)));
}

#[test]
fn cache_key_serializes_argument() {
    let key = CacheKey::for_arg("assets.get", &"a1").unwrap();
    assert_eq!(key.endpoint(), "assets.get");
    assert_eq!(key.arg(), "\"a1\"");
    assert_eq!(key.to_string(), "assets.get(\"a1\")");
    assert_eq!(CacheKey::for_arg("assets.list", &()).unwrap().arg(), "null");
}
