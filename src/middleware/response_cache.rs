//! Request-caching middleware.
//!
//! Wraps read handlers: a `GET` whose key is cached is answered from the
//! cache, otherwise the handler runs and a successful body is stored on the
//! way out. Status and body are passed through unchanged; only the
//! `X-Cache`, `Cache-Control` and `ETag` headers are added.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header, response::Parts, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::{within_limits, CacheLayer, KeyBuilder, KeyOptions, Namespace, MAX_VALUE_SIZE};
use crate::config::TtlPolicy;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Identity of the caller, inserted as a request extension by the
/// authentication layer. Responses for different identities never share a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity(pub String);

/// What is stored for one cached response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    pub etag: String,
}

/// Shared cache state handed to every cached route group.
#[derive(Clone)]
pub struct ResponseCache {
    cache: Arc<dyn CacheLayer>,
    keys: KeyBuilder,
    policy: Arc<TtlPolicy>,
}

/// `ResponseCache` bound to the namespace of one route group.
#[derive(Clone)]
pub struct RouteCache {
    shared: ResponseCache,
    namespace: Namespace,
}

impl ResponseCache {
    pub fn new(cache: Arc<dyn CacheLayer>, keys: KeyBuilder, policy: TtlPolicy) -> Self {
        Self {
            cache,
            keys,
            policy: Arc::new(policy),
        }
    }

    /// Caches every matched route of `router` under `namespace`.
    pub fn wrap<S>(&self, router: Router<S>, namespace: Namespace) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let route = RouteCache {
            shared: self.clone(),
            namespace,
        };
        router.route_layer(middleware::from_fn_with_state(route, response_cache))
    }
}

async fn response_cache(State(route): State<RouteCache>, request: Request, next: Next) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let ttl = route.shared.policy.ttl_for(&route.namespace);
    let key = {
        let caller = request.extensions().get::<CallerIdentity>();
        route.shared.keys.build(
            &route.namespace,
            request.uri().path(),
            &KeyOptions {
                query: request.uri().query(),
                caller_segment: caller.map(|c| c.0.as_str()),
            },
        )
    };

    if let Some(value) = route.shared.cache.get(&key).await {
        match serde_json::from_value::<CachedResponse>(value) {
            Ok(cached) => {
                debug!(key, outcome = "hit", "serving cached response");
                return hit_response(cached, ttl);
            }
            Err(err) => warn!(key, error = %err, "cached response unreadable, recomputing"),
        }
    }

    let response = next.run(request).await;

    if !is_storable(response.status(), response.headers()) {
        debug!(key, status = %response.status(), "response not cacheable");
        return with_x_cache(response, "MISS");
    }

    // Only bodies whose full length is known up front are buffered; anything
    // streaming or oversized goes out untouched.
    let buffered_len = response.body().size_hint().upper();
    if !buffered_len.is_some_and(|len| len <= MAX_VALUE_SIZE as u64) {
        debug!(key, "body unbounded or too large, not cached");
        return with_x_cache(response, "MISS");
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_VALUE_SIZE).await {
        Ok(bytes) => bytes,
        Err(err) => {
            // The body is gone at this point; keep the handler's status and headers.
            warn!(key, error = %err, "failed to read response body");
            parts.headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
            return Response::from_parts(parts, Body::empty());
        }
    };

    match std::str::from_utf8(&bytes) {
        Ok(text) => store(&route, &key, &mut parts, text, ttl).await,
        Err(_) => debug!(key, "body is not text, not cached"),
    }

    parts.headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

/// Stores the response and advertises it as cacheable, unless the cache
/// would refuse the entry.
async fn store(route: &RouteCache, key: &str, parts: &mut Parts, text: &str, ttl: Duration) {
    let cached = CachedResponse {
        status: parts.status.as_u16(),
        content_type: parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: text.to_string(),
        etag: etag(text.as_bytes()),
    };

    let value = match serde_json::to_value(&cached) {
        Ok(value) => value,
        Err(err) => {
            warn!(key, error = %err, "response not encodable");
            return;
        }
    };

    if !within_limits(key, &value) {
        debug!(key, "response exceeds cache limits, not cached");
        return;
    }

    set_cache_headers(&mut parts.headers, &cached.etag, ttl);
    debug!(key, outcome = "miss", "caching response");
    route.shared.cache.set(key, value, ttl).await;
}

/// Successful, complete, shareable and bounded responses only.
fn is_storable(status: StatusCode, headers: &HeaderMap) -> bool {
    if !status.is_success() || status == StatusCode::PARTIAL_CONTENT {
        return false;
    }

    if headers.contains_key(header::SET_COOKIE) {
        return false;
    }

    let header_str = |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

    if header_str(header::CACHE_CONTROL)
        .is_some_and(|v| v.contains("no-store") || v.contains("private"))
    {
        return false;
    }

    if header_str(header::CONTENT_TYPE).is_some_and(|v| v.starts_with("text/event-stream")) {
        return false;
    }

    let too_long = header_str(header::CONTENT_LENGTH)
        .and_then(|v| v.parse::<usize>().ok())
        .is_some_and(|len| len > MAX_VALUE_SIZE);
    !too_long
}

fn hit_response(cached: CachedResponse, ttl: Duration) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut response = (status, cached.body).into_response();
    let headers = response.headers_mut();

    match cached
        .content_type
        .as_deref()
        .map(HeaderValue::from_str)
    {
        Some(Ok(content_type)) => {
            headers.insert(header::CONTENT_TYPE, content_type);
        }
        _ => {
            headers.remove(header::CONTENT_TYPE);
        }
    }

    set_cache_headers(headers, &cached.etag, ttl);
    headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
    response
}

fn with_x_cache(mut response: Response, outcome: &'static str) -> Response {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(outcome));
    response
}

fn set_cache_headers(headers: &mut HeaderMap, etag: &str, ttl: Duration) {
    if let Ok(value) = HeaderValue::from_str(&format!("public, max-age={}", ttl.as_secs())) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Ok(value) = HeaderValue::from_str(etag) {
        headers.insert(header::ETAG, value);
    }
}

/// Quoted strong ETag: first 16 hex chars of the body's SHA-256.
pub fn etag(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    format!("\"{}\"", hex::encode(&digest[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Invalidator, LocalLayer, LocalOnlyCache, SystemClock};
    use axum::{
        extract::Query,
        routing::get,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::util::ServiceExt;

    #[derive(Clone, Default)]
    struct Calls(Arc<AtomicUsize>);

    impl Calls {
        fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn local_cache() -> Arc<dyn CacheLayer> {
        Arc::new(LocalOnlyCache::new(LocalLayer::new(100, Arc::new(SystemClock))))
    }

    fn app(calls: Calls) -> Router {
        app_over(local_cache(), calls)
    }

    fn app_over(cache: Arc<dyn CacheLayer>, calls: Calls) -> Router {
        let feed = Router::new()
            .route(
                "/feed",
                get(|axum::extract::State(calls): axum::extract::State<Calls>| async move {
                    let n = calls.0.fetch_add(1, Ordering::SeqCst);
                    (
                        [(header::CONTENT_TYPE, "application/rss+xml")],
                        format!("<rss>{n}</rss>"),
                    )
                })
                .post(|| async { "created" }),
            )
            .route(
                "/posts",
                get(
                    |axum::extract::State(calls): axum::extract::State<Calls>,
                     Query(q): Query<HashMap<String, String>>| async move {
                        calls.0.fetch_add(1, Ordering::SeqCst);
                        format!("page {}", q.get("page").cloned().unwrap_or_default())
                    },
                ),
            )
            .route(
                "/broken",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .route(
                "/session",
                get(|| async { ([(header::SET_COOKIE, "sid=1")], "hello") }),
            )
            .route(
                "/stories/:id",
                get(
                    |axum::extract::State(calls): axum::extract::State<Calls>,
                     axum::extract::Path(id): axum::extract::Path<String>| async move {
                        calls.0.fetch_add(1, Ordering::SeqCst);
                        format!("story {id}")
                    },
                ),
            )
            .route(
                "/huge",
                get(|| async { "x".repeat(MAX_VALUE_SIZE + 1) }),
            )
            .route(
                "/quotes",
                get(|| async { "\"".repeat(MAX_VALUE_SIZE - 16) }),
            )
            .route("/long/*rest", get(|| async { "deep" }));

        ResponseCache::new(cache, KeyBuilder::new("v1"), TtlPolicy::default())
            .wrap(feed, Namespace::FEED)
            .layer(middleware::from_fn(attach_identity))
            .with_state(calls)
    }

    /// Test stand-in for the authentication layer.
    async fn attach_identity(mut request: Request, next: Next) -> Response {
        let user = request
            .headers()
            .get("x-user")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(user) = user {
            request.extensions_mut().insert(CallerIdentity(user));
        }
        next.run(request).await
    }

    async fn send(app: &Router, method: Method, uri: &str, user: Option<&str>) -> Response {
        let mut builder = axum::http::Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user", user);
        }
        app.clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_second_get_is_a_byte_identical_hit() {
        let calls = Calls::default();
        let app = app(calls.clone());

        let first = send(&app, Method::GET, "/feed", None).await;
        assert_eq!(first.headers()[X_CACHE], "MISS");
        assert_eq!(first.headers()[header::CACHE_CONTROL], "public, max-age=1800");
        let first_etag = first.headers()[header::ETAG].clone();
        let first_body = body_string(first).await;

        let second = send(&app, Method::GET, "/feed", None).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.headers()[X_CACHE], "HIT");
        assert_eq!(second.headers()[header::CONTENT_TYPE], "application/rss+xml");
        assert_eq!(second.headers()[header::ETAG], first_etag);
        assert_eq!(body_string(second).await, first_body);

        assert_eq!(calls.count(), 1);
    }

    #[tokio::test]
    async fn test_post_passes_through_without_x_cache() {
        let app = app(Calls::default());
        let response = send(&app, Method::POST, "/feed", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(X_CACHE).is_none());
        assert_eq!(body_string(response).await, "created");
    }

    #[tokio::test]
    async fn test_query_order_shares_an_entry() {
        let calls = Calls::default();
        let app = app(calls.clone());

        send(&app, Method::GET, "/posts?page=2&tag=rust", None).await;
        let second = send(&app, Method::GET, "/posts?tag=rust&page=2", None).await;

        assert_eq!(second.headers()[X_CACHE], "HIT");
        assert_eq!(body_string(second).await, "page 2");
        assert_eq!(calls.count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_queries_do_not_share() {
        let calls = Calls::default();
        let app = app(calls.clone());

        send(&app, Method::GET, "/posts?page=1", None).await;
        let second = send(&app, Method::GET, "/posts?page=2", None).await;

        assert_eq!(second.headers()[X_CACHE], "MISS");
        assert_eq!(body_string(second).await, "page 2");
        assert_eq!(calls.count(), 2);
    }

    #[tokio::test]
    async fn test_callers_do_not_share_entries() {
        let calls = Calls::default();
        let app = app(calls.clone());

        send(&app, Method::GET, "/feed", None).await;
        let alice = send(&app, Method::GET, "/feed", Some("alice")).await;
        assert_eq!(alice.headers()[X_CACHE], "MISS");

        let alice_again = send(&app, Method::GET, "/feed", Some("alice")).await;
        assert_eq!(alice_again.headers()[X_CACHE], "HIT");
        assert_eq!(calls.count(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached_or_altered() {
        let app = app(Calls::default());

        for _ in 0..2 {
            let response = send(&app, Method::GET, "/broken", None).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(response.headers()[X_CACHE], "MISS");
            assert!(response.headers().get(header::CACHE_CONTROL).is_none());
            assert_eq!(body_string(response).await, "boom");
        }
    }

    #[tokio::test]
    async fn test_set_cookie_responses_are_not_cached() {
        let app = app(Calls::default());

        send(&app, Method::GET, "/session", None).await;
        let second = send(&app, Method::GET, "/session", None).await;

        assert_eq!(second.headers()[X_CACHE], "MISS");
        assert_eq!(second.headers()[header::SET_COOKIE], "sid=1");
    }

    #[tokio::test]
    async fn test_colon_in_path_does_not_reach_another_callers_entry() {
        let calls = Calls::default();
        let app = app(calls.clone());

        let alice = send(&app, Method::GET, "/stories/abc", Some("alice")).await;
        assert_eq!(body_string(alice).await, "story abc");

        let anonymous = send(&app, Method::GET, "/stories/abc:alice", None).await;
        assert_eq!(anonymous.headers()[X_CACHE], "MISS");
        assert_eq!(body_string(anonymous).await, "story abc:alice");
        assert_eq!(calls.count(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_key_evicts_cached_route_variants() {
        let cache = local_cache();
        let calls = Calls::default();
        let app = app_over(cache.clone(), calls.clone());
        let invalidator = Invalidator::new(cache, KeyBuilder::new("v1"));

        send(&app, Method::GET, "/posts?page=1", None).await;
        send(&app, Method::GET, "/posts?page=2", None).await;
        let hit = send(&app, Method::GET, "/posts?page=1", None).await;
        assert_eq!(hit.headers()[X_CACHE], "HIT");

        assert_eq!(invalidator.invalidate_key(&Namespace::FEED, "/posts").await, 2);

        let again = send(&app, Method::GET, "/posts?page=1", None).await;
        assert_eq!(again.headers()[X_CACHE], "MISS");
        let again = send(&app, Method::GET, "/posts?page=2", None).await;
        assert_eq!(again.headers()[X_CACHE], "MISS");
        assert_eq!(calls.count(), 4);
    }

    #[tokio::test]
    async fn test_oversized_body_passes_through_untouched() {
        let app = app(Calls::default());

        for _ in 0..2 {
            let response = send(&app, Method::GET, "/huge", None).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()[X_CACHE], "MISS");
            assert!(response.headers().get(header::CACHE_CONTROL).is_none());
            assert_eq!(body_string(response).await.len(), MAX_VALUE_SIZE + 1);
        }
    }

    #[tokio::test]
    async fn test_escaped_body_over_limit_is_not_advertised() {
        let app = app(Calls::default());

        let response = send(&app, Method::GET, "/quotes", None).await;
        assert_eq!(response.headers()[X_CACHE], "MISS");
        assert!(response.headers().get(header::CACHE_CONTROL).is_none());
        assert!(response.headers().get(header::ETAG).is_none());
        assert_eq!(body_string(response).await.len(), MAX_VALUE_SIZE - 16);

        let second = send(&app, Method::GET, "/quotes", None).await;
        assert_eq!(second.headers()[X_CACHE], "MISS");
    }

    #[tokio::test]
    async fn test_overlong_key_is_not_advertised() {
        let app = app(Calls::default());
        let uri = format!("/long/{}", "a".repeat(300));

        let response = send(&app, Method::GET, &uri, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[X_CACHE], "MISS");
        assert!(response.headers().get(header::CACHE_CONTROL).is_none());
        assert_eq!(body_string(response).await, "deep");
    }

    #[test]
    fn test_etag_shape() {
        let tag = etag(b"<xml/>");
        assert_eq!(tag.len(), 18);
        assert!(tag.starts_with('"') && tag.ends_with('"'));
        assert_eq!(tag, etag(b"<xml/>"));
        assert_ne!(tag, etag(b"<xml />"));
    }

    #[test]
    fn test_is_storable() {
        let empty = HeaderMap::new();
        assert!(is_storable(StatusCode::OK, &empty));
        assert!(!is_storable(StatusCode::NOT_FOUND, &empty));
        assert!(!is_storable(StatusCode::PARTIAL_CONTENT, &empty));

        let mut no_store = HeaderMap::new();
        no_store.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        assert!(!is_storable(StatusCode::OK, &no_store));

        let mut huge = HeaderMap::new();
        huge.insert(
            header::CONTENT_LENGTH,
            HeaderValue::from_str(&(MAX_VALUE_SIZE + 1).to_string()).unwrap(),
        );
        assert!(!is_storable(StatusCode::OK, &huge));
    }
}
