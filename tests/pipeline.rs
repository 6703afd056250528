//! End-to-end behaviour of the request pipeline, driven in memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Method, StatusCode},
    routing::get,
    Router,
};
use serde_json::json;
use tower::ServiceExt;

use idea_intake::http::X_REQUEST_ID;

mod common;
use common::{body_bytes, json_body, request, session_cookie, test_config, TestApp};

fn post_idea(cookie: &str, token: Option<&str>, content: &str) -> axum::http::Request<Body> {
    let mut builder = request(Method::POST, "/api/v1/ideas", Some(cookie))
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header("x-csrf-token", token);
    }
    builder
        .body(Body::from(json!({ "content": content }).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_new_session_sets_hardened_cookie() {
    let app = TestApp::new(test_config()).await;

    let response = app.get("/api/v1/session", None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("session_id="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Strict"));
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("Max-Age="));
    assert!(!set_cookie.contains("Secure"));

    let body = json_body(response).await;
    assert_eq!(body["is_new"], true);
}

#[tokio::test]
async fn test_existing_session_is_reused() {
    let app = TestApp::new(test_config()).await;
    let cookie = app.new_session().await;

    let response = app.get("/api/v1/session", Some(&cookie)).await;
    assert_eq!(session_cookie(&response).as_deref(), Some(cookie.as_str()));
    assert_eq!(json_body(response).await["is_new"], false);
}

#[tokio::test]
async fn test_unknown_or_malformed_cookie_gets_new_session() {
    let app = TestApp::new(test_config()).await;

    for stale in ["session_id=not-a-token", &format!("session_id={}", "a".repeat(64))] {
        let response = app.get("/api/v1/session", Some(stale)).await;
        let issued = session_cookie(&response).unwrap();
        assert_ne!(issued, stale);
        assert_eq!(json_body(response).await["is_new"], true);
    }
}

#[tokio::test]
async fn test_mutation_without_csrf_token_is_forbidden() {
    let app = TestApp::new(test_config()).await;
    let cookie = app.new_session().await;

    let response = app.send(post_idea(&cookie, None, "bike racks")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json_body(response).await["error"], "Invalid CSRF token");

    let response = app.send(post_idea(&cookie, Some("deadbeef"), "bike racks")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_mutation_with_csrf_token_succeeds() {
    let app = TestApp::new(test_config()).await;
    let cookie = app.new_session().await;
    let token = app.csrf_token(&cookie).await;

    let response = app.send(post_idea(&cookie, Some(&token), "  bike racks  ")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let idea = json_body(response).await;
    assert_eq!(idea["content"], "bike racks");

    let id = idea["id"].as_i64().unwrap();
    let response = app.get(&format!("/api/v1/ideas/{id}"), Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_csrf_token_is_bound_to_its_session() {
    let app = TestApp::new(test_config()).await;
    let alice = app.new_session().await;
    let bob = app.new_session().await;
    let alice_token = app.csrf_token(&alice).await;

    let response = app.send(post_idea(&bob, Some(&alice_token), "stolen")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_csrf_token_response_is_not_cached() {
    let app = TestApp::new(test_config()).await;
    let cookie = app.new_session().await;

    let first = app.get("/api/v1/csrf-token", Some(&cookie)).await;
    assert_eq!(first.headers()[header::CACHE_CONTROL], "no-store");
    let first = json_body(first).await;
    let second = json_body(app.get("/api/v1/csrf-token", Some(&cookie)).await).await;

    assert_ne!(first["token"], second["token"]);
    assert_eq!(first["expires_in"], 3600);
}

#[tokio::test]
async fn test_rate_limit_rejects_after_burst() {
    let mut config = test_config();
    config.rate_limit.requests_per_minute = 2;
    config.rate_limit.burst_size = 2;
    let app = TestApp::new(config).await;

    for _ in 0..2 {
        let response = app.get("/api/v1/ideas", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
    }

    let response = app.get("/api/v1/ideas", None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "30");
    assert_eq!(json_body(response).await["error"], "Rate limit exceeded");
}

#[tokio::test]
async fn test_rate_limit_keys_on_forwarded_client() {
    let mut config = test_config();
    config.rate_limit.requests_per_minute = 1;
    config.rate_limit.burst_size = 1;
    let app = TestApp::new(config).await;

    let from = |client: &str| {
        request(Method::GET, "/api/v1/ideas", None)
            .header("x-forwarded-for", format!("{client}, 10.0.0.1"))
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(app.send(from("203.0.113.7")).await.status(), StatusCode::OK);
    assert_eq!(
        app.send(from("203.0.113.7")).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
    assert_eq!(app.send(from("198.51.100.2")).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_get_is_cached_until_mutation() {
    let app = TestApp::new(test_config()).await;
    let cookie = app.new_session().await;

    let first = app.get("/api/v1/ideas?limit=10", Some(&cookie)).await;
    assert_eq!(first.headers()["x-cache"], "MISS");
    let first = body_bytes(first).await;

    let second = app.get("/api/v1/ideas?limit=10", Some(&cookie)).await;
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert!(session_cookie(&second).is_some());
    assert_eq!(body_bytes(second).await, first);

    let token = app.csrf_token(&cookie).await;
    let created = app.send(post_idea(&cookie, Some(&token), "standing desks")).await;
    assert_eq!(created.status(), StatusCode::CREATED);

    let third = app.get("/api/v1/ideas?limit=10", Some(&cookie)).await;
    assert_eq!(third.headers()["x-cache"], "MISS");
    let ideas = json_body(third).await;
    assert_eq!(ideas.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_write_during_slow_miss_is_not_undone() {
    let app = TestApp::new(test_config()).await;
    let version = Arc::new(AtomicU64::new(0));

    let reader = version.clone();
    let writer = version.clone();
    let routes = Router::new().route(
        "/api/v1/ideas",
        get(move || {
            let version = reader.clone();
            async move {
                let seen = version.load(Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(200)).await;
                format!("version {seen}")
            }
        })
        .post(move || {
            let version = writer.clone();
            async move {
                version.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK
            }
        }),
    );
    let router = app.pipeline.wrap(routes);

    let denied = router
        .clone()
        .oneshot(request(Method::POST, "/api/v1/ideas", None).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    let cookie = session_cookie(&denied).unwrap();
    let token = app.pipeline.csrf.issue(cookie.trim_start_matches("session_id="));

    let slow_read = tokio::spawn(router.clone().oneshot(
        request(Method::GET, "/api/v1/ideas", Some(&cookie))
            .body(Body::empty())
            .unwrap(),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let write = router
        .clone()
        .oneshot(
            request(Method::POST, "/api/v1/ideas", Some(&cookie))
                .header("x-csrf-token", &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(write.status(), StatusCode::OK);

    let before_write = slow_read.await.unwrap().unwrap();
    assert_eq!(before_write.headers()["x-cache"], "MISS");
    assert_eq!(body_bytes(before_write).await, b"version 0");

    let after_write = router
        .clone()
        .oneshot(
            request(Method::GET, "/api/v1/ideas", Some(&cookie))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(after_write.headers()["x-cache"], "MISS");
    assert_eq!(body_bytes(after_write).await, b"version 1");
}

#[tokio::test]
async fn test_cache_entry_expires() {
    let mut config = test_config();
    config.cache.ttl_secs = 1;
    let app = TestApp::new(config).await;

    assert_eq!(app.get("/api/v1/ideas", None).await.headers()["x-cache"], "MISS");
    assert_eq!(app.get("/api/v1/ideas", None).await.headers()["x-cache"], "HIT");

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(app.get("/api/v1/ideas", None).await.headers()["x-cache"], "MISS");
}

#[tokio::test]
async fn test_error_responses_are_not_cached() {
    let app = TestApp::new(test_config()).await;

    for _ in 0..2 {
        let response = app.get("/api/v1/ideas/999", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-cache"], "MISS");
    }
    assert!(app.pipeline.cache.is_empty());
}

#[tokio::test]
async fn test_invalid_idea_is_rejected() {
    let app = TestApp::new(test_config()).await;
    let cookie = app.new_session().await;
    let token = app.csrf_token(&cookie).await;

    let response = app.send(post_idea(&cookie, Some(&token), "   ")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "content must not be empty");
}

#[tokio::test]
async fn test_delete_idea() {
    let app = TestApp::new(test_config()).await;
    let cookie = app.new_session().await;
    let token = app.csrf_token(&cookie).await;

    let idea = json_body(app.send(post_idea(&cookie, Some(&token), "quiet room")).await).await;
    let uri = format!("/api/v1/ideas/{}", idea["id"]);

    let delete = |uri: &str| {
        request(Method::DELETE, uri, Some(&cookie))
            .header("x-csrf-token", &token)
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(app.send(delete(&uri)).await.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.send(delete(&uri)).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_security_headers_on_api_responses() {
    let app = TestApp::new(test_config()).await;
    let response = app.get("/api/v1/ideas", None).await;

    let headers = response.headers();
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["x-frame-options"], "DENY");
    assert_eq!(headers["referrer-policy"], "no-referrer");
    assert!(headers.contains_key("content-security-policy"));
    assert!(!headers.contains_key(header::STRICT_TRANSPORT_SECURITY));
}

#[tokio::test]
async fn test_production_adds_hsts_and_secure_cookie() {
    let mut config = test_config();
    config.environment = "production".to_string();
    let app = TestApp::new(config).await;

    let response = app.get("/api/v1/session", None).await;
    assert!(response
        .headers()
        .contains_key(header::STRICT_TRANSPORT_SECURITY));
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.contains("Secure"));
}

#[tokio::test]
async fn test_probes_bypass_sessions() {
    let app = TestApp::new(test_config()).await;
    app.get("/api/v1/ideas", None).await;

    let health = app.get("/health", None).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert!(session_cookie(&health).is_none());
    assert_eq!(json_body(health).await["status"], "ok");

    let metrics = app.get("/metrics", None).await;
    assert_eq!(metrics.status(), StatusCode::OK);
    assert!(session_cookie(&metrics).is_none());
    let text = String::from_utf8(body_bytes(metrics).await).unwrap();
    assert!(text.contains("intake_requests_total"));
    assert!(text.contains("intake_sessions_created_total"));
}

#[tokio::test]
async fn test_health_reports_closed_store() {
    let app = TestApp::new(test_config()).await;
    app.pipeline.pool().close().await;

    let response = app.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let app = TestApp::new(test_config()).await;
    app.pipeline.pool().close().await;

    let response = app.get("/api/v1/ideas", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "Internal server error");
}

#[tokio::test]
async fn test_refresh_reissues_cookie() {
    let app = TestApp::new(test_config()).await;
    let cookie = app.new_session().await;
    let token = app.csrf_token(&cookie).await;

    let response = app
        .send(
            request(Method::POST, "/api/v1/session/refresh", Some(&cookie))
                .header("x-csrf-token", &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get_all(header::SET_COOKIE).iter().count(), 1);
    assert_eq!(session_cookie(&response).as_deref(), Some(cookie.as_str()));
}

#[tokio::test]
async fn test_logout_clears_session() {
    let app = TestApp::new(test_config()).await;
    let cookie = app.new_session().await;
    let token = app.csrf_token(&cookie).await;

    let response = app
        .send(
            request(Method::DELETE, "/api/v1/session", Some(&cookie))
                .header("x-csrf-token", &token)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cleared = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cleared.contains("Max-Age=0"));

    let response = app.get("/api/v1/session", Some(&cookie)).await;
    assert_ne!(session_cookie(&response).as_deref(), Some(cookie.as_str()));
    assert_eq!(json_body(response).await["is_new"], true);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::new(test_config()).await;

    let generated = app.get("/health", None).await;
    assert!(generated.headers().contains_key(X_REQUEST_ID));

    let response = app
        .send(
            request(Method::GET, "/health", None)
                .header(X_REQUEST_ID, "trace-me")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.headers()[X_REQUEST_ID], "trace-me");
}
