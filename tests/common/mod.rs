//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, Response},
    Router,
};
use tower::ServiceExt;

use idea_intake::config::AppConfig;
use idea_intake::db::connect_in_memory;
use idea_intake::ideas::SqliteIdeaRepository;
use idea_intake::{HttpServer, Pipeline};

pub const PEER: &str = "10.0.0.1:5000";

/// Defaults with limits loose enough not to interfere with a test.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.rate_limit.requests_per_minute = 6000;
    config.rate_limit.burst_size = 1000;
    config
}

/// In-memory application: the layered router plus its pipeline.
pub struct TestApp {
    pub router: Router,
    pub pipeline: Arc<Pipeline>,
}

impl TestApp {
    pub async fn new(config: AppConfig) -> Self {
        let pool = connect_in_memory().await.unwrap();
        let ideas = Arc::new(SqliteIdeaRepository::new(pool.clone()).await.unwrap());
        let pipeline = Arc::new(Pipeline::new(config, pool).await.unwrap());
        let router = HttpServer::new(pipeline.clone(), ideas).router();
        Self { router, pipeline }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        self.send(request(Method::GET, uri, cookie).body(Body::empty()).unwrap())
            .await
    }

    /// Fetch a CSRF token for the session behind `cookie`.
    pub async fn csrf_token(&self, cookie: &str) -> String {
        let response = self.get("/api/v1/csrf-token", Some(cookie)).await;
        assert_eq!(response.status(), 200);
        let body = json_body(response).await;
        body["token"].as_str().unwrap().to_string()
    }

    /// Start a session and return its `name=value` cookie pair.
    pub async fn new_session(&self) -> String {
        let response = self.get("/api/v1/session", None).await;
        session_cookie(&response).expect("new session sets a cookie")
    }
}

/// Request builder that looks like it came over a socket from [`PEER`].
pub fn request(method: Method, uri: &str, cookie: Option<&str>) -> axum::http::request::Builder {
    let peer: SocketAddr = PEER.parse().unwrap();
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(peer));
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
}

/// The `session_id=<value>` pair from the first session Set-Cookie.
pub fn session_cookie<B>(response: &Response<B>) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("session_id="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
