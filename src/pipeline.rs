//! Request pipeline: the stateful components every API request passes
//! through, and their background lifecycles.
//!
//! # Stage Order (outermost first)
//! ```text
//! request-id → trace → metrics → catch-panic → body limit → timeout   (http::server)
//!     → session attach + CSRF → security headers → rate limit
//!     → CORS → response cache → router                        (Pipeline::wrap)
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    Router,
};
use sqlx::SqlitePool;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::cache::ResponseCache;
use crate::config::{AppConfig, CorsConfig};
use crate::http::middleware;
use crate::observability::Metrics;
use crate::security::csrf::CSRF_HEADER;
use crate::security::{CsrfGuard, RateLimiter};
use crate::session::{SessionError, SessionSettings, SessionStore};

/// Owns every pipeline component. Created once at startup, closed once at shutdown.
pub struct Pipeline {
    config: AppConfig,
    pub rate_limiter: Arc<RateLimiter>,
    pub cache: Arc<ResponseCache>,
    pub sessions: Arc<SessionStore>,
    pub csrf: Arc<CsrfGuard>,
    pub metrics: Arc<Metrics>,
    pool: SqlitePool,
}

impl Pipeline {
    /// Build all components over `pool`. Sweeps are not started yet.
    pub async fn new(config: AppConfig, pool: SqlitePool) -> Result<Self, SessionError> {
        let settings = SessionSettings::from_config(&config.session, config.is_production());
        Self::with_session_settings(config, pool, settings).await
    }

    /// Like [`Pipeline::new`] with explicit session settings (sub-second timeouts in tests).
    pub async fn with_session_settings(
        config: AppConfig,
        pool: SqlitePool,
        settings: SessionSettings,
    ) -> Result<Self, SessionError> {
        let sessions = Arc::new(SessionStore::new(pool.clone(), settings).await?);

        Ok(Self {
            rate_limiter: Arc::new(RateLimiter::new(&config.rate_limit)),
            cache: Arc::new(ResponseCache::new(&config.cache)),
            csrf: Arc::new(CsrfGuard::new(&config.csrf)),
            metrics: Arc::new(Metrics::new()),
            sessions,
            pool,
            config,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start every background sweep.
    pub fn start(&self) {
        self.sessions.start(self.metrics.clone());
        self.csrf.start(self.metrics.clone());
        if self.config.rate_limit.enabled {
            self.rate_limiter.start(self.metrics.clone());
        }
        if self.config.cache.enabled {
            self.cache.start(self.metrics.clone());
        }
        tracing::info!("Pipeline background tasks started");
    }

    /// Stop sweeps in dependency order, then close the row-store.
    pub async fn close(&self) {
        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);

        self.cache.stop(grace).await;
        self.rate_limiter.stop(grace).await;
        self.csrf.stop(grace).await;
        self.sessions.stop(grace).await;
        self.pool.close().await;

        tracing::info!("Pipeline closed");
    }

    /// Wrap `routes` in the session-aware stages.
    pub fn wrap(self: &Arc<Self>, routes: Router) -> Router {
        routes.layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(self.clone(), middleware::session::session_middleware))
                .layer(from_fn_with_state(self.clone(), middleware::headers::security_headers_middleware))
                .layer(from_fn_with_state(self.clone(), middleware::rate_limit::rate_limit_middleware))
                .layer(cors_layer(&self.config.cors))
                .layer(from_fn_with_state(self.clone(), middleware::cache::cache_middleware)),
        )
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::new();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(CSRF_HEADER),
        ])
        .allow_credentials(true)
}
