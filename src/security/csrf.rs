//! Per-session anti-forgery tokens.
//!
//! One live token per session; issuing replaces the previous one. Tokens
//! are only checked on state-changing methods.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::Method;
use dashmap::DashMap;

use crate::config::CsrfConfig;
use crate::lifecycle::{Sweeper, SweeperSlot};
use crate::observability::Metrics;
use crate::security::{constant_time_eq, random_token};

/// Request header carrying the presented token.
pub const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Debug, Clone)]
struct CsrfEntry {
    token: String,
    expires_at: Instant,
}

pub struct CsrfGuard {
    tokens: DashMap<String, CsrfEntry>,
    ttl: Duration,
    sweep_interval: Duration,
    pub(crate) sweeper: SweeperSlot,
}

impl CsrfGuard {
    pub fn new(config: &CsrfConfig) -> Self {
        Self {
            tokens: DashMap::new(),
            ttl: Duration::from_secs(config.token_ttl_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            sweeper: SweeperSlot::new(),
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        let mut guard = Self::new(&CsrfConfig::default());
        guard.ttl = ttl;
        guard
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token for `session_id`, replacing any live one.
    pub fn issue(&self, session_id: &str) -> String {
        let token = random_token();
        self.tokens.insert(
            session_id.to_string(),
            CsrfEntry {
                token: token.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        token
    }

    /// True iff `presented` is the live, unexpired token for `session_id`.
    pub fn validate(&self, session_id: &str, presented: &str) -> bool {
        let now = Instant::now();

        let verdict = match self.tokens.get(session_id) {
            Some(entry) if entry.expires_at > now => {
                Some(constant_time_eq(entry.token.as_bytes(), presented.as_bytes()))
            }
            Some(_) => None,
            None => return false,
        };

        match verdict {
            Some(matches) => matches,
            None => {
                self.tokens.remove_if(session_id, |_, entry| entry.expires_at <= now);
                false
            }
        }
    }

    /// Forget the token bound to `session_id` (logout).
    pub fn revoke(&self, session_id: &str) {
        self.tokens.remove(session_id);
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.tokens.len();
        self.tokens.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.tokens.len())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Start the periodic expired-token sweep. Idempotent.
    pub fn start(self: &Arc<Self>, metrics: Arc<Metrics>) {
        self.sweeper.start_with(|| {
            Sweeper::spawn(
                "csrf",
                self,
                self.sweep_interval,
                move |guard: Arc<CsrfGuard>| {
                    let metrics = metrics.clone();
                    async move {
                        let removed = guard.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, "Purged expired CSRF tokens");
                            metrics.record_sweep("csrf", removed as u64);
                        }
                    }
                },
            )
        });
    }

    pub async fn stop(&self, grace: Duration) {
        self.sweeper.stop(grace).await;
    }
}

/// Safe methods skip CSRF validation.
pub fn requires_token(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}
