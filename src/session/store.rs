//! Session persistence on the SQLite row-store.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderMap;
use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use sqlx::SqlitePool;

use crate::config::SessionConfig;
use crate::lifecycle::{Sweeper, SweeperSlot};
use crate::observability::Metrics;
use crate::security::{is_token_shaped, random_token};
use crate::session::{CookieSettings, ExpiryReason, Session, SessionError};

/// Runtime session settings, derived from [`SessionConfig`] plus the
/// deployment environment.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    pub absolute_timeout: Duration,
    pub sweep_interval: Duration,
    pub cookie: CookieSettings,
}

impl SessionSettings {
    pub fn from_config(config: &SessionConfig, secure_cookies: bool) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            absolute_timeout: config.absolute_timeout(),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            cookie: CookieSettings::new(config.cookie_name.clone(), secure_cookies),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default(), false)
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    created_at: String,
    expires_at: String,
    last_seen: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = SessionError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row.id,
            created_at: parse_ts(&row.created_at)?,
            expires_at: parse_ts(&row.expires_at)?,
            last_seen: parse_ts(&row.last_seen)?,
        })
    }
}

/// Fixed-width RFC 3339 in UTC, so text comparison orders like time.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, SessionError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| SessionError::Database(sqlx::Error::Decode(Box::new(e))))
}

fn delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::days(365 * 100))
}

/// Owns the `sessions` table.
pub struct SessionStore {
    pool: SqlitePool,
    settings: SessionSettings,
    pub(crate) sweeper: SweeperSlot,
}

impl SessionStore {
    /// Wrap `pool` and ensure the schema exists.
    pub async fn new(pool: SqlitePool, settings: SessionSettings) -> Result<Self, SessionError> {
        let store = Self {
            pool,
            settings,
            sweeper: SweeperSlot::new(),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), SessionError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                last_seen TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions (expires_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a fresh session with a random 256-bit identifier.
    pub async fn create(&self) -> Result<Session, SessionError> {
        let now = Utc::now();
        let session = Session {
            id: random_token(),
            created_at: now,
            expires_at: now + delta(self.settings.absolute_timeout),
            last_seen: now,
        };

        sqlx::query(
            "INSERT INTO sessions (id, created_at, expires_at, last_seen) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&session.id)
        .bind(format_ts(session.created_at))
        .bind(format_ts(session.expires_at))
        .bind(format_ts(session.last_seen))
        .execute(&self.pool)
        .await?;

        tracing::debug!(expires_at = %session.expires_at, "Session created");
        Ok(session)
    }

    /// Load a valid session. Expired rows are deleted before reporting.
    pub async fn get(&self, id: &str) -> Result<Session, SessionError> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, created_at, expires_at, last_seen FROM sessions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let session = Session::try_from(row.ok_or(SessionError::NotFound)?)?;

        let now = Utc::now();
        let reason = if now >= session.expires_at {
            Some(ExpiryReason::Absolute)
        } else if now >= session.last_seen + delta(self.settings.idle_timeout) {
            Some(ExpiryReason::Idle)
        } else {
            None
        };

        if let Some(reason) = reason {
            if let Err(e) = self.delete(id).await {
                tracing::warn!(error = %e, "Failed to delete expired session");
            }
            return Err(SessionError::Expired(reason));
        }

        Ok(session)
    }

    /// Resolve the request's session, creating one when the cookie is
    /// absent, malformed, unknown or expired. Store failures propagate.
    pub async fn get_or_create(&self, headers: &HeaderMap) -> Result<(Session, bool), SessionError> {
        let presented = self
            .settings
            .cookie
            .read(headers)
            .filter(|id| is_token_shaped(id));

        if let Some(id) = presented {
            match self.get(&id).await {
                Ok(session) => return Ok((session, false)),
                Err(SessionError::NotFound) => {
                    tracing::debug!("Unknown session cookie, issuing a new session");
                }
                Err(SessionError::Expired(reason)) => {
                    tracing::debug!(%reason, "Expired session cookie, issuing a new session");
                }
                Err(e) => return Err(e),
            }
        }

        Ok((self.create().await?, true))
    }

    /// Record activity, pushing the idle deadline forward.
    pub async fn touch(&self, id: &str) -> Result<DateTime<Utc>, SessionError> {
        let now = Utc::now();
        let result = sqlx::query("UPDATE sessions SET last_seen = ?1 WHERE id = ?2")
            .bind(format_ts(now))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SessionError::NotFound);
        }
        Ok(now)
    }

    /// Slide the absolute deadline to `now + absolute_timeout`.
    pub async fn refresh(&self, id: &str) -> Result<DateTime<Utc>, SessionError> {
        let expires_at = Utc::now() + delta(self.settings.absolute_timeout);
        let result = sqlx::query("UPDATE sessions SET expires_at = ?1 WHERE id = ?2")
            .bind(format_ts(expires_at))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SessionError::NotFound);
        }
        Ok(expires_at)
    }

    /// Remove a session (logout). Deleting a missing id is not an error.
    pub async fn delete(&self, id: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Bulk-delete rows past their absolute deadline or idle bound.
    pub async fn delete_expired(&self) -> Result<u64, SessionError> {
        let now = Utc::now();
        let idle_cutoff = now - delta(self.settings.idle_timeout);

        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1 OR last_seen <= ?2")
            .bind(format_ts(now))
            .bind(format_ts(idle_cutoff))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Remaining absolute lifetime, used as the cookie `Max-Age`.
    pub fn remaining_lifetime(&self, session: &Session) -> Duration {
        (session.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Emit the session cookie on `headers`.
    pub fn set_cookie(&self, headers: &mut HeaderMap, session: &Session) {
        self.settings
            .cookie
            .set(headers, &session.id, self.remaining_lifetime(session));
    }

    /// Emit a cookie removal on `headers`.
    pub fn clear_cookie(&self, headers: &mut HeaderMap) {
        self.settings.cookie.clear(headers);
    }

    /// Start the periodic expired-row sweep. Idempotent.
    pub fn start(self: &Arc<Self>, metrics: Arc<Metrics>) {
        self.sweeper.start_with(|| {
            Sweeper::spawn(
                "session",
                self,
                self.settings.sweep_interval,
                move |store: Arc<SessionStore>| {
                    let metrics = metrics.clone();
                    async move {
                        match store.delete_expired().await {
                            Ok(0) => {}
                            Ok(removed) => {
                                tracing::debug!(removed, "Swept expired sessions");
                                metrics.record_sweep("session", removed);
                            }
                            Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
                        }
                    }
                },
            )
        });
    }

    /// Stop the sweep and wait for it to exit.
    pub async fn stop(&self, grace: Duration) {
        self.sweeper.stop(grace).await;
    }
}
