//! Database-backed sessions.
//!
//! # Data Flow
//! ```text
//! Cookie: session_id=<hex>
//!     → cookie.rs (extract id)
//!     → store.rs get() → valid? touch last_seen : create new row
//!     → Set-Cookie refreshed on the response
//! ```
//!
//! # Design Decisions
//! - Idle and absolute expiry are checked independently; `expires_at`
//!   never encodes the idle bound
//! - Expired rows are deleted lazily on read and in bulk by the sweep
//! - Store failures are distinct from NotFound / Expired so the pipeline
//!   can answer 500 instead of silently minting a new session

pub mod cookie;
pub mod store;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use cookie::CookieSettings;
pub use store::{SessionSettings, SessionStore};

/// A persisted session record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Which bound a session crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    Absolute,
    Idle,
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryReason::Absolute => write!(f, "session expired: absolute lifetime exceeded"),
            ExpiryReason::Idle => write!(f, "session expired: idle timeout exceeded"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("{0}")]
    Expired(ExpiryReason),

    #[error("session store error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Session attached to a request by the pipeline.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session: Session,
    pub is_new: bool,
}
