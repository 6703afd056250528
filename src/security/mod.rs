//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_identity.rs (resolve caller identity)
//!     → rate_limit.rs (per-identity token bucket)
//!     → csrf.rs (per-session token on mutating methods)
//!     → headers.rs (security response headers)
//!     → Pass to cache / router
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any policy check failure
//! - Rejections carry generic messages only
//! - Forwarded headers are trusted; deploy behind a proxy that sets them

pub mod client_identity;
pub mod csrf;
pub mod headers;
pub mod rate_limit;

use rand::rngs::OsRng;
use rand::RngCore;

pub use client_identity::identify;
pub use csrf::CsrfGuard;
pub use rate_limit::RateLimiter;

const TOKEN_BYTES: usize = 32;

/// 256 bits from the OS RNG, hex encoded.
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Whether `value` could have come from [`random_token`].
pub fn is_token_shaped(value: &str) -> bool {
    value.len() == TOKEN_BYTES * 2 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Compare secrets without short-circuiting on the first differing byte.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
