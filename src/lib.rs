//! Idea intake service library.
//!
//! Every API request passes through a fixed pipeline of session attachment,
//! CSRF checks, security headers, per-client rate limiting, CORS and a
//! short-lived response cache before reaching the idea handlers.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod ideas;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod security;
pub mod session;

pub use config::AppConfig;
pub use error::ApiError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::Pipeline;
