//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, outer layers)
//!     → request.rs (request ID, access-log span)
//!     → middleware/ (pipeline stages, see crate::pipeline)
//!     → handlers.rs
//!     → Send to client
//! ```

pub mod handlers;
pub mod middleware;
pub mod request;
pub mod server;

pub use handlers::AppState;
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
