//! Pipeline stages as axum middleware.
//!
//! Each stage takes the shared [`Pipeline`](crate::pipeline::Pipeline) as
//! state and only touches the component it is named after.

pub mod cache;
pub mod headers;
pub mod metrics;
pub mod rate_limit;
pub mod session;
