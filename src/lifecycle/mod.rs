//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → Open row-store → Build Pipeline → Start sweeps → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain requests
//!     → Stop cache sweep → Stop rate-limit sweep → Stop CSRF sweep
//!     → Stop session sweep → Close row-store
//!
//! Sweeps (sweeper.rs):
//!     interval tick → component sweep → repeat until stop()
//! ```
//!
//! # Design Decisions
//! - Every background task is owned by the component whose state it sweeps
//! - `stop()` waits for the task to exit, bounded by a grace period
//! - No component outlives the row-store it depends on

pub mod shutdown;
pub mod sweeper;

pub use shutdown::{wait_for_signal, Shutdown};
pub use sweeper::{Sweeper, SweeperSlot};
