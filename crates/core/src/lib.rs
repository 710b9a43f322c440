//! Shared domain model for the culler workspace.
//!
//! This crate provides:
//! - Environment-driven configuration with profile support
//! - The media item model handed out by the media library provider
//! - Persisted record types (collections, memberships, exclusions, logs, task ledger)
//! - Capability-provider traits for the media server and companion services
//! - A [`Clock`] abstraction so time-dependent logic is testable
//! - [`AbortSignal`] for cooperative cancellation of long-running work

pub mod abort;
pub mod clock;
pub mod config;
pub mod error;
pub mod media;
pub mod providers;
pub mod records;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use abort::AbortSignal;
pub use clock::{Clock, SharedClock, SystemClock};
pub use config::Config;
pub use error::*;
pub use media::*;
pub use records::*;
