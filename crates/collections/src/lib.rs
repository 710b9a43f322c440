//! Collection reconciliation.
//!
//! This crate provides:
//! - [`ReconcilePlan`], the pure add/remove diff between tracked members and
//!   an evaluation
//! - [`CollectionReconciler`], which applies the diff, runs the retention
//!   pass with its arr actions and journals every change as a log row plus
//!   a `CollectionMedia_*` event
//! - Housekeeping: missing-media pruning, log retention, exclusion sweep
//! - Manual membership and exclusion operations

pub mod error;
mod journal;
mod maintenance;
mod manual;
pub mod plan;
mod reconciler;
mod retention;

pub use error::{ReconcileError, Result};
pub use journal::RemovalReason;
pub use plan::ReconcilePlan;
pub use reconciler::{CollectionReconciler, ReconcileOutcome};
