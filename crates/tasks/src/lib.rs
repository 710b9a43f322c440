//! Task execution for culler.
//!
//! This crate provides:
//! - [`TaskRunner`], the at-most-one-run-per-name wrapper around a [`Job`]
//!   backed by the persisted task ledger
//! - [`Scheduler`], cron tick loops with bootstrap registration retry and a
//!   drain-on-shutdown
//! - The rule handler and collection handler jobs
//! - [`Engine`], the facade the worker binary and callers drive
//! - [`JsonLibrary`], a media server read from a JSON export

pub mod cron;
pub mod engine;
pub mod error;
pub mod jobs;
pub mod offline;
pub mod runner;
pub mod scheduler;

pub use culler_core::AbortSignal;
pub use engine::Engine;
pub use error::{Result, TaskError};
pub use jobs::{CollectionHandlerJob, RuleHandlerJob, COLLECTION_HANDLER, RULE_HANDLER};
pub use offline::JsonLibrary;
pub use runner::{Job, RunOutcome, TaskRunner};
pub use scheduler::Scheduler;
