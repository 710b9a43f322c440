//! Cron job scheduler.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, job registration with retry, schedule updates
//! - `execution`: per-job tick loop and shutdown drain

mod core;
mod execution;
#[cfg(test)]
mod tests;

pub use self::core::Scheduler;
