use thiserror::Error;

use culler_collections::ReconcileError;
use culler_rules::RuleError;
use culler_storage::StoreError;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Task {name} could not be registered after {attempts} attempts: {message}")]
    Registration {
        name: String,
        attempts: u32,
        message: String,
    },

    #[error("Task {0} is running")]
    Busy(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;
