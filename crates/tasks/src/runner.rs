//! [`TaskRunner`]: wraps a named [`Job`] with the ledger discipline.
//!
//! A run is Idle → Running → Idle. Entry is an atomic ledger claim, so two
//! concurrent `execute` calls never both run the body. Exit always clears
//! the ledger, whether the body returned, failed, was aborted or panicked.
//! Stopping never kills the body; it only raises the run's [`AbortSignal`].

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, info, warn};

use culler_core::{AbortSignal, SharedClock};
use culler_storage::{SharedStore, TaskClaim};

use crate::error::Result;

/// A unit of work the runner can execute.
#[async_trait]
pub trait Job: Send + Sync {
    /// Ledger key. Stable across restarts.
    fn name(&self) -> &str;

    /// Run once. Long loops check `abort` between items and return early.
    async fn run(&self, abort: &AbortSignal) -> Result<()>;
}

/// How one `execute` call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The body returned early after a stop request.
    Aborted,
    /// Another run holds the ledger; the body was not invoked.
    Skipped {
        since: Option<chrono::DateTime<chrono::Utc>>,
    },
    Failed(String),
    Panicked(String),
}

impl RunOutcome {
    pub fn ran(&self) -> bool {
        !matches!(self, RunOutcome::Skipped { .. })
    }
}

pub struct TaskRunner {
    job: Arc<dyn Job>,
    store: SharedStore,
    clock: SharedClock,
    stale_after: Mutex<Option<chrono::Duration>>,
    current: Mutex<Option<AbortSignal>>,
}

impl TaskRunner {
    pub fn new(job: Arc<dyn Job>, store: SharedStore, clock: SharedClock) -> Self {
        Self {
            job,
            store,
            clock,
            stale_after: Mutex::new(None),
            current: Mutex::new(None),
        }
    }

    /// Make running ledger rows older than `stale_after` reclaimable.
    pub fn with_stale_after(self, stale_after: Option<std::time::Duration>) -> Self {
        self.set_stale_after(stale_after);
        self
    }

    pub fn set_stale_after(&self, stale_after: Option<std::time::Duration>) {
        let limit = stale_after.and_then(|d| chrono::Duration::from_std(d).ok());
        *self
            .stale_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = limit;
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }

    /// Whether this process is running the body right now.
    pub fn is_active(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run the job unless another run holds the ledger.
    ///
    /// `abort` lets the caller cancel this run; a fresh signal is used when
    /// none is given. Only a failing ledger claim is an error. What the body
    /// does is reported through [`RunOutcome`].
    pub async fn execute(&self, abort: Option<AbortSignal>) -> Result<RunOutcome> {
        let name = self.job.name();
        let stale_after = *self
            .stale_after
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        match self
            .store
            .try_start_task(name, self.clock.now(), stale_after)
            .await?
        {
            TaskClaim::AlreadyRunning { since } => {
                info!(task = name, ?since, "task already running, skipped");
                return Ok(RunOutcome::Skipped { since });
            }
            TaskClaim::Reclaimed { since } => {
                warn!(task = name, ?since, "reclaimed stale task ledger row");
            }
            TaskClaim::Started => {}
        }

        let abort = abort.unwrap_or_default();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(abort.clone());
        info!(task = name, "task started");
        let started = Instant::now();

        let result = AssertUnwindSafe(self.job.run(&abort)).catch_unwind().await;

        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        if let Err(e) = self.store.finish_task(name).await {
            error!(task = name, error = %e, "failed to clear task ledger, manual reset required");
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let outcome = match result {
            Ok(Ok(())) if abort.is_aborted() => RunOutcome::Aborted,
            Ok(Ok(())) => RunOutcome::Completed,
            Ok(Err(e)) => RunOutcome::Failed(e.to_string()),
            Err(panic) => RunOutcome::Panicked(panic_message(panic.as_ref())),
        };
        match &outcome {
            RunOutcome::Completed => info!(task = name, elapsed_ms, "task finished"),
            RunOutcome::Aborted => info!(task = name, elapsed_ms, "task stopped early"),
            RunOutcome::Failed(e) => error!(task = name, elapsed_ms, error = %e, "task failed"),
            RunOutcome::Panicked(e) => error!(task = name, elapsed_ms, panic = %e, "task panicked"),
            RunOutcome::Skipped { .. } => {}
        }
        Ok(outcome)
    }

    /// Ask the in-flight run to stop. Returns whether one was running here.
    pub fn stop_execution(&self) -> bool {
        match self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(signal) => {
                info!(task = self.job.name(), "stop requested");
                signal.abort();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("name", &self.job.name())
            .field("active", &self.is_active())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
