use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use culler_core::config::TaskConfig;
use culler_core::{AbortSignal, SharedClock};
use culler_storage::SharedStore;

use crate::cron::{normalize_cron, parse_schedule};
use crate::error::{Result, TaskError};
use crate::runner::TaskRunner;

/// One registered job.
pub(super) struct ScheduledJob {
    pub(super) runner: Arc<TaskRunner>,
    pub(super) expression: String,
    pub(super) schedule: watch::Sender<Schedule>,
    pub(super) handle: Option<JoinHandle<()>>,
}

/// Fires registered [`TaskRunner`]s on their cron schedules.
///
/// Each job gets its own tick loop. A tick that arrives while the previous
/// run is still going is skipped, and the ledger keeps manual and scheduled
/// runs from overlapping.
pub struct Scheduler {
    pub(super) config: TaskConfig,
    pub(super) store: SharedStore,
    pub(super) clock: SharedClock,
    pub(super) jobs: Mutex<HashMap<String, ScheduledJob>>,
    /// Raised once on shutdown; ends every tick loop.
    pub(super) shutdown: AbortSignal,
    /// Ledger rows that went running before this instant belong to an
    /// earlier process and are not waited for on shutdown.
    pub(super) started_at: DateTime<Utc>,
}

impl Scheduler {
    pub fn new(config: TaskConfig, store: SharedStore, clock: SharedClock) -> Self {
        let started_at = clock.now();
        Self {
            config,
            store,
            clock,
            jobs: Mutex::new(HashMap::new()),
            shutdown: AbortSignal::new(),
            started_at,
        }
    }

    /// Register `runner` to fire on `cron`.
    ///
    /// Registration checks the task ledger is reachable and is retried
    /// `registration_attempts` times, `registration_retry` apart. An invalid
    /// expression fails at once. Failure leaves the runner usable for
    /// manual execution.
    pub async fn create_job(&self, runner: Arc<TaskRunner>, cron: &str) -> Result<()> {
        let name = runner.name().to_string();
        let schedule = parse_schedule(cron)?;
        if self.shutdown.is_aborted() {
            return Err(TaskError::Registration {
                name,
                attempts: 0,
                message: "scheduler is shut down".to_string(),
            });
        }

        let attempts = self.config.registration_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.store.task_status(&name).await {
                Ok(status) => {
                    if status.running {
                        warn!(
                            task = %name,
                            since = ?status.running_since,
                            "ledger shows task running at registration"
                        );
                    }
                    self.install(runner, cron, schedule);
                    info!(task = %name, cron = %normalize_cron(cron), attempt, "job registered");
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(task = %name, attempt, attempts, error = %e, "job registration failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.registration_retry()).await;
                    }
                }
            }
        }

        error!(task = %name, attempts, "giving up on job registration");
        Err(TaskError::Registration {
            name,
            attempts,
            message: last_error,
        })
    }

    fn install(&self, runner: Arc<TaskRunner>, cron: &str, schedule: Schedule) {
        let name = runner.name().to_string();
        let (tx, rx) = watch::channel(schedule);
        let handle = tokio::spawn(Self::run_job(
            Arc::clone(&runner),
            rx,
            self.shutdown.clone(),
            Arc::clone(&self.clock),
        ));
        let replaced = self.lock_jobs().insert(
            name.clone(),
            ScheduledJob {
                runner,
                expression: cron.trim().to_string(),
                schedule: tx,
                handle: Some(handle),
            },
        );
        if let Some(mut old) = replaced {
            warn!(task = %name, "job registered twice, previous tick loop stopped");
            if let Some(handle) = old.handle.take() {
                handle.abort();
            }
        }
    }

    /// Swap the schedule of a registered job. The tick loop picks it up
    /// without waiting for the old next fire time; a run in progress
    /// is left alone.
    pub fn update_job(&self, name: &str, cron: &str) -> Result<()> {
        let schedule = parse_schedule(cron)?;
        let mut jobs = self.lock_jobs();
        let job = jobs
            .get_mut(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;
        if job.expression == cron.trim() {
            return Ok(());
        }
        job.schedule.send_replace(schedule);
        info!(task = name, from = %job.expression, to = %cron.trim(), "job schedule updated");
        job.expression = cron.trim().to_string();
        Ok(())
    }

    /// Raise the abort signal of `name`'s in-flight run.
    pub fn stop_execution(&self, name: &str) -> Result<bool> {
        let jobs = self.lock_jobs();
        let job = jobs
            .get(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;
        Ok(job.runner.stop_execution())
    }

    pub fn schedule_of(&self, name: &str) -> Option<String> {
        self.lock_jobs().get(name).map(|j| j.expression.clone())
    }

    pub fn job_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_jobs().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock_jobs().contains_key(name)
    }

    /// The next `count` fire times of a registered job.
    pub fn next_runs(&self, name: &str, count: usize) -> Result<Vec<DateTime<Utc>>> {
        let expression = self
            .schedule_of(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;
        crate::cron::upcoming(&expression, self.clock.now(), count)
    }

    pub(super) fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<String, ScheduledJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
