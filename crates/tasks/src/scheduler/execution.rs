use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use culler_core::{AbortSignal, SharedClock};

use crate::cron::next_fire;
use crate::runner::{RunOutcome, TaskRunner};

use super::Scheduler;

impl Scheduler {
    /// Tick loop of one job. Ends on shutdown.
    ///
    /// The next fire time is computed after every run, so ticks that pass
    /// while a run is in flight are dropped rather than queued.
    pub(super) async fn run_job(
        runner: Arc<TaskRunner>,
        mut schedule: watch::Receiver<Schedule>,
        shutdown: AbortSignal,
        clock: SharedClock,
    ) {
        let name = runner.name().to_string();
        let mut last_fire: Option<DateTime<Utc>> = None;

        loop {
            let current = schedule.borrow_and_update().clone();
            let now = clock.now();
            let from = last_fire.map_or(now, |last| last.max(now));

            let Some(next) = next_fire(&current, from) else {
                warn!(task = %name, "schedule has no future fire time");
                tokio::select! {
                    _ = shutdown.aborted() => break,
                    changed = schedule.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(task = %name, next = %next, "waiting for next tick");

            tokio::select! {
                _ = shutdown.aborted() => break,
                changed = schedule.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    last_fire = None;
                }
                _ = tokio::time::sleep(wait) => {
                    if shutdown.is_aborted() {
                        break;
                    }
                    last_fire = Some(next);
                    match Self::execute_linked(&runner, &shutdown).await {
                        Ok(RunOutcome::Skipped { since }) => {
                            debug!(task = %name, ?since, "tick skipped, task still running");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(task = %name, error = %e, "tick could not claim the task ledger"),
                    }
                }
            }
        }
        debug!(task = %name, "tick loop stopped");
    }

    /// Run one tick with a signal that also fires on scheduler shutdown.
    pub(super) async fn execute_linked(
        runner: &TaskRunner,
        shutdown: &AbortSignal,
    ) -> crate::error::Result<RunOutcome> {
        let signal = AbortSignal::new();
        let execution = runner.execute(Some(signal.clone()));
        tokio::pin!(execution);
        tokio::select! {
            result = &mut execution => result,
            _ = shutdown.aborted() => {
                signal.abort();
                execution.await
            }
        }
    }

    /// Stop scheduling and wait for running tasks to finish.
    ///
    /// Raises every in-flight run's abort signal, then polls the ledger every
    /// `shutdown_poll` until none of this process's runs is marked running.
    /// There is no timeout: a body that ignores its signal keeps shutdown
    /// waiting.
    pub async fn shutdown(&self) {
        info!("scheduler shutdown requested");
        self.shutdown.abort();

        let (names, handles) = {
            let mut jobs = self.lock_jobs();
            let mut names = Vec::with_capacity(jobs.len());
            let mut handles = Vec::with_capacity(jobs.len());
            for (name, job) in jobs.iter_mut() {
                job.runner.stop_execution();
                names.push(name.clone());
                if let Some(handle) = job.handle.take() {
                    handles.push(handle);
                }
            }
            (names, handles)
        };

        for name in &names {
            self.wait_idle(name).await;
        }
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "tick loop ended abnormally");
            }
        }
        info!(jobs = names.len(), "scheduler stopped");
    }

    /// Poll the ledger until `name` is idle or its running row predates
    /// this scheduler.
    pub(super) async fn wait_idle(&self, name: &str) {
        let mut logged = false;
        loop {
            match self.store.task_status(name).await {
                Ok(status) if !status.running => return,
                Ok(status) => {
                    if status.running_since.is_some_and(|since| since < self.started_at) {
                        warn!(task = name, since = ?status.running_since, "stale ledger row left from an earlier process");
                        return;
                    }
                    if !logged {
                        info!(task = name, "waiting for running task to finish");
                        logged = true;
                    }
                }
                Err(e) => {
                    warn!(task = name, error = %e, "ledger unreadable during shutdown");
                    return;
                }
            }
            tokio::time::sleep(self.config.shutdown_poll()).await;
        }
    }
}
