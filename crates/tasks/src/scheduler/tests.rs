use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use culler_core::config::TaskConfig;
use culler_core::testing::FixedClock;
use culler_core::{
    AbortSignal, Collection, CollectionLog, CollectionMedia, Exclusion, HandledMedia, MediaId,
    RecordId, TaskRunning,
};
use culler_rules::RuleGroup;
use culler_storage::{MemoryStore, RecordStore, SharedStore, StoreError, StoreResult, TaskClaim};

use crate::error::{Result, TaskError};
use crate::runner::{Job, TaskRunner};

use super::Scheduler;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn config() -> TaskConfig {
    TaskConfig {
        registration_attempts: 3,
        registration_retry_secs: 10,
        shutdown_poll_ms: 50,
        stale_after_secs: None,
    }
}

/// Counts runs. When `block` is set, a run waits for its abort signal.
struct MockJob {
    name: String,
    runs: AtomicUsize,
    block: bool,
}

impl MockJob {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            runs: AtomicUsize::new(0),
            block: false,
        })
    }

    fn blocking(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            runs: AtomicUsize::new(0),
            block: true,
        })
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for MockJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, abort: &AbortSignal) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.block {
            abort.aborted().await;
        }
        Ok(())
    }
}

/// Memory store whose ledger reads fail a set number of times.
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicUsize,
}

impl FlakyStore {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            failures: AtomicUsize::new(failures),
        })
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn rule_groups(&self) -> StoreResult<Vec<RuleGroup>> {
        self.inner.rule_groups().await
    }
    async fn rule_group(&self, id: RecordId) -> StoreResult<Option<RuleGroup>> {
        self.inner.rule_group(id).await
    }
    async fn save_rule_group(&self, group: RuleGroup) -> StoreResult<RuleGroup> {
        self.inner.save_rule_group(group).await
    }
    async fn delete_rule_group(&self, id: RecordId) -> StoreResult<()> {
        self.inner.delete_rule_group(id).await
    }
    async fn collections(&self) -> StoreResult<Vec<Collection>> {
        self.inner.collections().await
    }
    async fn collection(&self, id: RecordId) -> StoreResult<Option<Collection>> {
        self.inner.collection(id).await
    }
    async fn save_collection(&self, collection: Collection) -> StoreResult<Collection> {
        self.inner.save_collection(collection).await
    }
    async fn delete_collection(&self, id: RecordId) -> StoreResult<()> {
        self.inner.delete_collection(id).await
    }
    async fn collection_media(&self, collection_id: RecordId) -> StoreResult<Vec<CollectionMedia>> {
        self.inner.collection_media(collection_id).await
    }
    async fn add_collection_media(&self, media: CollectionMedia) -> StoreResult<CollectionMedia> {
        self.inner.add_collection_media(media).await
    }
    async fn remove_collection_media(
        &self,
        collection_id: RecordId,
        media_id: &str,
    ) -> StoreResult<bool> {
        self.inner.remove_collection_media(collection_id, media_id).await
    }
    async fn handled_media(&self, collection_id: RecordId) -> StoreResult<Vec<HandledMedia>> {
        self.inner.handled_media(collection_id).await
    }
    async fn mark_handled(&self, handled: HandledMedia) -> StoreResult<HandledMedia> {
        self.inner.mark_handled(handled).await
    }
    async fn clear_handled(&self, collection_id: RecordId, media_id: &str) -> StoreResult<bool> {
        self.inner.clear_handled(collection_id, media_id).await
    }
    async fn exclusions(&self) -> StoreResult<Vec<Exclusion>> {
        self.inner.exclusions().await
    }
    async fn save_exclusion(&self, exclusion: Exclusion) -> StoreResult<Exclusion> {
        self.inner.save_exclusion(exclusion).await
    }
    async fn delete_exclusion(&self, id: RecordId) -> StoreResult<bool> {
        self.inner.delete_exclusion(id).await
    }
    async fn delete_exclusions_for_media(&self, media_id: &MediaId) -> StoreResult<usize> {
        self.inner.delete_exclusions_for_media(media_id).await
    }
    async fn append_log(&self, log: CollectionLog) -> StoreResult<CollectionLog> {
        self.inner.append_log(log).await
    }
    async fn logs(&self, collection_id: RecordId) -> StoreResult<Vec<CollectionLog>> {
        self.inner.logs(collection_id).await
    }
    async fn prune_logs(&self, collection_id: RecordId, before: DateTime<Utc>) -> StoreResult<usize> {
        self.inner.prune_logs(collection_id, before).await
    }
    async fn try_start_task(
        &self,
        name: &str,
        now: DateTime<Utc>,
        stale_after: Option<chrono::Duration>,
    ) -> StoreResult<TaskClaim> {
        self.inner.try_start_task(name, now, stale_after).await
    }
    async fn finish_task(&self, name: &str) -> StoreResult<()> {
        self.inner.finish_task(name).await
    }
    async fn task_status(&self, name: &str) -> StoreResult<TaskRunning> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Other("ledger not ready".to_string()));
        }
        self.inner.task_status(name).await
    }
    async fn task_statuses(&self) -> StoreResult<Vec<TaskRunning>> {
        self.inner.task_statuses().await
    }
}

fn scheduler_with(store: SharedStore) -> (Scheduler, Arc<FixedClock>) {
    let clock = FixedClock::new(t0());
    (Scheduler::new(config(), store, clock.clone()), clock)
}

fn runner_for(job: Arc<MockJob>, store: SharedStore, clock: Arc<FixedClock>) -> Arc<TaskRunner> {
    Arc::new(TaskRunner::new(job, store, clock))
}

// -- registration ---------------------------------------------------------

#[tokio::test]
async fn create_job_registers_and_reports_next_runs() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let (scheduler, clock) = scheduler_with(store.clone());
    let runner = runner_for(MockJob::new("rules"), store, clock);

    scheduler.create_job(runner, "0 0-23/8 * * *").await.unwrap();

    assert!(scheduler.is_registered("rules"));
    assert_eq!(scheduler.job_names(), vec!["rules".to_string()]);
    assert_eq!(
        scheduler.next_runs("rules", 2).unwrap(),
        vec![
            Utc.with_ymd_and_hms(2024, 6, 1, 16, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap(),
        ]
    );
    scheduler.shutdown().await;
}

#[tokio::test]
async fn invalid_cron_is_rejected_without_retry() {
    let store = FlakyStore::new(0);
    let (scheduler, clock) = scheduler_with(store.clone());
    let runner = runner_for(MockJob::new("rules"), store, clock);

    let err = scheduler.create_job(runner, "not a cron").await.unwrap_err();
    assert!(matches!(err, TaskError::InvalidCron { .. }));
    assert!(!scheduler.is_registered("rules"));
}

#[tokio::test(start_paused = true)]
async fn registration_retries_until_ledger_is_ready() {
    let store = FlakyStore::new(2);
    let (scheduler, clock) = scheduler_with(store.clone());
    let runner = runner_for(MockJob::new("rules"), store, clock);

    let started = tokio::time::Instant::now();
    scheduler.create_job(runner, "0 0 * * *").await.unwrap();

    assert!(scheduler.is_registered("rules"));
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(20) && waited < Duration::from_secs(21));
    scheduler.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn registration_gives_up_after_configured_attempts() {
    let store = FlakyStore::new(10);
    let (scheduler, clock) = scheduler_with(store.clone());
    let job = MockJob::new("rules");
    let runner = runner_for(job.clone(), store, clock);

    let err = scheduler.create_job(runner.clone(), "0 0 * * *").await.unwrap_err();
    assert!(matches!(err, TaskError::Registration { attempts: 3, .. }));
    assert!(!scheduler.is_registered("rules"));

    // The runner stays usable for manual runs.
    assert!(runner.execute(None).await.unwrap().ran());
    assert_eq!(job.runs(), 1);
}

// -- schedule changes -----------------------------------------------------

#[tokio::test]
async fn update_job_replaces_schedule() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let (scheduler, clock) = scheduler_with(store.clone());
    let runner = runner_for(MockJob::new("collections"), store, clock);
    scheduler.create_job(runner, "0 0-23/12 * * *").await.unwrap();

    scheduler.update_job("collections", "30 13 * * *").unwrap();

    assert_eq!(scheduler.schedule_of("collections").as_deref(), Some("30 13 * * *"));
    assert_eq!(
        scheduler.next_runs("collections", 1).unwrap(),
        vec![Utc.with_ymd_and_hms(2024, 6, 1, 13, 30, 0).unwrap()]
    );
    scheduler.shutdown().await;
}

#[tokio::test]
async fn update_job_rejects_unknown_task_and_bad_cron() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let (scheduler, clock) = scheduler_with(store.clone());
    let runner = runner_for(MockJob::new("rules"), store, clock);
    scheduler.create_job(runner, "0 0 * * *").await.unwrap();

    assert!(matches!(
        scheduler.update_job("nope", "0 0 * * *"),
        Err(TaskError::UnknownTask(_))
    ));
    assert!(matches!(
        scheduler.update_job("rules", "61 * * * *"),
        Err(TaskError::InvalidCron { .. })
    ));
    assert_eq!(scheduler.schedule_of("rules").as_deref(), Some("0 0 * * *"));
    scheduler.shutdown().await;
}

// -- tick loop ------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn tick_loop_fires_job() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let (scheduler, clock) = scheduler_with(store.clone());
    let job = MockJob::new("rules");
    scheduler
        .create_job(runner_for(job.clone(), store.clone(), clock), "* * * * * *")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(job.runs() >= 2, "expected at least two runs, got {}", job.runs());

    scheduler.shutdown().await;
    assert!(!store.task_status("rules").await.unwrap().running);
}

// -- stop and shutdown ----------------------------------------------------

#[tokio::test]
async fn stop_execution_aborts_running_body() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let (scheduler, clock) = scheduler_with(store.clone());
    let job = MockJob::blocking("rules");
    let runner = runner_for(job.clone(), store.clone(), clock);
    scheduler.create_job(runner.clone(), "0 0 1 1 *").await.unwrap();

    let run = tokio::spawn({
        let runner = runner.clone();
        async move { runner.execute(None).await }
    });
    while !runner.is_active() {
        tokio::task::yield_now().await;
    }
    assert!(store.task_status("rules").await.unwrap().running);

    assert!(scheduler.stop_execution("rules").unwrap());
    let outcome = tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, crate::runner::RunOutcome::Aborted);
    assert!(!store.task_status("rules").await.unwrap().running);
    scheduler.shutdown().await;
}

#[tokio::test]
async fn shutdown_waits_for_running_task() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let (scheduler, clock) = scheduler_with(store.clone());
    let job = MockJob::blocking("rules");
    let runner = runner_for(job.clone(), store.clone(), clock);
    scheduler.create_job(runner.clone(), "0 0 1 1 *").await.unwrap();

    let run = tokio::spawn({
        let runner = runner.clone();
        async move { runner.execute(None).await }
    });
    while !runner.is_active() {
        tokio::task::yield_now().await;
    }

    tokio::time::timeout(Duration::from_secs(2), scheduler.shutdown())
        .await
        .unwrap();
    assert!(!store.task_status("rules").await.unwrap().running);
    assert!(run.await.unwrap().unwrap().ran());
}

#[tokio::test]
async fn shutdown_ignores_ledger_rows_from_earlier_process() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    store
        .try_start_task("rules", t0() - chrono::Duration::hours(1), None)
        .await
        .unwrap();
    let (scheduler, clock) = scheduler_with(store.clone());
    let runner = runner_for(MockJob::new("rules"), store.clone(), clock);
    scheduler.create_job(runner, "0 0 * * *").await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), scheduler.shutdown())
        .await
        .unwrap();
    assert!(store.task_status("rules").await.unwrap().running);
}

#[tokio::test]
async fn create_job_after_shutdown_fails() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let (scheduler, clock) = scheduler_with(store.clone());
    scheduler.shutdown().await;

    let runner = runner_for(MockJob::new("rules"), store, clock);
    assert!(matches!(
        scheduler.create_job(runner, "0 0 * * *").await,
        Err(TaskError::Registration { .. })
    ));
}

#[tokio::test]
async fn tick_started_after_shutdown_is_aborted() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let (_, clock) = scheduler_with(store.clone());
    let job = MockJob::blocking("rules");
    let runner = runner_for(job.clone(), store.clone(), clock);
    let shutdown = AbortSignal::new();
    shutdown.abort();

    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        Scheduler::execute_linked(&runner, &shutdown),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(outcome, crate::runner::RunOutcome::Aborted);
    assert!(!store.task_status("rules").await.unwrap().running);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_scheduled_run() {
    let store: SharedStore = Arc::new(MemoryStore::new());
    let (scheduler, clock) = scheduler_with(store.clone());
    let job = MockJob::blocking("rules");
    let runner = runner_for(job.clone(), store.clone(), clock);
    scheduler.create_job(runner.clone(), "* * * * * *").await.unwrap();

    while !runner.is_active() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::timeout(Duration::from_secs(5), scheduler.shutdown())
        .await
        .unwrap();
    assert!(!runner.is_active());
    assert_eq!(job.runs(), 1);
    assert!(!store.task_status("rules").await.unwrap().running);
}
