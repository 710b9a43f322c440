//! Ledger discipline of the task runner.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;
use tokio::sync::Notify;

use culler_core::testing::FixedClock;
use culler_storage::{MemoryStore, RecordStore, SharedStore};
use culler_tasks::{AbortSignal, Job, RunOutcome, TaskRunner};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Signals `entered` on start and holds until `release` fires.
struct GatedJob {
    runs: AtomicUsize,
    entered: Notify,
    release: Notify,
}

impl GatedJob {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            runs: AtomicUsize::new(0),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl Job for GatedJob {
    fn name(&self) -> &str {
        "gated"
    }

    async fn run(&self, _abort: &AbortSignal) -> culler_tasks::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.release.notified().await;
        Ok(())
    }
}

struct SleepyJob {
    runs: AtomicUsize,
}

#[async_trait]
impl Job for SleepyJob {
    fn name(&self) -> &str {
        "sleepy"
    }

    async fn run(&self, _abort: &AbortSignal) -> culler_tasks::Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }
}

struct PanickyJob {
    runs: AtomicUsize,
}

#[async_trait]
impl Job for PanickyJob {
    fn name(&self) -> &str {
        "panicky"
    }

    async fn run(&self, _abort: &AbortSignal) -> culler_tasks::Result<()> {
        if self.runs.fetch_add(1, Ordering::SeqCst) == 0 {
            panic!("first run explodes");
        }
        Ok(())
    }
}

fn memory_store() -> SharedStore {
    Arc::new(MemoryStore::new())
}

#[tokio::test]
async fn second_execute_sees_running_ledger_and_skips_body() {
    let store = memory_store();
    let job = GatedJob::new();
    let runner = Arc::new(TaskRunner::new(job.clone(), store.clone(), FixedClock::new(t0())));

    let first = tokio::spawn({
        let runner = runner.clone();
        async move { runner.execute(None).await }
    });
    job.entered.notified().await;

    let status = store.task_status("gated").await.unwrap();
    assert!(status.running);
    assert_eq!(status.running_since, Some(t0()));

    let second = runner.execute(None).await.unwrap();
    assert_eq!(second, RunOutcome::Skipped { since: Some(t0()) });

    job.release.notify_one();
    assert_eq!(first.await.unwrap().unwrap(), RunOutcome::Completed);
    assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    assert!(!store.task_status("gated").await.unwrap().running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_executes_run_body_once() {
    let store = memory_store();
    let job = Arc::new(SleepyJob {
        runs: AtomicUsize::new(0),
    });
    let runner = Arc::new(TaskRunner::new(job.clone(), store.clone(), FixedClock::new(t0())));

    let outcomes = join_all((0..8).map(|_| {
        let runner = runner.clone();
        tokio::spawn(async move { runner.execute(None).await.unwrap() })
    }))
    .await;

    let ran = outcomes
        .into_iter()
        .map(|o| o.unwrap())
        .filter(RunOutcome::ran)
        .count();
    assert_eq!(ran, 1);
    assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    assert!(!store.task_status("sleepy").await.unwrap().running);
}

#[tokio::test]
async fn panicking_body_still_clears_ledger() {
    let store = memory_store();
    let job = Arc::new(PanickyJob {
        runs: AtomicUsize::new(0),
    });
    let runner = TaskRunner::new(job.clone(), store.clone(), FixedClock::new(t0()));

    let outcome = runner.execute(None).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Panicked(ref m) if m.contains("explodes")));
    assert!(!store.task_status("panicky").await.unwrap().running);

    assert_eq!(runner.execute(None).await.unwrap(), RunOutcome::Completed);
    assert_eq!(job.runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn stale_row_is_reclaimed_only_with_timeout() {
    let store = memory_store();
    store
        .try_start_task("sleepy", t0() - chrono::Duration::hours(2), None)
        .await
        .unwrap();
    let job = Arc::new(SleepyJob {
        runs: AtomicUsize::new(0),
    });

    let strict = TaskRunner::new(job.clone(), store.clone(), FixedClock::new(t0()));
    assert!(!strict.execute(None).await.unwrap().ran());
    assert_eq!(job.runs.load(Ordering::SeqCst), 0);

    let lenient = TaskRunner::new(job.clone(), store.clone(), FixedClock::new(t0()))
        .with_stale_after(Some(Duration::from_secs(3600)));
    assert_eq!(lenient.execute(None).await.unwrap(), RunOutcome::Completed);
    assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    assert!(!store.task_status("sleepy").await.unwrap().running);
}

#[tokio::test]
async fn crashed_run_survives_restart_until_reset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let before_crash = MemoryStore::open(&path).unwrap();
        before_crash
            .try_start_task("sleepy", t0(), None)
            .await
            .unwrap();
    }

    let store: SharedStore = Arc::new(MemoryStore::open(&path).unwrap());
    let job = Arc::new(SleepyJob {
        runs: AtomicUsize::new(0),
    });
    let runner = TaskRunner::new(job.clone(), store.clone(), FixedClock::new(t0()));

    assert!(!runner.execute(None).await.unwrap().ran());
    store.finish_task("sleepy").await.unwrap();
    assert_eq!(runner.execute(None).await.unwrap(), RunOutcome::Completed);
    assert_eq!(job.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn caller_supplied_signal_aborts_run() {
    struct UntilAborted;

    #[async_trait]
    impl Job for UntilAborted {
        fn name(&self) -> &str {
            "until-aborted"
        }

        async fn run(&self, abort: &AbortSignal) -> culler_tasks::Result<()> {
            abort.aborted().await;
            Ok(())
        }
    }

    let store = memory_store();
    let runner = Arc::new(TaskRunner::new(
        Arc::new(UntilAborted),
        store.clone(),
        FixedClock::new(t0()),
    ));
    let signal = AbortSignal::new();
    let run = tokio::spawn({
        let runner = runner.clone();
        let signal = signal.clone();
        async move { runner.execute(Some(signal)).await }
    });
    while !runner.is_active() {
        tokio::task::yield_now().await;
    }

    signal.abort();
    let outcome = tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, RunOutcome::Aborted);
    assert!(!store.task_status("until-aborted").await.unwrap().running);
}

#[tokio::test]
async fn unpersisted_claim_does_not_wedge_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store: SharedStore = Arc::new(MemoryStore::open(&path).unwrap());
    let job = Arc::new(SleepyJob {
        runs: AtomicUsize::new(0),
    });
    let runner = TaskRunner::new(job.clone(), store.clone(), FixedClock::new(t0()));

    let blocker = path.with_extension("json.tmp");
    std::fs::create_dir(&blocker).unwrap();
    assert!(runner.execute(None).await.is_err());
    assert!(!store.task_status("sleepy").await.unwrap().running);
    assert_eq!(job.runs.load(Ordering::SeqCst), 0);

    std::fs::remove_dir(&blocker).unwrap();
    assert_eq!(runner.execute(None).await.unwrap(), RunOutcome::Completed);
    assert_eq!(job.runs.load(Ordering::SeqCst), 1);
}
