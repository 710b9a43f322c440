//! [`Engine`]: wires the store, providers, event bus, reconciler, both jobs
//! and the scheduler together from one [`Config`].

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use culler_collections::CollectionReconciler;
use culler_core::providers::Providers;
use culler_core::{Collection, Config, SharedClock, TaskRunning};
use culler_notify::EventBus;
use culler_rules::{
    validate_document, HandlerSettings, MediaTestResult, RuleError, RuleGroup, RuleGroupDocument,
    RuleGroupHandler,
};
use culler_storage::SharedStore;

use crate::cron::{parse_schedule, upcoming};
use crate::error::{Result, TaskError};
use crate::jobs::{CollectionHandlerJob, RuleHandlerJob, COLLECTION_HANDLER, RULE_HANDLER, TASK_NAMES};
use crate::runner::{RunOutcome, TaskRunner};
use crate::scheduler::Scheduler;

pub struct Engine {
    config: RwLock<Config>,
    providers: Providers,
    store: SharedStore,
    bus: EventBus,
    clock: SharedClock,
    reconciler: Arc<CollectionReconciler>,
    rule_job: Arc<RuleHandlerJob>,
    rule_runner: Arc<TaskRunner>,
    collection_runner: Arc<TaskRunner>,
    scheduler: Scheduler,
}

impl Engine {
    pub fn new(
        config: Config,
        providers: Providers,
        store: SharedStore,
        bus: EventBus,
        clock: SharedClock,
    ) -> Self {
        let reconciler = Arc::new(CollectionReconciler::new(
            providers.clone(),
            Arc::clone(&store),
            bus.clone(),
            Arc::clone(&clock),
        ));
        let rule_job = Arc::new(RuleHandlerJob::new(
            Arc::clone(&store),
            Arc::clone(&reconciler),
            bus.clone(),
            Self::build_handler(&config, &providers, &clock),
        ));
        let collection_job = Arc::new(CollectionHandlerJob::new(
            Arc::clone(&store),
            Arc::clone(&reconciler),
            bus.clone(),
        ));

        let stale_after = config.tasks.stale_after();
        let rule_runner = Arc::new(
            TaskRunner::new(rule_job.clone(), Arc::clone(&store), Arc::clone(&clock))
                .with_stale_after(stale_after),
        );
        let collection_runner = Arc::new(
            TaskRunner::new(collection_job, Arc::clone(&store), Arc::clone(&clock))
                .with_stale_after(stale_after),
        );
        let scheduler = Scheduler::new(config.tasks.clone(), Arc::clone(&store), Arc::clone(&clock));

        Self {
            config: RwLock::new(config),
            providers,
            store,
            bus,
            clock,
            reconciler,
            rule_job,
            rule_runner,
            collection_runner,
            scheduler,
        }
    }

    fn build_handler(config: &Config, providers: &Providers, clock: &SharedClock) -> RuleGroupHandler {
        RuleGroupHandler::new(
            providers.clone(),
            Arc::clone(clock),
            HandlerSettings::from_config(&config.rules, &config.tautulli),
        )
    }

    /// Register both jobs on their cron schedules.
    ///
    /// A job that fails registration is logged and left unscheduled; it can
    /// still be run by hand. Returns the names that were registered.
    pub async fn start(&self) -> Vec<&'static str> {
        let mut registered = Vec::new();
        for (name, runner) in [
            (RULE_HANDLER, &self.rule_runner),
            (COLLECTION_HANDLER, &self.collection_runner),
        ] {
            let cron = self.cron_for(name);
            match self.scheduler.create_job(Arc::clone(runner), &cron).await {
                Ok(()) => registered.push(name),
                Err(e) => error!(task = name, cron = %cron, error = %e, "job not scheduled"),
            }
        }
        info!(jobs = ?registered, "engine started");
        registered
    }

    /// Run the rule handler now.
    pub async fn execute_rules(&self) -> Result<RunOutcome> {
        self.rule_runner.execute(None).await
    }

    /// Run the collection handler now.
    pub async fn handle_collections(&self) -> Result<RunOutcome> {
        self.collection_runner.execute(None).await
    }

    /// Change a task's cron expression. Takes effect on the running tick
    /// loop and on the next `start` alike.
    pub fn update_schedule(&self, task: &str, cron: &str) -> Result<()> {
        parse_schedule(cron)?;
        self.runner(task)?;
        if self.scheduler.is_registered(task) {
            self.scheduler.update_job(task, cron)?;
        }
        let mut config = self.config.write().unwrap_or_else(PoisonError::into_inner);
        match task {
            RULE_HANDLER => config.rules.cron = cron.trim().to_string(),
            _ => config.collections.cron = cron.trim().to_string(),
        }
        Ok(())
    }

    pub fn stop_execution(&self, task: &str) -> Result<bool> {
        Ok(self.runner(task)?.stop_execution())
    }

    pub async fn task_status(&self, task: &str) -> Result<TaskRunning> {
        self.runner(task)?;
        Ok(self.store.task_status(task).await?)
    }

    /// Ledger rows of both tasks, idle rows included.
    pub async fn task_statuses(&self) -> Result<Vec<TaskRunning>> {
        let mut statuses = Vec::with_capacity(TASK_NAMES.len());
        for name in TASK_NAMES {
            statuses.push(self.store.task_status(name).await?);
        }
        Ok(statuses)
    }

    /// Clear a stuck `running` ledger row.
    ///
    /// Refused while this process is running the task.
    pub async fn reset_task(&self, task: &str) -> Result<TaskRunning> {
        let runner = self.runner(task)?;
        if runner.is_active() {
            return Err(TaskError::Busy(task.to_string()));
        }
        let before = self.store.task_status(task).await?;
        self.store.finish_task(task).await?;
        if before.running {
            warn!(task, since = ?before.running_since, "task ledger reset by operator");
        }
        Ok(before)
    }

    /// Rebuild components from `config`. Runs in progress finish with the
    /// settings they started with.
    pub fn reconfigure(&self, config: Config) -> Result<()> {
        parse_schedule(&config.rules.cron)?;
        parse_schedule(&config.collections.cron)?;

        self.rule_job
            .replace_handler(Self::build_handler(&config, &self.providers, &self.clock));
        let stale_after = config.tasks.stale_after();
        self.rule_runner.set_stale_after(stale_after);
        self.collection_runner.set_stale_after(stale_after);

        for (task, cron) in [
            (RULE_HANDLER, config.rules.cron.as_str()),
            (COLLECTION_HANDLER, config.collections.cron.as_str()),
        ] {
            if self.scheduler.is_registered(task) {
                self.scheduler.update_job(task, cron)?;
            }
        }
        info!(profile = config.profile_label(), "engine reconfigured");
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    /// Evaluate one rule group against one item with a per-rule trace.
    pub async fn test_media(&self, rule_group_id: i64, media_id: &str) -> Result<MediaTestResult> {
        let group = self
            .store
            .rule_group(rule_group_id)
            .await?
            .ok_or_else(|| TaskError::NotFound {
                kind: "rule group",
                id: rule_group_id.to_string(),
            })?;
        let collection = match group.collection_id {
            Some(id) => self.store.collection(id).await?,
            None => None,
        };
        Ok(self
            .rule_job
            .handler()
            .test_media(&group, collection.as_ref(), media_id)
            .await?)
    }

    /// Validate and store a rule group from its YAML form. With
    /// `with_collection`, a collection named after the group is created and
    /// linked.
    pub async fn import_group(&self, yaml: &str, with_collection: bool) -> Result<RuleGroup> {
        let document = RuleGroupDocument::from_yaml(yaml)?;
        let validation = validate_document(&document);
        if !validation.valid {
            return Err(RuleError::Validation(validation.summary()).into());
        }
        self.save_group(document.into_group()?, with_collection).await
    }

    /// Store an already validated rule group, e.g. one read by a
    /// [`RuleLoader`](culler_rules::RuleLoader).
    pub async fn save_group(&self, mut group: RuleGroup, with_collection: bool) -> Result<RuleGroup> {
        if with_collection {
            let mut collection = Collection::new(&group.name, &group.library_id, group.data_type);
            collection.description = group.description.clone();
            let collection = self.store.save_collection(collection).await?;
            group.collection_id = Some(collection.id);
        }
        let group = self.store.save_rule_group(group).await?;
        info!(rule_group_id = group.id, rule_group = %group.name, rules = group.rules.len(), "rule group imported");
        Ok(group)
    }

    /// YAML form of a stored rule group.
    pub async fn export_group(&self, rule_group_id: i64) -> Result<String> {
        let group = self
            .store
            .rule_group(rule_group_id)
            .await?
            .ok_or_else(|| TaskError::NotFound {
                kind: "rule group",
                id: rule_group_id.to_string(),
            })?;
        Ok(RuleGroupDocument::from_group(&group).to_yaml()?)
    }

    /// Upcoming fire times of a task, from the live schedule when it is
    /// registered and from config otherwise.
    pub fn next_runs(&self, task: &str, count: usize) -> Result<Vec<DateTime<Utc>>> {
        self.runner(task)?;
        if self.scheduler.is_registered(task) {
            return self.scheduler.next_runs(task, count);
        }
        upcoming(&self.cron_for(task), self.clock.now(), count)
    }

    pub fn cron_for(&self, task: &str) -> String {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        match task {
            RULE_HANDLER => config.rules.cron.clone(),
            _ => config.collections.cron.clone(),
        }
    }

    pub fn config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reconciler(&self) -> &Arc<CollectionReconciler> {
        &self.reconciler
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn runner(&self, task: &str) -> Result<&Arc<TaskRunner>> {
        match task {
            RULE_HANDLER => Ok(&self.rule_runner),
            COLLECTION_HANDLER => Ok(&self.collection_runner),
            other => Err(TaskError::UnknownTask(other.to_string())),
        }
    }

    /// Stop both jobs and wait for in-flight runs, scheduled or manual.
    pub async fn shutdown(&self) {
        self.rule_runner.stop_execution();
        self.collection_runner.stop_execution();
        self.scheduler.shutdown().await;

        let poll = self.config().tasks.shutdown_poll();
        for runner in [&self.rule_runner, &self.collection_runner] {
            while runner.is_active() {
                tokio::time::sleep(poll).await;
            }
        }
        info!("engine stopped");
    }
}
