//! Engine facade: registration, queueing, dispatch and observation.
//!
//! Two ways to run queued executions share one admission path:
//!
//! - [`Engine::drain`] admits up to `limit - running` executions, runs them
//!   concurrently and waits for the whole batch. Concurrent calls are no-ops.
//! - [`Engine::start_dispatcher`] spawns a task that admits whenever an
//!   execution is enqueued or settles, so freed slots are refilled immediately.
//!
//! Admission pops from the queue and bumps the running count under the queue's
//! lock, and `execution:started` is published by the admitting task before the
//! body is spawned. Start order therefore equals admission order.

use std::sync::{Arc, PoisonError, RwLock};

use futures::future::join_all;
use tokio::sync::{watch, Notify};
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

use crate::analyzer::{Analyzer, AnalyzerRegistry};
use crate::config::EngineConfig;
use crate::domain::{
    AnalysisReport, ContextOverrides, Execution, ExecutionId, ExecutionStatus, Pipeline,
    PipelineId, PipelineSpec,
};
use crate::error::{EngineError, ExecutionError, Result};
use crate::events::{EventBus, EventKind, EventStream};
use crate::history::ExecutionHistory;
use crate::metrics::METRICS;
use crate::obs;
use crate::queue::ExecutionQueue;
use crate::registry::PipelineRegistry;
use crate::remediation::{
    BackupRecord, BackupStore, FileModificationHandler, FsBackupStore, HandlerSet,
    RemediationCoordinator, RemediationHandler,
};
use crate::runner::ExecutionRunner;
use crate::scheduler::PipelineScheduler;
use crate::stats::{ExecutionStats, StatsTracker};

/// Builder for [`Engine`].
pub struct EngineBuilder {
    config: EngineConfig,
    analyzers: AnalyzerRegistry,
    handlers: HandlerSet,
    backups: Option<Arc<dyn BackupStore>>,
    scheduler: Option<Arc<dyn PipelineScheduler>>,
    events: Arc<EventBus>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            analyzers: AnalyzerRegistry::new(),
            handlers: HandlerSet::new().with(Arc::new(FileModificationHandler::new())),
            backups: None,
            scheduler: None,
            events: Arc::new(EventBus::new()),
        }
    }

    pub fn analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzers.register(analyzer);
        self
    }

    /// Replaces the built-in handler for the same kind, if any.
    pub fn handler(mut self, handler: Arc<dyn RemediationHandler>) -> Self {
        self.handlers.register(handler);
        self
    }

    /// Defaults to an [`FsBackupStore`] rooted at `config.backup_dir`.
    pub fn backup_store(mut self, store: Arc<dyn BackupStore>) -> Self {
        self.backups = Some(store);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn PipelineScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Subscribe before `build` to observe `guardians:initialized`.
    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn build(self) -> Result<Engine> {
        self.config.validate()?;

        let stats = Arc::new(StatsTracker::new());
        let backups = self
            .backups
            .unwrap_or_else(|| Arc::new(FsBackupStore::new(self.config.backup_dir.clone())));
        let remediation = Arc::new(RemediationCoordinator::new(
            self.handlers,
            backups,
            stats.clone(),
            self.events.clone(),
        ));
        let runner = ExecutionRunner::new(self.analyzers.clone(), remediation.clone());

        let kinds: Vec<_> = self
            .analyzers
            .kinds()
            .into_iter()
            .filter(|k| self.config.is_enabled(*k))
            .collect();
        tracing::info!(analyzers = ?kinds, "engine initialized");
        self.events
            .publish(EventKind::AnalyzersInitialized { analyzers: kinds });

        Ok(Engine {
            inner: Arc::new(Inner {
                config: RwLock::new(Arc::new(self.config)),
                analyzers: self.analyzers,
                pipelines: PipelineRegistry::new(),
                queue: ExecutionQueue::new(),
                runner,
                remediation,
                stats,
                events: self.events,
                scheduler: self.scheduler,
                history: RwLock::new(ExecutionHistory::new()),
                wake: Notify::new(),
                settled: Notify::new(),
            }),
        })
    }
}

struct Inner {
    config: RwLock<Arc<EngineConfig>>,
    analyzers: AnalyzerRegistry,
    pipelines: PipelineRegistry,
    queue: ExecutionQueue,
    runner: ExecutionRunner,
    remediation: Arc<RemediationCoordinator>,
    stats: Arc<StatsTracker>,
    events: Arc<EventBus>,
    scheduler: Option<Arc<dyn PipelineScheduler>>,
    history: RwLock<ExecutionHistory>,
    /// Wakes the dispatcher: enqueue, settle, config change.
    wake: Notify,
    /// Broadcast whenever an execution or a drain batch settles.
    settled: Notify,
}

/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

/// An execution popped from the queue whose pipeline still exists.
struct Admitted {
    pipeline: Pipeline,
    execution: Execution,
    config: Arc<EngineConfig>,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    // -- pipelines ----------------------------------------------------------

    /// Validate and store a pipeline, handing its schedule to the scheduler.
    pub fn register_pipeline(&self, spec: PipelineSpec) -> Result<PipelineId> {
        let config = self.config();
        let pipeline =
            self.inner
                .pipelines
                .register(spec, &self.inner.analyzers, &config.enabled_analyzers)?;
        obs::emit_pipeline_registered(pipeline.id, &pipeline.name, pipeline.rules.len());

        if let (Some(scheduler), Some(expression)) = (&self.inner.scheduler, &pipeline.schedule) {
            scheduler.schedule(&pipeline, expression);
        }

        let id = pipeline.id;
        self.inner.events.publish(EventKind::PipelineCreated {
            pipeline: Box::new(pipeline),
        });
        Ok(id)
    }

    pub fn pause_pipeline(&self, id: PipelineId) -> bool {
        let changed = self.inner.pipelines.pause(id);
        if changed {
            self.inner
                .events
                .publish(EventKind::PipelinePaused { pipeline_id: id });
        }
        changed
    }

    pub fn resume_pipeline(&self, id: PipelineId) -> bool {
        let changed = self.inner.pipelines.resume(id);
        if changed {
            self.inner
                .events
                .publish(EventKind::PipelineResumed { pipeline_id: id });
        }
        changed
    }

    /// Remove a pipeline. Its past executions stay in the history.
    pub fn delete_pipeline(&self, id: PipelineId) -> bool {
        let Some(pipeline) = self.inner.pipelines.delete(id) else {
            return false;
        };
        if pipeline.schedule.is_some() {
            if let Some(scheduler) = &self.inner.scheduler {
                scheduler.unschedule(id);
            }
        }
        self.inner
            .events
            .publish(EventKind::PipelineDeleted { pipeline_id: id });
        true
    }

    pub fn pipeline(&self, id: PipelineId) -> Option<Pipeline> {
        self.inner.pipelines.get(id)
    }

    /// Snapshot ordered by priority, highest first.
    pub fn list_pipelines(&self) -> Vec<Pipeline> {
        self.inner.pipelines.list()
    }

    // -- executions ---------------------------------------------------------

    /// Queue a run of an enabled pipeline. Caller overrides win over the
    /// pipeline's own context.
    pub fn request_execution(
        &self,
        pipeline_id: PipelineId,
        overrides: ContextOverrides,
    ) -> Result<ExecutionId> {
        let pipeline = self
            .inner
            .pipelines
            .get(pipeline_id)
            .ok_or(EngineError::PipelineNotFound(pipeline_id))?;
        if !pipeline.enabled {
            return Err(EngineError::PipelineDisabled(pipeline_id));
        }

        let execution = Execution::new(
            pipeline_id,
            pipeline.priority,
            pipeline.context.merged(overrides),
        );
        let execution_id = execution.id;
        self.record(&execution);

        let queue_position = self.inner.queue.enqueue(execution);
        obs::emit_execution_queued(execution_id, pipeline_id, queue_position);
        self.inner.events.publish(EventKind::ExecutionQueued {
            execution_id,
            pipeline_id,
            queue_position,
        });
        self.inner.wake.notify_one();
        Ok(execution_id)
    }

    /// Queue every enabled pipeline at or above `critical_priority`, highest
    /// priority first.
    pub fn trigger_critical(&self) -> Vec<ExecutionId> {
        let threshold = self.config().critical_priority;
        let pipelines = self
            .list_pipelines()
            .into_iter()
            .filter(|p| p.enabled && p.priority >= threshold);
        self.request_each(pipelines, "critical")
    }

    /// Queue every enabled pipeline that runs an analyzer the report flags:
    /// architecture below [`AnalysisReport::SCORE_FLOOR`], philosophy below
    /// [`AnalysisReport::ALIGNMENT_FLOOR`]. Each pipeline is queued at most
    /// once. Nothing happens while `adaptive_scheduling` is off.
    pub fn trigger_adaptive(&self, report: &AnalysisReport) -> Vec<ExecutionId> {
        if !self.config().adaptive_scheduling {
            tracing::debug!("adaptive scheduling disabled, report ignored");
            return Vec::new();
        }
        let weak = report.weak_kinds();
        let pipelines = self
            .list_pipelines()
            .into_iter()
            .filter(|p| p.enabled && p.analyzers.iter().any(|k| weak.contains(k)));
        self.request_each(pipelines, "adaptive")
    }

    fn request_each(
        &self,
        pipelines: impl Iterator<Item = Pipeline>,
        trigger: &'static str,
    ) -> Vec<ExecutionId> {
        pipelines
            .filter_map(|p| {
                match self.request_execution(p.id, ContextOverrides::default()) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        tracing::warn!(pipeline_id = %p.id, trigger, error = %e, "trigger skipped");
                        None
                    }
                }
            })
            .collect()
    }

    /// Run one batch. Returns how many executions were taken off the queue,
    /// 0 when another drain is in progress or no slot is free.
    ///
    /// Each execution runs in its own task, so dropping this future stops the
    /// wait but not the executions; they still settle and free their slots.
    pub async fn drain(&self) -> usize {
        let Some(_guard) = self.inner.queue.try_begin_drain() else {
            return 0;
        };
        let (taken, batch) = self.admit();
        let tasks: Vec<_> = batch
            .into_iter()
            .map(|admitted| tokio::spawn(self.clone().run(admitted)))
            .collect();
        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "execution task ended abnormally");
            }
        }
        self.inner.settled.notify_waiters();
        taken
    }

    /// Drain until nothing is queued or running.
    pub async fn run_until_idle(&self) {
        loop {
            let settled = self.inner.settled.notified();
            if self.inner.queue.is_empty() && self.inner.queue.running() == 0 {
                return;
            }
            if self.drain().await == 0 {
                settled.await;
            }
        }
    }

    /// Spawn the replenishing dispatcher. Requires a tokio runtime.
    pub fn start_dispatcher(&self) -> DispatcherHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let engine = self.clone();
        let task = tokio::spawn(async move {
            loop {
                let (_, batch) = engine.admit();
                for admitted in batch {
                    tokio::spawn(engine.clone().run(admitted));
                }
                tokio::select! {
                    _ = engine.inner.wake.notified() => {}
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("dispatcher stopped");
        });
        DispatcherHandle { shutdown, task }
    }

    /// `None` for unknown ids and for finished executions evicted past
    /// `history_limit`.
    pub fn execution(&self, id: ExecutionId) -> Option<Execution> {
        self.inner
            .history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
    }

    /// Every kept execution, in request order.
    pub fn executions(&self) -> Vec<Execution> {
        self.inner
            .history
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ordered()
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn running_count(&self) -> usize {
        self.inner.queue.running()
    }

    pub fn stats(&self) -> ExecutionStats {
        self.inner.stats.snapshot()
    }

    /// Restore a file from a backup taken before a remediation.
    pub fn rollback(&self, backup_ref: &str) -> Result<BackupRecord> {
        Ok(self.inner.remediation.rollback(backup_ref)?)
    }

    // -- config & events ----------------------------------------------------

    pub fn config(&self) -> Arc<EngineConfig> {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validate and swap the config. Running executions keep their snapshot.
    pub fn update_config(&self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        *self
            .inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(config.clone());
        self.inner.events.publish(EventKind::ConfigUpdated {
            config: Box::new(config),
        });
        self.inner.wake.notify_one();
        Ok(())
    }

    pub fn subscribe(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    // -- internals ----------------------------------------------------------

    fn record(&self, execution: &Execution) {
        let limit = self.config().history_limit;
        self.inner
            .history
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .record(execution, limit);
    }

    /// Pop what fits under the limit and start it. Executions whose pipeline
    /// was deleted while queued settle here as failed.
    fn admit(&self) -> (usize, Vec<Admitted>) {
        let config = self.config();
        let popped = self.inner.queue.admit(config.max_concurrent_rules);
        let taken = popped.len();

        let mut batch = Vec::with_capacity(taken);
        for mut execution in popped {
            let _span = obs::ExecutionSpan::enter(execution.id, execution.pipeline_id);
            execution.mark_running();

            let Some(pipeline) = self.inner.pipelines.get(execution.pipeline_id) else {
                execution.fail(ExecutionError::PipelineNotFound(execution.pipeline_id));
                self.settle(execution);
                continue;
            };

            METRICS.inc_executions_started();
            obs::emit_execution_started(execution.id, pipeline.id, execution.priority);
            self.record(&execution);
            self.inner.events.publish(EventKind::ExecutionStarted {
                execution: Box::new(execution.clone()),
            });
            batch.push(Admitted {
                pipeline,
                execution,
                config: config.clone(),
            });
        }
        (taken, batch)
    }

    /// Execution body. Runs in its own task so a panic fails only this execution.
    async fn run(self, admitted: Admitted) {
        let Admitted {
            pipeline,
            execution,
            config,
        } = admitted;
        let fallback = execution.clone();
        let span = obs::execution_span(execution.id, pipeline.id);

        let engine = self.clone();
        let body = tokio::spawn(
            async move {
                let mut execution = execution;
                engine
                    .inner
                    .runner
                    .run(&pipeline, &mut execution, &config)
                    .await;
                execution
            }
            .instrument(span),
        );

        let execution = match body.await {
            Ok(execution) => execution,
            Err(e) => {
                let mut execution = fallback;
                execution.fail(join_failure(e));
                execution
            }
        };
        self.settle(execution);
    }

    /// Record a terminal execution, publish its outcome and free its slot.
    fn settle(&self, execution: Execution) {
        let completed = execution.status == ExecutionStatus::Completed;
        obs::emit_execution_finished(
            execution.id,
            execution.duration_ms(),
            execution.results.len(),
            execution.final_score,
            completed,
        );
        if !completed {
            METRICS.inc_executions_failed();
        }
        self.inner.stats.record_execution(&execution);
        self.record(&execution);

        let event = if completed {
            EventKind::ExecutionCompleted {
                execution: Box::new(execution),
            }
        } else {
            let error = execution.error.clone().unwrap_or_default();
            EventKind::ExecutionFailed {
                execution: Box::new(execution),
                error,
            }
        };
        self.inner.events.publish(event);

        self.inner.queue.finish();
        self.inner.wake.notify_one();
        self.inner.settled.notify_waiters();
    }
}

fn join_failure(err: JoinError) -> ExecutionError {
    if !err.is_panic() {
        return ExecutionError::Cancelled;
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    ExecutionError::Panicked(message)
}

/// Handle to a running dispatcher.
pub struct DispatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Stop admitting new executions. Executions already started run to the end.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "dispatcher task ended abnormally");
        }
    }
}
