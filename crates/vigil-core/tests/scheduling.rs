//! Priority admission and the concurrency limit, in batch and dispatcher mode.

use std::sync::Arc;
use std::time::Duration;

use vigil_core::fakes::ScriptedAnalyzer;
use vigil_core::{
    AnalyzerKind, ContextOverrides, Engine, EngineConfig, EventKind, EventStream, ExecutionId,
    FsBackupStore, PipelineSpec, Rule,
};

fn build(limit: usize, analyzer: Arc<ScriptedAnalyzer>, dir: &tempfile::TempDir) -> Engine {
    let config = EngineConfig {
        max_concurrent_rules: limit,
        ..EngineConfig::default()
    };
    Engine::builder(config)
        .analyzer(analyzer)
        .backup_store(Arc::new(FsBackupStore::new(dir.path())))
        .build()
        .expect("engine builds")
}

fn request_with_priorities(engine: &Engine, priorities: &[i32]) -> Vec<ExecutionId> {
    priorities
        .iter()
        .enumerate()
        .map(|(i, priority)| {
            let pipeline = engine
                .register_pipeline(
                    PipelineSpec::new(
                        format!("p{i}"),
                        vec![Rule::new(format!("r{i}"), AnalyzerKind::Performance)],
                    )
                    .with_priority(*priority),
                )
                .unwrap();
            engine
                .request_execution(pipeline, ContextOverrides::default())
                .unwrap()
        })
        .collect()
}

/// `(execution id, priority)` of every start event, in publish order.
fn started(events: &mut EventStream) -> Vec<(ExecutionId, i32)> {
    events
        .drain()
        .into_iter()
        .filter_map(|e| match e.kind {
            EventKind::ExecutionStarted { execution } => Some((execution.id, execution.priority)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_mixed_priorities_start_highest_first_with_fifo_ties() {
    let dir = tempfile::tempdir().unwrap();
    let engine = build(
        2,
        Arc::new(ScriptedAnalyzer::new(AnalyzerKind::Performance)),
        &dir,
    );
    let mut events = engine.subscribe();

    let ids = request_with_priorities(&engine, &[5, 1, 5, 3, 1]);
    engine.run_until_idle().await;

    let starts = started(&mut events);
    let priorities: Vec<i32> = starts.iter().map(|(_, p)| *p).collect();
    assert_eq!(priorities, vec![5, 5, 3, 1, 1]);

    let order: Vec<ExecutionId> = starts.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, vec![ids[0], ids[2], ids[3], ids[1], ids[4]]);
}

#[tokio::test]
async fn test_limit_one_starts_in_non_increasing_priority() {
    let dir = tempfile::tempdir().unwrap();
    let engine = build(
        1,
        Arc::new(ScriptedAnalyzer::new(AnalyzerKind::Performance)),
        &dir,
    );
    let mut events = engine.subscribe();

    let ids = request_with_priorities(&engine, &[2, 9, 2, 0, 9]);
    assert_eq!(engine.drain().await, 1);
    engine.run_until_idle().await;

    let order: Vec<ExecutionId> = started(&mut events).into_iter().map(|(id, _)| id).collect();
    assert_eq!(order, vec![ids[1], ids[4], ids[0], ids[2], ids[3]]);
}

#[tokio::test]
async fn test_batch_drain_never_exceeds_limit() {
    let dir = tempfile::tempdir().unwrap();
    let analyzer =
        Arc::new(ScriptedAnalyzer::new(AnalyzerKind::Performance).with_delay(Duration::from_millis(10)));
    let engine = build(3, analyzer.clone(), &dir);

    request_with_priorities(&engine, &[0; 10]);
    let first = engine.drain().await;
    assert_eq!(first, 3);
    assert_eq!(engine.queue_len(), 7);
    engine.run_until_idle().await;

    assert_eq!(analyzer.peak_concurrency(), 3);
    assert_eq!(engine.running_count(), 0);
    assert_eq!(engine.stats().total_executions, 10);
}

#[tokio::test]
async fn test_concurrent_drains_do_not_double_admit() {
    let dir = tempfile::tempdir().unwrap();
    let analyzer =
        Arc::new(ScriptedAnalyzer::new(AnalyzerKind::Performance).with_delay(Duration::from_millis(20)));
    let engine = build(2, analyzer.clone(), &dir);

    request_with_priorities(&engine, &[1; 6]);
    let (a, b) = tokio::join!(engine.drain(), engine.drain());

    assert_eq!(a + b, 2, "the second drain must be a no-op");
    assert!(analyzer.peak_concurrency() <= 2);
}

#[tokio::test]
async fn test_dispatcher_refills_slots_and_respects_limit() {
    let dir = tempfile::tempdir().unwrap();
    let analyzer =
        Arc::new(ScriptedAnalyzer::new(AnalyzerKind::Performance).with_delay(Duration::from_millis(15)));
    let engine = build(2, analyzer.clone(), &dir);
    let mut events = engine.subscribe();

    let dispatcher = engine.start_dispatcher();
    let ids = request_with_priorities(&engine, &[0, 0, 0, 0, 0, 0]);

    let mut completed = 0;
    tokio::time::timeout(Duration::from_secs(10), async {
        while completed < ids.len() {
            let event = events.recv().await.expect("bus open");
            match event.kind {
                EventKind::ExecutionStarted { .. } => {
                    assert!(engine.running_count() <= 2);
                }
                EventKind::ExecutionCompleted { .. } => completed += 1,
                _ => {}
            }
        }
    })
    .await
    .expect("dispatcher finishes every execution");
    dispatcher.shutdown().await;

    assert_eq!(analyzer.peak_concurrency(), 2);
    assert!(engine
        .executions()
        .iter()
        .all(|e| e.status == vigil_core::ExecutionStatus::Completed));
}

#[tokio::test]
async fn test_dispatcher_picks_up_work_enqueued_later() {
    let dir = tempfile::tempdir().unwrap();
    let engine = build(
        1,
        Arc::new(ScriptedAnalyzer::new(AnalyzerKind::Performance)),
        &dir,
    );
    let mut events = engine.subscribe();
    let dispatcher = engine.start_dispatcher();

    tokio::task::yield_now().await;
    let ids = request_with_priorities(&engine, &[4]);

    let finished = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(event) = events.recv().await {
                if let EventKind::ExecutionCompleted { execution } = event.kind {
                    return execution.id;
                }
            }
        }
    })
    .await
    .expect("execution completes without a manual drain");
    assert_eq!(finished, ids[0]);

    dispatcher.shutdown().await;
}
