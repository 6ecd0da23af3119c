// tests/worker_pool.rs

use std::sync::Arc;
use std::time::Duration;

use libpack::build::{BuildPipeline, BuildRequest};
use libpack::engine::RuntimeEvent;
use libpack::errors::LibpackError;
use libpack::fs::{FileSystem, RealFileSystem};
use libpack::types::BuildTarget;
use libpack::worker::{SlotState, WorkerExit, WorkerMessage, WorkerMessageKind, WorkerPool};
use libpack_test_utils::builders::TempProject;
use libpack_test_utils::fake_transform::FakeTransform;
use libpack_test_utils::{init_tracing, with_timeout};
use tokio::sync::mpsc;

const OLD: &str = "export const a = 1;\n";
const NEW: &str = "export const a = 2;\n";

fn project() -> TempProject {
    let project = TempProject::new();
    project.write("src/a.ts", OLD);
    project.write("src/b.ts", "export const b = 1;\n");
    project.write("src/c.ts", "export const c = 1;\n");
    project
}

fn pool(
    project: &TempProject,
    transform: &FakeTransform,
) -> (WorkerPool, mpsc::Receiver<RuntimeEvent>) {
    let cfg = project.config().targets(&[BuildTarget::Esm]).build();
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let pipeline = BuildPipeline::new(Arc::new(cfg), fs, Arc::new(transform.clone()));
    let (tx, rx) = mpsc::channel(256);
    (WorkerPool::new(pipeline, tx).unwrap(), rx)
}

/// Next message the pool accepts; stale ones are dropped on the way.
async fn next_accepted(pool: &mut WorkerPool, rx: &mut mpsc::Receiver<RuntimeEvent>) -> WorkerMessage {
    with_timeout(async {
        loop {
            match rx.recv().await {
                Some(RuntimeEvent::Worker { slot, msg }) => {
                    if pool.observe(slot, &msg) {
                        return msg;
                    }
                }
                Some(RuntimeEvent::WorkerExited { slot, exit }) => {
                    panic!("worker {slot} exited: {exit:?}");
                }
                Some(other) => panic!("unexpected event {other:?}"),
                None => panic!("runtime channel closed"),
            }
        }
    })
    .await
}

#[tokio::test(flavor = "multi_thread")]
async fn build_runs_on_the_active_slot() {
    init_tracing();
    let project = project();
    let transform = FakeTransform::new();
    let (mut pool, mut rx) = pool(&project, &transform);

    assert!(pool.is_ready());
    pool.run(BuildRequest::new(1)).unwrap();
    assert!(pool.is_running());

    let started = next_accepted(&mut pool, &mut rx).await;
    assert_eq!(
        started,
        WorkerMessage::new(
            1,
            WorkerMessageKind::Started {
                targets: vec![BuildTarget::Esm],
                total: 3,
            }
        )
    );

    let done = loop {
        let msg = next_accepted(&mut pool, &mut rx).await;
        if msg.kind.is_terminal() {
            break msg;
        }
    };
    assert!(matches!(done.kind, WorkerMessageKind::Completed { files: 3, .. }));
    assert!(pool.is_ready());
    assert_eq!(
        project.read("dist/a.js"),
        FakeTransform::expected_code(OLD, BuildTarget::Esm)
    );

    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn busy_pool_rejects_a_second_build() {
    init_tracing();
    let project = project();
    let transform = FakeTransform::new().with_delay(Duration::from_millis(200));
    let (mut pool, _rx) = pool(&project, &transform);

    pool.run(BuildRequest::new(1)).unwrap();
    let err = pool.run(BuildRequest::new(2)).unwrap_err();
    assert!(matches!(err, LibpackError::WorkerError(_)), "got {err:?}");

    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn terminating_an_idle_pool_keeps_its_slots() {
    init_tracing();
    let project = project();
    let (mut pool, _rx) = pool(&project, &FakeTransform::new());

    pool.terminate().await.unwrap();
    assert_eq!((pool.active_id(), pool.next_id()), (1, 2));

    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn superseded_build_never_reports_or_writes_again() {
    init_tracing();
    let project = project();
    let transform = FakeTransform::new().with_delay(Duration::from_millis(150));
    let (mut pool, mut rx) = pool(&project, &transform);

    pool.run(BuildRequest::new(1)).unwrap();
    let started = next_accepted(&mut pool, &mut rx).await;
    assert_eq!(started.generation, 1);

    pool.terminate().await.unwrap();
    assert_eq!((pool.active_id(), pool.next_id()), (2, 3));
    assert!(pool.is_ready());

    project.write("src/a.ts", NEW);
    pool.run(BuildRequest::new(2)).unwrap();

    loop {
        let msg = next_accepted(&mut pool, &mut rx).await;
        assert_eq!(msg.generation, 2, "stale message accepted: {msg:?}");
        if msg.kind.is_terminal() {
            assert!(matches!(msg.kind, WorkerMessageKind::Completed { files: 3, .. }));
            break;
        }
    }

    assert_eq!(
        project.read("dist/a.js"),
        FakeTransform::expected_code(NEW, BuildTarget::Esm)
    );
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn transform_panic_is_reported_not_fatal_to_the_worker() {
    init_tracing();
    let project = project();
    let transform = FakeTransform::new().panicking_on("b.ts");
    let (mut pool, mut rx) = pool(&project, &transform);

    pool.run(BuildRequest::new(1)).unwrap();
    let failed = loop {
        let msg = next_accepted(&mut pool, &mut rx).await;
        if msg.kind.is_terminal() {
            break msg;
        }
    };
    match failed.kind {
        WorkerMessageKind::Error { message, fatal, .. } => {
            assert!(message.contains("panicked"), "got {message}");
            assert!(!fatal);
        }
        other => panic!("expected an error, got {other:?}"),
    }

    // Same worker, next build.
    assert_eq!(pool.active_id(), 1);
    assert!(pool.is_ready());
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn dead_active_slot_is_replaced_by_terminate() {
    init_tracing();
    let project = project();
    let (mut pool, mut rx) = pool(&project, &FakeTransform::new());

    let detail = pool
        .handle_exit(1, &WorkerExit::Abnormal("worker panicked: boom".into()))
        .unwrap();
    assert_eq!(detail.as_deref(), Some("worker panicked: boom"));
    assert_eq!(pool.active_state(), SlotState::Dead);
    assert!(!pool.is_ready());

    pool.terminate().await.unwrap();
    assert_eq!(pool.active_id(), 2);

    pool.run(BuildRequest::new(1)).unwrap();
    let started = next_accepted(&mut pool, &mut rx).await;
    assert_eq!(started.generation, 1);

    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn dead_standby_slot_is_respawned() {
    init_tracing();
    let project = project();
    let (mut pool, _rx) = pool(&project, &FakeTransform::new());

    let detail = pool.handle_exit(2, &WorkerExit::Clean).unwrap();
    assert_eq!(detail, None);
    assert_eq!(pool.next_id(), 3);
    assert_eq!(pool.active_id(), 1);

    // Unknown slots are ignored.
    assert_eq!(pool.handle_exit(42, &WorkerExit::Clean).unwrap(), None);
    assert!(pool.is_ready());

    pool.shutdown().await;
}
