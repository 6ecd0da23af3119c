// tests/runtime_fake_backend.rs

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use libpack::engine::{CoreRuntime, LifecycleEvent, Runtime, RuntimeEvent};
use libpack::fs::mock::MockFileSystem;
use libpack::types::WatchEvent;
use libpack::watch::ChangeHashCache;
use libpack::worker::{WorkerExit, WorkerMessage, WorkerMessageKind};
use libpack_test_utils::fake_backend::{BackendLog, FakeBackend};
use libpack_test_utils::init_tracing;
use libpack_test_utils::reporter::RecordingReporter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEBOUNCE: Duration = Duration::from_millis(100);

struct Harness {
    tx: mpsc::Sender<RuntimeEvent>,
    log: Arc<Mutex<BackendLog>>,
    reporter: RecordingReporter,
    fs: MockFileSystem,
    handle: JoinHandle<libpack::errors::Result<i32>>,
}

impl Harness {
    fn start(auto_files: Option<u64>, prime: &[&str]) -> Self {
        init_tracing();
        let (tx, rx) = mpsc::channel(64);
        let log = Arc::new(Mutex::new(BackendLog::default()));
        let backend = match auto_files {
            Some(files) => FakeBackend::auto_completing(tx.clone(), Arc::clone(&log), files),
            None => FakeBackend::manual(tx.clone(), Arc::clone(&log)),
        };

        let fs = MockFileSystem::new();
        fs.add_file("src/a.ts", "export const a = 1;");
        fs.add_file("src/b.ts", "export const b = 1;");
        let mut hashes = ChangeHashCache::new(Arc::new(fs.clone()));
        hashes.prime(prime.iter().map(|p| PathBuf::from(*p)));

        let reporter = RecordingReporter::new();
        let runtime = Runtime::new(
            CoreRuntime::new(Vec::new()),
            rx,
            tx.clone(),
            backend,
            hashes,
            DEBOUNCE,
            Box::new(reporter.clone()),
        );
        let handle = tokio::spawn(runtime.run());

        Self {
            tx,
            log,
            reporter,
            fs,
            handle,
        }
    }

    async fn send(&self, event: RuntimeEvent) {
        self.tx.send(event).await.unwrap();
        settle().await;
    }

    async fn worker(&self, slot: u64, generation: u64, kind: WorkerMessageKind) {
        self.send(RuntimeEvent::Worker {
            slot,
            msg: WorkerMessage::new(generation, kind),
        })
        .await;
    }

    fn log(&self) -> BackendLog {
        self.log.lock().unwrap().clone()
    }

    async fn shutdown(self) -> i32 {
        let _ = self.tx.send(RuntimeEvent::ShutdownRequested).await;
        let code = self.handle.await.unwrap().unwrap();
        assert!(self.log.lock().unwrap().shutdown);
        code
    }
}

/// Let spawned tasks drain without crossing a debounce window.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn generations(log: &BackendLog) -> Vec<u64> {
    log.requests.iter().map(|r| r.generation).collect()
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_builds_once() {
    let h = Harness::start(Some(2), &[]);

    h.send(RuntimeEvent::FsChanged(WatchEvent::modified("src/a.ts"))).await;
    h.fs.add_file("src/a.ts", "export const a = 2;");
    h.send(RuntimeEvent::FsChanged(WatchEvent::modified("src/a.ts"))).await;
    h.send(RuntimeEvent::FsChanged(WatchEvent::modified("src/b.ts"))).await;
    assert!(h.log().requests.is_empty());

    tokio::time::sleep(DEBOUNCE * 3).await;

    assert_eq!(generations(&h.log()), vec![1]);
    assert_eq!(h.reporter.started(), vec![1]);
    assert_eq!(h.reporter.completed(), vec![1]);
    assert_eq!(h.reporter.progress().last(), Some(&2));
    assert_eq!(h.shutdown().await, 0);
}

#[tokio::test(start_paused = true)]
async fn unchanged_content_never_triggers() {
    let h = Harness::start(Some(2), &["src/a.ts"]);

    h.send(RuntimeEvent::FsChanged(WatchEvent::modified("src/a.ts"))).await;
    h.send(RuntimeEvent::FsChanged(WatchEvent::added("src/a.ts"))).await;
    tokio::time::sleep(DEBOUNCE * 3).await;

    assert!(h.log().requests.is_empty());
    assert!(h.reporter.events().is_empty());
    assert_eq!(h.shutdown().await, 0);
}

#[tokio::test(start_paused = true)]
async fn deleted_files_reach_the_next_request() {
    let h = Harness::start(Some(1), &["src/a.ts", "src/b.ts"]);

    h.fs.remove("src/b.ts");
    h.send(RuntimeEvent::FsChanged(WatchEvent::removed("src/b.ts"))).await;
    h.fs.add_file("src/a.ts", "changed");
    h.send(RuntimeEvent::FsChanged(WatchEvent::modified("src/a.ts"))).await;
    tokio::time::sleep(DEBOUNCE * 3).await;

    let log = h.log();
    assert_eq!(log.requests.len(), 1);
    assert_eq!(log.requests[0].removed.len(), 1);
    assert!(log.requests[0].removed[0].path.ends_with("b.ts"));
    assert_eq!(h.shutdown().await, 0);
}

#[tokio::test(start_paused = true)]
async fn superseded_build_is_terminated_and_its_messages_ignored() {
    let h = Harness::start(None, &[]);

    h.send(RuntimeEvent::Trigger(WatchEvent::modified("src/a.ts"))).await;
    h.worker(
        1,
        1,
        WorkerMessageKind::Started {
            targets: vec![libpack::types::BuildTarget::Esm],
            total: 5,
        },
    )
    .await;

    h.send(RuntimeEvent::Trigger(WatchEvent::modified("src/b.ts"))).await;
    let log = h.log();
    assert_eq!(generations(&log), vec![1, 2]);
    assert_eq!(log.terminations, 1);

    // Late completion from the old slot.
    h.worker(
        1,
        1,
        WorkerMessageKind::Completed {
            files: 5,
            elapsed: Duration::from_millis(3),
        },
    )
    .await;
    assert!(h.reporter.completed().is_empty());

    h.worker(
        2,
        2,
        WorkerMessageKind::Completed {
            files: 5,
            elapsed: Duration::from_millis(3),
        },
    )
    .await;

    assert_eq!(h.reporter.completed(), vec![2]);
    assert!(h
        .reporter
        .events()
        .contains(&LifecycleEvent::Cancelled { generation: 1 }));
    assert_eq!(h.shutdown().await, 0);
}

#[tokio::test(start_paused = true)]
async fn crashed_worker_is_replaced_on_the_next_build() {
    let h = Harness::start(None, &[]);

    h.send(RuntimeEvent::Trigger(WatchEvent::modified("src/a.ts"))).await;
    h.send(RuntimeEvent::WorkerExited {
        slot: 1,
        exit: WorkerExit::Abnormal("worker panicked: boom".into()),
    })
    .await;

    assert!(h.reporter.events().contains(&LifecycleEvent::Error {
        message: "worker panicked: boom".into(),
        stack: None,
    }));

    // Exits from slots that are no longer active are ignored.
    h.send(RuntimeEvent::WorkerExited {
        slot: 7,
        exit: WorkerExit::Clean,
    })
    .await;
    assert_eq!(h.reporter.events().len(), 1);

    h.send(RuntimeEvent::Trigger(WatchEvent::modified("src/a.ts"))).await;
    let log = h.log();
    assert_eq!(generations(&log), vec![1, 2]);
    assert_eq!(log.terminations, 1);
    assert_eq!(h.shutdown().await, 0);
}

#[tokio::test(start_paused = true)]
async fn fatal_build_error_exits_with_one() {
    let h = Harness::start(None, &[]);

    h.send(RuntimeEvent::Trigger(WatchEvent::modified("src/a.ts"))).await;
    h.worker(
        1,
        1,
        WorkerMessageKind::Error {
            message: "no source files found".into(),
            stack: None,
            fatal: true,
        },
    )
    .await;

    let code = h.handle.await.unwrap().unwrap();
    assert_eq!(code, 1);
    assert!(h.log.lock().unwrap().shutdown);
}
