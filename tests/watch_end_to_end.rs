// tests/watch_end_to_end.rs

use std::sync::Arc;
use std::time::Duration;

use libpack::build::BuildPipeline;
use libpack::config::ConfigFile;
use libpack::engine::{CoreRuntime, LifecycleEvent, Runtime, RuntimeEvent};
use libpack::fs::{FileSystem, RealFileSystem};
use libpack::types::{BuildTarget, WatchEvent};
use libpack::watch::{ChangeHashCache, SourceMatcher};
use libpack::worker::WorkerPool;
use libpack_test_utils::builders::TempProject;
use libpack_test_utils::fake_transform::FakeTransform;
use libpack_test_utils::reporter::RecordingReporter;
use libpack_test_utils::{init_tracing, with_timeout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const A_OLD: &str = "export const a = 1;\n";
const A_NEW: &str = "export const a = 2;\n";
const B: &str = "export const b = 1;\n";

/// The production wiring: real pool, pipeline and hash cache.
struct Watch {
    tx: mpsc::Sender<RuntimeEvent>,
    reporter: RecordingReporter,
    handle: JoinHandle<libpack::errors::Result<i32>>,
}

impl Watch {
    fn start(cfg: ConfigFile, transform: &FakeTransform) -> Self {
        init_tracing();
        let cfg = Arc::new(cfg);
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let (tx, rx) = mpsc::channel(256);

        let pipeline = BuildPipeline::new(Arc::clone(&cfg), Arc::clone(&fs), Arc::new(transform.clone()));
        let pool = WorkerPool::new(pipeline, tx.clone()).unwrap();

        let matcher = SourceMatcher::from_config(&cfg).unwrap();
        let mut hashes = ChangeHashCache::new(Arc::clone(&fs));
        hashes.prime(matcher.collect_sources(fs.as_ref(), &cfg.src_dir).unwrap());

        let reporter = RecordingReporter::new();
        let runtime = Runtime::new(
            CoreRuntime::new(cfg.targets.clone()),
            rx,
            tx.clone(),
            pool,
            hashes,
            cfg.watch.debounce,
            Box::new(reporter.clone()),
        );
        let handle = tokio::spawn(runtime.run());

        Self {
            tx,
            reporter,
            handle,
        }
    }

    async fn send(&self, event: RuntimeEvent) {
        self.tx.send(event).await.unwrap();
    }

    async fn wait_for(&self, what: &str, done: impl Fn(&[LifecycleEvent]) -> bool) {
        with_timeout(async {
            while !done(self.reporter.events().as_slice()) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        tracing::debug!(what, "condition reached");
    }

    async fn shutdown(self) -> i32 {
        self.send(RuntimeEvent::ShutdownRequested).await;
        with_timeout(self.handle).await.unwrap().unwrap()
    }
}

/// Lifecycle events other than progress, in order.
fn transitions(events: &[LifecycleEvent]) -> Vec<LifecycleEvent> {
    events
        .iter()
        .filter(|e| !matches!(e, LifecycleEvent::Progress { .. }))
        .map(|e| match e {
            LifecycleEvent::Completed { generation, .. } => LifecycleEvent::Completed {
                generation: *generation,
                elapsed: Duration::ZERO,
            },
            other => other.clone(),
        })
        .collect()
}

fn completed(generation: u64) -> impl Fn(&[LifecycleEvent]) -> bool {
    move |events: &[LifecycleEvent]| {
        events
            .iter()
            .any(|e| matches!(e, LifecycleEvent::Completed { generation: g, .. } if *g == generation))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn edit_rebuilds_once_and_leaves_other_outputs_alone() {
    let project = TempProject::new();
    project.write("src/a.ts", A_OLD);
    project.write("src/b.ts", B);
    let cfg = project.config().debounce_ms(30).build();
    let watch = Watch::start(cfg.clone(), &FakeTransform::new());

    watch
        .send(RuntimeEvent::Trigger(WatchEvent::dir_added(&cfg.src_dir)))
        .await;
    watch.wait_for("initial build", completed(1)).await;

    let b_esm = project.read("dist/b.js");
    let b_cjs = project.read("dist/cjs/b.js");
    assert_eq!(project.read("dist/a.js"), FakeTransform::expected_code(A_OLD, BuildTarget::Esm));

    let a = project.write("src/a.ts", A_NEW);
    watch.send(RuntimeEvent::FsChanged(WatchEvent::modified(&a))).await;
    watch.send(RuntimeEvent::FsChanged(WatchEvent::modified(&a))).await;
    watch.wait_for("rebuild", completed(2)).await;

    assert_eq!(project.read("dist/a.js"), FakeTransform::expected_code(A_NEW, BuildTarget::Esm));
    assert_eq!(project.read("dist/cjs/a.js"), FakeTransform::expected_code(A_NEW, BuildTarget::Cjs));
    assert_eq!(project.read("dist/b.js"), b_esm);
    assert_eq!(project.read("dist/cjs/b.js"), b_cjs);

    let events = watch.reporter.events();
    assert_eq!(
        transitions(&events),
        vec![
            LifecycleEvent::Started { generation: 1 },
            LifecycleEvent::Completed {
                generation: 1,
                elapsed: Duration::ZERO,
            },
            LifecycleEvent::Started { generation: 2 },
            LifecycleEvent::Completed {
                generation: 2,
                elapsed: Duration::ZERO,
            },
        ]
    );

    // Second build: progress only moves forward and ends at the total.
    let second = events
        .iter()
        .position(|e| *e == LifecycleEvent::Started { generation: 2 })
        .unwrap();
    let progress: Vec<u64> = events[second..]
        .iter()
        .filter_map(|e| match e {
            LifecycleEvent::Progress { completed, .. } => Some(*completed),
            _ => None,
        })
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "got {progress:?}");
    assert_eq!(progress.last(), Some(&2));

    assert_eq!(watch.shutdown().await, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn change_mid_build_cancels_and_restarts() {
    let project = TempProject::new();
    project.write("src/a.ts", A_OLD);
    project.write("src/b.ts", B);
    project.write("src/c.ts", "export const c = 1;\n");
    let cfg = project
        .config()
        .targets(&[BuildTarget::Esm])
        .debounce_ms(20)
        .build();
    let transform = FakeTransform::new().with_delay(Duration::from_millis(150));
    let watch = Watch::start(cfg.clone(), &transform);

    watch
        .send(RuntimeEvent::Trigger(WatchEvent::dir_added(&cfg.src_dir)))
        .await;
    watch
        .wait_for("first build started", |events| {
            events.contains(&LifecycleEvent::Started { generation: 1 })
        })
        .await;

    let a = project.write("src/a.ts", A_NEW);
    watch.send(RuntimeEvent::FsChanged(WatchEvent::modified(&a))).await;
    watch.wait_for("restarted build", completed(2)).await;

    // Let anything the old worker might still say arrive.
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        transitions(&watch.reporter.events()),
        vec![
            LifecycleEvent::Started { generation: 1 },
            LifecycleEvent::Cancelled { generation: 1 },
            LifecycleEvent::Started { generation: 2 },
            LifecycleEvent::Completed {
                generation: 2,
                elapsed: Duration::ZERO,
            },
        ]
    );
    assert_eq!(watch.reporter.completed(), vec![2]);
    assert_eq!(project.read("dist/a.js"), FakeTransform::expected_code(A_NEW, BuildTarget::Esm));

    assert_eq!(watch.shutdown().await, 0);
}
