// tests/pipeline.rs

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use libpack::build::{
    output_rel_path, BuildPipeline, BuildRequest, DefaultPackager, EventSink, GenerationToken,
    PipelineEvent, PipelineOutcome,
};
use libpack::config::ConfigFile;
use libpack::errors::LibpackError;
use libpack::fs::{FileSystem, RealFileSystem};
use libpack::types::{BuildTarget, RemovedPath};
use libpack_test_utils::builders::TempProject;
use libpack_test_utils::fake_transform::FakeTransform;
use libpack_test_utils::{init_tracing, with_timeout};

const A: &str = "export const a = 1;\n";
const B: &str = "export const b = 2;\n";

fn pipeline(cfg: ConfigFile, transform: &FakeTransform) -> BuildPipeline {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    BuildPipeline::new(Arc::new(cfg), fs, Arc::new(transform.clone()))
}

fn recording_sink() -> (EventSink, Arc<Mutex<Vec<PipelineEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    let sink: EventSink = Arc::new(move |event| sink_events.lock().unwrap().push(event));
    (sink, events)
}

async fn run(p: &BuildPipeline, request: BuildRequest) -> libpack::errors::Result<PipelineOutcome> {
    let token = GenerationToken::new(request.generation);
    let (sink, _) = recording_sink();
    p.run(&request, &token, sink).await
}

fn two_file_project() -> TempProject {
    let project = TempProject::new();
    project.write("src/a.ts", A);
    project.write("src/nested/b.ts", B);
    project
}

#[test]
fn output_paths_follow_module_extensions() {
    assert_eq!(output_rel_path(Path::new("a.ts")), Path::new("a.js"));
    assert_eq!(output_rel_path(Path::new("x/View.tsx")), Path::new("x/View.js"));
    assert_eq!(output_rel_path(Path::new("b.jsx")), Path::new("b.js"));
    assert_eq!(output_rel_path(Path::new("c.mts")), Path::new("c.mjs"));
    assert_eq!(output_rel_path(Path::new("d.cts")), Path::new("d.cjs"));
    assert_eq!(output_rel_path(Path::new("e.json")), Path::new("e.json"));
}

#[tokio::test]
async fn builds_every_source_for_every_target() {
    init_tracing();
    let project = two_file_project();
    let transform = FakeTransform::new();
    let p = pipeline(project.config().build(), &transform);

    let token = GenerationToken::new(1);
    let (sink, events) = recording_sink();
    let outcome = p.run(&BuildRequest::new(1), &token, sink).await.unwrap();

    assert!(matches!(outcome, PipelineOutcome::Completed { files: 2, .. }));
    assert_eq!(project.read("dist/a.js"), FakeTransform::expected_code(A, BuildTarget::Esm));
    assert_eq!(project.read("dist/nested/b.js"), FakeTransform::expected_code(B, BuildTarget::Esm));
    assert_eq!(project.read("dist/cjs/a.js"), FakeTransform::expected_code(A, BuildTarget::Cjs));
    assert_eq!(project.read("dist/cjs/nested/b.js"), FakeTransform::expected_code(B, BuildTarget::Cjs));
    assert_eq!(transform.call_count(), 4);

    let events = events.lock().unwrap().clone();
    assert_eq!(
        events[0],
        PipelineEvent::Started {
            targets: vec![BuildTarget::Esm, BuildTarget::Cjs],
            total: 2
        }
    );
    let esm_done: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::FileDone {
                target: BuildTarget::Esm,
                completed,
                ..
            } => Some(*completed),
            _ => None,
        })
        .collect();
    assert_eq!(esm_done, vec![1, 2]);
}

#[tokio::test]
async fn request_targets_restrict_the_build() {
    init_tracing();
    let project = two_file_project();
    let transform = FakeTransform::new();
    let p = pipeline(project.config().build(), &transform);

    let mut request = BuildRequest::new(1);
    request.targets = vec![BuildTarget::Cjs];
    run(&p, request).await.unwrap();

    assert!(project.exists("dist/cjs/a.js"));
    assert!(!project.exists("dist/a.js"));
}

#[tokio::test]
async fn source_maps_are_written_and_referenced() {
    init_tracing();
    let project = two_file_project();
    let cfg = project.config().source_maps(BuildTarget::Cjs).build();
    let p = pipeline(cfg, &FakeTransform::new());

    run(&p, BuildRequest::new(1)).await.unwrap();

    let code = project.read("dist/cjs/a.js");
    assert!(code.ends_with("//# sourceMappingURL=a.js.map\n"), "got {code:?}");
    assert!(project.read("dist/cjs/a.js.map").contains("\"version\":3"));
    assert!(!project.exists("dist/a.js.map"));
    assert!(!project.read("dist/a.js").contains("sourceMappingURL"));
}

#[tokio::test]
async fn removed_file_deletes_its_outputs() {
    init_tracing();
    let project = two_file_project();
    let cfg = project.config().source_maps(BuildTarget::Esm).build();
    let p = pipeline(cfg, &FakeTransform::new());
    run(&p, BuildRequest::new(1)).await.unwrap();
    assert!(project.exists("dist/nested/b.js.map"));

    project.remove("src/nested/b.ts");
    let mut request = BuildRequest::new(2);
    request.removed = vec![RemovedPath::file(&project.path("src/nested/b.ts"))];
    let outcome = run(&p, request).await.unwrap();

    assert!(matches!(outcome, PipelineOutcome::Completed { .. }));
    assert!(!project.exists("dist/nested/b.js"));
    assert!(!project.exists("dist/nested/b.js.map"));
    assert!(!project.exists("dist/cjs/nested/b.js"));
    assert!(project.exists("dist/a.js"));
}

#[tokio::test]
async fn removed_directory_deletes_its_output_directories() {
    init_tracing();
    let project = two_file_project();
    let p = pipeline(project.config().build(), &FakeTransform::new());
    run(&p, BuildRequest::new(1)).await.unwrap();

    project.remove("src/nested");
    let mut request = BuildRequest::new(2);
    request.removed = vec![RemovedPath::dir(&project.path("src/nested"))];
    run(&p, request).await.unwrap();

    assert!(!project.exists("dist/nested"));
    assert!(!project.exists("dist/cjs/nested"));
    assert!(project.exists("dist/cjs/a.js"));
}

#[tokio::test]
async fn removed_directory_never_deletes_a_target_root() {
    init_tracing();
    let project = two_file_project();
    let p = pipeline(project.config().build(), &FakeTransform::new());
    run(&p, BuildRequest::new(1)).await.unwrap();

    // A source directory named like the CJS output subpath.
    let mut request = BuildRequest::new(2);
    request.removed = vec![RemovedPath::dir(&project.path("src/cjs"))];
    run(&p, request).await.unwrap();

    assert!(project.exists("dist/cjs/a.js"));
}

#[tokio::test]
async fn no_sources_is_fatal() {
    init_tracing();
    let project = TempProject::new();
    project.write("src/README.md", "# nothing to build\n");
    let p = pipeline(project.config().build(), &FakeTransform::new());

    let err = run(&p, BuildRequest::new(1)).await.unwrap_err();
    assert!(matches!(err, LibpackError::NoSourceFiles { .. }), "got {err:?}");
    assert!(err.is_fatal());
}

#[tokio::test]
async fn ignored_and_declaration_files_are_not_transpiled() {
    init_tracing();
    let project = two_file_project();
    project.write("src/a.test.ts", "test('a');\n");
    project.write("src/globals.d.ts", "declare const X: number;\n");
    let transform = FakeTransform::new();
    let p = pipeline(project.config().build(), &transform);

    run(&p, BuildRequest::new(1)).await.unwrap();

    assert_eq!(transform.call_count(), 4);
    assert!(!project.exists("dist/a.test.js"));
    assert!(!project.exists("dist/globals.js"));
}

#[tokio::test]
async fn cancelled_token_stops_before_any_work() {
    init_tracing();
    let project = two_file_project();
    let transform = FakeTransform::new();
    let p = pipeline(project.config().build(), &transform);

    let token = GenerationToken::new(1);
    token.cancel();
    let (sink, events) = recording_sink();
    let outcome = p.run(&BuildRequest::new(1), &token, sink).await.unwrap();

    assert_eq!(outcome, PipelineOutcome::Cancelled);
    assert_eq!(transform.call_count(), 0);
    assert!(events.lock().unwrap().is_empty());
    assert!(!project.exists("dist"));
}

#[tokio::test]
async fn cancellation_mid_build_skips_packaging() {
    init_tracing();
    let project = TempProject::new().with_package_json();
    for i in 0..6 {
        project.write(&format!("src/f{i}.ts"), "export {};\n");
    }
    let transform = FakeTransform::new().with_delay(Duration::from_millis(50));
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let p = pipeline(project.config().build(), &transform)
        .with_packager(Arc::new(DefaultPackager::new(fs)));

    let token = GenerationToken::new(1);
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(120)).await;
        canceller.cancel();
    });

    let (sink, _) = recording_sink();
    let outcome = with_timeout(p.run(&BuildRequest::new(1), &token, sink))
        .await
        .unwrap();

    assert_eq!(outcome, PipelineOutcome::Cancelled);
    assert!(transform.call_count() < 12);
    assert!(!project.exists("dist/package.json"));
}

#[tokio::test]
async fn transform_failure_is_a_recoverable_error() {
    init_tracing();
    let project = two_file_project();
    project.write("src/bad.ts", "export const = ;\n");
    let p = pipeline(project.config().build(), &FakeTransform::new().failing_on("bad"));

    let err = run(&p, BuildRequest::new(1)).await.unwrap_err();
    assert!(matches!(err, LibpackError::TransformError { .. }), "got {err:?}");
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn transform_panic_becomes_an_error() {
    init_tracing();
    let project = two_file_project();
    project.write("src/boom.ts", "export {};\n");
    let p = pipeline(project.config().build(), &FakeTransform::new().panicking_on("boom"));

    let err = run(&p, BuildRequest::new(1)).await.unwrap_err();
    match err {
        LibpackError::TransformError { path, message } => {
            assert!(message.contains("panicked"), "got {message:?}");
            assert_eq!(path, project.path("src/boom.ts"));
        }
        other => panic!("expected transform error, got {other:?}"),
    }
}

#[tokio::test]
async fn transform_panic_in_a_batch_names_the_source() {
    init_tracing();
    let project = two_file_project();
    project.write("src/boom.ts", "export {};\n");
    let cfg = project
        .config()
        .targets(&[BuildTarget::Esm])
        .progress(false)
        .batch_size(4)
        .build();
    let p = pipeline(cfg, &FakeTransform::new().panicking_on("boom"));

    let err = run(&p, BuildRequest::new(1)).await.unwrap_err();
    match err {
        LibpackError::TransformError { path, message } => {
            assert!(message.contains("panicked"), "got {message:?}");
            assert_eq!(path, project.path("src/boom.ts"));
        }
        other => panic!("expected transform error, got {other:?}"),
    }
}

#[tokio::test]
async fn batch_mode_reports_per_batch_and_builds_everything() {
    init_tracing();
    let project = TempProject::new();
    for i in 0..5 {
        project.write(&format!("src/f{i}.ts"), &format!("export const v = {i};\n"));
    }
    let cfg = project
        .config()
        .targets(&[BuildTarget::Esm])
        .progress(false)
        .batch_size(2)
        .build();
    let p = pipeline(cfg, &FakeTransform::new());

    let token = GenerationToken::new(1);
    let (sink, events) = recording_sink();
    p.run(&BuildRequest::new(1), &token, sink).await.unwrap();

    for i in 0..5 {
        assert!(project.exists(&format!("dist/f{i}.js")));
    }
    let done: Vec<u64> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::FileDone { completed, .. } => Some(*completed),
            _ => None,
        })
        .collect();
    assert_eq!(done, vec![2, 4, 5]);
}

#[tokio::test]
async fn completed_build_is_packaged() {
    init_tracing();
    let project = TempProject::new().with_package_json();
    project.write("src/index.ts", A);
    project.write("README.md", "# demo\n");
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let p = pipeline(project.config().build(), &FakeTransform::new())
        .with_packager(Arc::new(DefaultPackager::new(fs)));

    run(&p, BuildRequest::new(1)).await.unwrap();

    let pkg: serde_json::Value = serde_json::from_str(&project.read("dist/package.json")).unwrap();
    assert_eq!(pkg["main"], "./cjs/index.js");
    assert_eq!(pkg["module"], "./index.js");
    assert!(project.exists("dist/README.md"));
}
