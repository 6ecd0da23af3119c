// tests/types.rs

use std::path::Path;
use std::sync::Arc;

use libpack::build::types::strip_asset_imports;
use libpack::build::{Diagnostics, TscTypeEmitter, TypeEmitter, TypesMode};
use libpack::errors::LibpackError;
use libpack::fs::{FileSystem, RealFileSystem};
use libpack::types::BuildTarget;
use libpack_test_utils::builders::TempProject;
use libpack_test_utils::init_tracing;

const TSC_OUTPUT: &str = "\
src/a.ts(3,5): error TS2322: Type 'string' is not assignable to type 'number'.
src/a.ts(9,1): error TS2304: Cannot find name 'foo'.
src/b.ts(1,10): error TS2305: Module './c' has no exported member 'd'.
  The member was removed.
error TS5083: Cannot read file 'tsconfig.base.json'.
";

fn emitter() -> TscTypeEmitter {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    TscTypeEmitter::new(fs)
}

#[test]
fn parses_file_and_project_diagnostics() {
    let diagnostics = Diagnostics::parse(TSC_OUTPUT);

    assert_eq!(diagnostics.len(), 4);
    let first = &diagnostics.items[0];
    assert_eq!(first.file.as_deref(), Some(Path::new("src/a.ts")));
    assert_eq!((first.line, first.column), (3, 5));
    assert_eq!(first.code, "TS2322");
    assert!(diagnostics.items[2].message.ends_with("The member was removed."));
    assert_eq!(diagnostics.items[3].file, None);
    assert_eq!(diagnostics.items[3].code, "TS5083");
}

#[test]
fn summary_counts_errors_per_file() {
    let diagnostics = Diagnostics::parse(TSC_OUTPUT);

    let per_file = diagnostics.per_file();
    assert_eq!(per_file[Path::new("src/a.ts")], (2, 3));
    assert_eq!(per_file[Path::new("src/b.ts")], (1, 1));

    let text = diagnostics.to_string();
    assert!(text.contains("Found 4 errors in 2 files."), "got {text}");
    assert!(text.contains("     2  src/a.ts:3"), "got {text}");
}

#[test]
fn asset_imports_are_stripped_from_declarations() {
    let code = "import './button.css';\nimport \"./logo.SVG\";\n\n\nexport declare const a: number;\nimport './real';\n";
    let stripped = strip_asset_imports(code);

    assert!(!stripped.contains("button.css"));
    assert!(!stripped.contains("logo.SVG"));
    assert!(stripped.contains("import './real';"));
    assert!(!stripped.contains("\n\n"));
}

#[test]
fn command_line_targets_the_declaration_directory() {
    let project = TempProject::new();
    project.write("tsconfig.json", "{}");
    let cfg = project.config().targets(&[BuildTarget::Cjs]).build();
    let tsconfig = cfg.tsconfig.clone().unwrap();

    let emit = TscTypeEmitter::command_line(&cfg, &tsconfig, TypesMode::Emit);
    assert!(emit.starts_with("npx tsc -p "));
    assert!(emit.contains("--declaration --emitDeclarationOnly --outDir"));
    assert!(emit.contains(&*cfg.output_dir(BuildTarget::Cjs).to_string_lossy()));

    let check = TscTypeEmitter::command_line(&cfg, &tsconfig, TypesMode::Check);
    assert!(check.ends_with("--noEmit"));
}

#[tokio::test]
async fn missing_tsconfig_is_a_config_error() {
    init_tracing();
    let project = TempProject::new();
    let cfg = project.config().build();

    let err = emitter().emit(&cfg, TypesMode::Check).await.unwrap_err();
    assert!(matches!(err, LibpackError::ConfigError(_)), "got {err:?}");
    assert!(err.is_fatal());
}

#[cfg(unix)]
#[tokio::test]
async fn reported_diagnostics_fail_the_step() {
    init_tracing();
    let project = TempProject::new();
    project.write("tsconfig.json", "{}");
    let cfg = project
        .config()
        .types_command("echo 'src/a.ts(1,1): error TS1005: expected'; true")
        .build();

    let err = emitter().emit(&cfg, TypesMode::Check).await.unwrap_err();
    match err {
        LibpackError::TypeCheckError(diagnostics) => assert_eq!(diagnostics.len(), 1),
        other => panic!("expected type errors, got {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn successful_emit_post_processes_declarations() {
    init_tracing();
    let project = TempProject::new();
    project.write("tsconfig.json", "{}");
    project.write("dist/index.d.ts", "import './index.css';\nexport declare const a: 1;\n");
    project.write("tsconfig.tsbuildinfo", "{}");
    project.write("node_modules/dep/tsconfig.tsbuildinfo", "{}");
    let cfg = project.config().types_command("true").build();

    emitter().emit(&cfg, TypesMode::Emit).await.unwrap();

    let declarations = project.read("dist/index.d.ts");
    assert!(!declarations.contains("index.css"), "got {declarations:?}");
    assert!(declarations.contains("export declare const a: 1;"));
    assert!(!project.exists("tsconfig.tsbuildinfo"));
    assert!(project.exists("node_modules/dep/tsconfig.tsbuildinfo"));
}
