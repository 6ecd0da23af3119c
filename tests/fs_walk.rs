// tests/fs_walk.rs

use std::path::{Path, PathBuf};

use libpack::fs::mock::MockFileSystem;
use libpack::fs::walk_files;
use libpack::watch::{AssetMatcher, SourceMatcher};

fn tree() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("src/index.ts", "");
    fs.add_file("src/button/index.tsx", "");
    fs.add_file("src/button/button.css", "");
    fs.add_file("src/button/index.d.ts", "");
    fs.add_file("src/__tests__/index.test.ts", "");
    fs.add_file("src/logo.svg", "");
    fs
}

#[test]
fn walk_returns_sorted_files_matching_the_filter() {
    let fs = tree();
    let files = walk_files(&fs, Path::new("src"), |rel| rel.starts_with("button/")).unwrap();

    assert_eq!(
        files,
        vec![
            PathBuf::from("src/button/button.css"),
            PathBuf::from("src/button/index.d.ts"),
            PathBuf::from("src/button/index.tsx"),
        ]
    );
}

#[test]
fn walking_a_missing_root_is_empty() {
    let fs = tree();
    assert!(walk_files(&fs, Path::new("lib"), |_| true).unwrap().is_empty());
}

#[test]
fn sources_skip_ignored_and_declaration_files() {
    let fs = tree();
    let matcher = SourceMatcher::new(
        &[".ts".to_string(), ".tsx".to_string()],
        &["**/__tests__/**".to_string()],
    )
    .unwrap();

    assert_eq!(
        matcher.collect_sources(&fs, Path::new("src")).unwrap(),
        vec![
            PathBuf::from("src/button/index.tsx"),
            PathBuf::from("src/index.ts"),
        ]
    );
}

#[test]
fn assets_follow_their_globs() {
    let fs = tree();
    let assets = AssetMatcher::new(&["**/*.css".to_string(), "*.svg".to_string()]).unwrap();

    assert!(!assets.is_empty());
    assert_eq!(
        assets.collect_assets(&fs, Path::new("src")).unwrap(),
        vec![
            PathBuf::from("src/button/button.css"),
            PathBuf::from("src/logo.svg"),
        ]
    );
    assert!(AssetMatcher::new(&[]).unwrap().is_empty());
}
