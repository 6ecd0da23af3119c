// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling the `extensions` / `ignore` / `assets` selection of files.
//! - Wiring up a cross-platform filesystem watcher (`notify`) on the
//!   source root.
//! - Content fingerprints that suppress rebuilds for no-op events.
//! - The debounce timer that collapses event bursts into one trigger.
//!
//! It does **not** know about workers or builds; it only turns filesystem
//! changes into `WatchEvent`s for the engine.

pub mod debounce;
pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use debounce::Debouncer;
pub use hash::{compute_hash, ChangeHashCache};
pub use patterns::{build_globset, AssetMatcher, SourceMatcher};
pub use watcher::{spawn_watcher, translate_event, WatcherHandle};
