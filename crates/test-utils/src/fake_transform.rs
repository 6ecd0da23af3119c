use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use libpack::build::transform::BoxFuture;
use libpack::build::{Transform, TransformOptions, TransformOutput};
use libpack::types::BuildTarget;

/// A transform that:
/// - records every `(source, target)` it was asked to compile
/// - prefixes the source text with a `// <target>` banner
/// - returns a tiny source map when maps are requested
///
/// Optional knobs make it slow, failing or panicking for specific files.
#[derive(Debug, Clone, Default)]
pub struct FakeTransform {
    delay: Option<Duration>,
    fail_on: Option<String>,
    panic_on: Option<String>,
    calls: Arc<Mutex<Vec<(PathBuf, BuildTarget)>>>,
}

impl FakeTransform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before every file.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail for sources whose file name contains `needle`.
    pub fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    /// Panic for sources whose file name contains `needle`.
    pub fn panicking_on(mut self, needle: &str) -> Self {
        self.panic_on = Some(needle.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(PathBuf, BuildTarget)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The output text this transform produces for `source` and `target`.
    pub fn expected_code(source: &str, target: BuildTarget) -> String {
        format!("// {target}\n{source}")
    }
}

fn name_contains(path: &Path, needle: &Option<String>) -> bool {
    match needle {
        Some(needle) => path
            .file_name()
            .map(|n| n.to_string_lossy().contains(needle.as_str()))
            .unwrap_or(false),
        None => false,
    }
}

impl Transform for FakeTransform {
    fn transform<'a>(
        &'a self,
        source: &'a Path,
        options: TransformOptions,
    ) -> BoxFuture<'a, anyhow::Result<TransformOutput>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((source.to_path_buf(), options.target));

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if name_contains(source, &self.panic_on) {
                panic!("fake transform panicked on {}", source.display());
            }
            if name_contains(source, &self.fail_on) {
                return Err(anyhow!("syntax error in {}", source.display()));
            }

            let text = tokio::fs::read_to_string(source).await?;
            let map = options.source_maps.then(|| {
                let name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!(r#"{{"version":3,"sources":["{name}"],"mappings":""}}"#)
            });
            Ok(TransformOutput {
                code: Self::expected_code(&text, options.target),
                map,
            })
        })
    }
}
