// src/init.rs

//! `libpack init`: write a commented sample configuration.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{default_config_path, RawConfigFile};
use crate::errors::{LibpackError, Result};

/// Sample `libpack.toml` listing every option with its default.
pub const SAMPLE_CONFIG: &str = r#"# libpack configuration. Every key is optional.

src_dir = "src"
out_dir = "dist"
targets = ["esm", "cjs"]

# Defaults to [".ts", ".tsx"] when a tsconfig is found, else [".js", ".jsx"].
# extensions = [".ts", ".tsx"]

# ignore = ["**/*.test.ts", "**/*.spec.ts"]

# Globs relative to src_dir, copied into every target directory.
assets = []

# tsconfig = "tsconfig.build.json"

# Monorepo root, searched for a tsconfig when the package has none.
# workspace = "../.."

[lib.esm]
comments = true
source_map = false
path = "."

[lib.cjs]
comments = true
source_map = false
path = "cjs"

[transform]
# Transpiles one file; placeholders: {input} {target} {map}.
# The transformed code is read from stdout.
# command = "npx esbuild {input} --format={target}"

[types]
command = "npx tsc"

[watch]
debounce_ms = 400
progress = true
batch_size = 16
"#;

/// Write [`SAMPLE_CONFIG`] to `<root>/libpack.toml`. Refuses to overwrite.
pub fn write_sample_config(root: &Path) -> Result<PathBuf> {
    let path = default_config_path(root);
    if path.exists() {
        return Err(LibpackError::ConfigError(format!(
            "{:?} already exists",
            path
        )));
    }
    std::fs::write(&path, SAMPLE_CONFIG)?;
    info!(?path, "wrote sample config");
    Ok(path)
}

/// Parse the sample to make sure it stays in sync with the config model.
pub fn parse_sample() -> Result<RawConfigFile> {
    Ok(toml::from_str(SAMPLE_CONFIG)?)
}
