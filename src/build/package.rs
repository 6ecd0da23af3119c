// src/build/package.rs

//! Post-build packaging: declarations, assets and derived `package.json`s.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::ConfigFile;
use crate::fs::{walk_files, FileSystem};
use crate::types::BuildTarget;
use crate::watch::AssetMatcher;

/// Manifest keys that only matter while developing the package.
const DEV_ONLY_KEYS: &[&str] = &["scripts", "devDependencies", "workspaces", "publishConfig"];

/// Files copied from the package root into the output root when present.
const INCLUDED_FILES: &[&str] = &["README.md", "LICENSE"];

/// What a packaging run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageReport {
    pub declarations: usize,
    pub assets: usize,
    pub module_packages: Vec<PathBuf>,
    pub included: Vec<PathBuf>,
}

/// Runs after all targets were transpiled successfully.
///
/// Failures abort the build generation but never the watcher process.
pub trait Packager: Send + Sync + std::fmt::Debug {
    fn package(&self, cfg: &ConfigFile, targets: &[BuildTarget]) -> Result<PackageReport>;
}

/// Standard packaging steps, in order:
///
/// 1. ensure the output root exists
/// 2. copy `.d.ts` files from the source root
/// 3. copy `assets` into every built target directory
/// 4. write a `package.json` into each top-level module directory (only
///    when both formats are built and ESM lives at the output root)
/// 5. write the publishable root `package.json`
/// 6. copy `README.md` / `LICENSE`
#[derive(Debug, Clone)]
pub struct DefaultPackager {
    fs: std::sync::Arc<dyn FileSystem>,
}

impl DefaultPackager {
    pub fn new(fs: std::sync::Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    fn copy_declarations(&self, cfg: &ConfigFile) -> Result<usize> {
        let files = walk_files(self.fs.as_ref(), &cfg.src_dir, |rel| rel.ends_with(".d.ts"))?;
        for file in &files {
            let rel = file.strip_prefix(&cfg.src_dir)?;
            self.fs.copy(file, &cfg.out_dir.join(rel))?;
        }
        Ok(files.len())
    }

    fn copy_assets(&self, cfg: &ConfigFile, targets: &[BuildTarget]) -> Result<usize> {
        let matcher = AssetMatcher::new(&cfg.assets)?;
        if matcher.is_empty() {
            return Ok(0);
        }
        let assets = matcher.collect_assets(self.fs.as_ref(), &cfg.src_dir)?;

        let mut copied = 0;
        for target in targets {
            let dir = cfg.output_dir(*target);
            if !self.fs.is_dir(dir) {
                debug!(target = %target, ?dir, "target output missing; skipping assets");
                continue;
            }
            for asset in &assets {
                let rel = asset.strip_prefix(&cfg.src_dir)?;
                self.fs.copy(asset, &dir.join(rel))?;
                copied += 1;
            }
        }
        Ok(copied)
    }

    fn write_module_packages(
        &self,
        cfg: &ConfigFile,
        targets: &[BuildTarget],
        manifest: &Map<String, Value>,
    ) -> Result<Vec<PathBuf>> {
        let esm_dir = cfg.output_dir(BuildTarget::Esm);
        let cjs_dir = cfg.output_dir(BuildTarget::Cjs);
        let both = targets.contains(&BuildTarget::Esm) && targets.contains(&BuildTarget::Cjs);
        if !both || esm_dir != cfg.out_dir.as_path() {
            return Ok(Vec::new());
        }
        let Ok(cjs_rel) = cjs_dir.strip_prefix(&cfg.out_dir) else {
            return Ok(Vec::new());
        };
        let cjs_rel = to_slash(cjs_rel);

        let mut written = Vec::new();
        for module in module_directories(self.fs.as_ref(), &cfg.src_dir)? {
            let module_dir = cfg.out_dir.join(&module);
            let mut pkg = Map::new();
            if let Some(name) = manifest.get("name").and_then(Value::as_str) {
                pkg.insert("name".into(), Value::String(format!("{name}/{module}")));
            }
            if let Some(version) = manifest.get("version") {
                pkg.insert("version".into(), version.clone());
            }
            pkg.insert("sideEffects".into(), Value::Bool(false));

            let module_entry = "./index.js".to_string();
            let main_entry = format!("../{cjs_rel}/{module}/index.js");
            let types_entry = "./index.d.ts".to_string();

            let module_exists = self.fs.is_file(&module_dir.join("index.js"));
            let main_exists = self.fs.is_file(&cjs_dir.join(&module).join("index.js"));
            if module_exists {
                pkg.insert("module".into(), Value::String(module_entry.clone()));
            }
            if main_exists {
                pkg.insert("main".into(), Value::String(main_entry));
            } else if module_exists {
                pkg.insert("main".into(), Value::String(module_entry));
            }
            if self.fs.is_file(&module_dir.join("index.d.ts")) {
                pkg.insert("types".into(), Value::String(types_entry));
            }

            let path = module_dir.join("package.json");
            write_json(self.fs.as_ref(), &path, &Value::Object(pkg))?;
            written.push(path);
        }
        Ok(written)
    }

    fn write_root_package(
        &self,
        cfg: &ConfigFile,
        targets: &[BuildTarget],
        manifest: Map<String, Value>,
    ) -> Result<()> {
        let mut pkg = manifest;
        for key in DEV_ONLY_KEYS {
            pkg.remove(*key);
        }
        pkg.insert("private".into(), Value::Bool(false));
        pkg.remove("main");
        pkg.remove("module");
        pkg.remove("types");

        let entry = |target: BuildTarget| -> Option<String> {
            if !targets.contains(&target) {
                return None;
            }
            let index = cfg.output_dir(target).join("index.js");
            if self.fs.is_file(&index) {
                relative_entry(&cfg.out_dir, &index)
            } else {
                None
            }
        };

        let main = entry(BuildTarget::Cjs);
        let module = entry(BuildTarget::Esm);
        match (main, module) {
            (Some(main), Some(module)) => {
                pkg.insert("main".into(), Value::String(main));
                pkg.insert("module".into(), Value::String(module));
            }
            (None, Some(module)) => {
                pkg.insert("main".into(), Value::String(module.clone()));
                pkg.insert("module".into(), Value::String(module));
            }
            (Some(main), None) => {
                pkg.insert("main".into(), Value::String(main));
            }
            (None, None) => {}
        }

        let declarations = cfg.types_dir().join("index.d.ts");
        if self.fs.is_file(&declarations) {
            if let Some(types) = relative_entry(&cfg.out_dir, &declarations) {
                pkg.insert("types".into(), Value::String(types));
            }
        }

        write_json(self.fs.as_ref(), &cfg.out_dir.join("package.json"), &Value::Object(pkg))
    }

    fn include_files(&self, cfg: &ConfigFile) -> Result<Vec<PathBuf>> {
        let mut included = Vec::new();
        for name in INCLUDED_FILES {
            let source = cfg.root.join(name);
            if self.fs.is_file(&source) {
                let dest = cfg.out_dir.join(name);
                self.fs.copy(&source, &dest)?;
                debug!(?source, ?dest, "copied into build");
                included.push(dest);
            }
        }
        Ok(included)
    }
}

impl Packager for DefaultPackager {
    fn package(&self, cfg: &ConfigFile, targets: &[BuildTarget]) -> Result<PackageReport> {
        self.fs.create_dir_all(&cfg.out_dir)?;

        let declarations = self.copy_declarations(cfg).context("copying declaration files")?;
        let assets = self.copy_assets(cfg, targets).context("copying assets")?;

        let manifest = read_manifest(self.fs.as_ref(), &cfg.root)?;
        let module_packages = self
            .write_module_packages(cfg, targets, &manifest)
            .context("writing module package.json files")?;
        self.write_root_package(cfg, targets, manifest)
            .context("writing package.json")?;
        let included = self.include_files(cfg)?;

        info!(
            declarations,
            assets,
            module_packages = module_packages.len(),
            "packaging finished"
        );

        Ok(PackageReport {
            declarations,
            assets,
            module_packages,
            included,
        })
    }
}

fn read_manifest(fs: &dyn FileSystem, root: &Path) -> Result<Map<String, Value>> {
    let path = root.join("package.json");
    if !fs.is_file(&path) {
        return Err(anyhow!("no package.json found in {:?}", root));
    }
    let contents = fs.read_to_string(&path)?;
    match serde_json::from_str::<Value>(&contents)
        .with_context(|| format!("parsing {:?}", path))?
    {
        Value::Object(map) => Ok(map),
        _ => Err(anyhow!("{:?} is not a JSON object", path)),
    }
}

/// Top-level directories of `src_dir` that contain an `index.{js,ts,tsx}`.
fn module_directories(fs: &dyn FileSystem, src_dir: &Path) -> Result<Vec<String>> {
    let mut modules = Vec::new();
    if !fs.is_dir(src_dir) {
        return Ok(modules);
    }
    for entry in fs.read_dir(src_dir)? {
        if !fs.is_dir(&entry) {
            continue;
        }
        let has_index = ["index.js", "index.ts", "index.tsx"]
            .iter()
            .any(|name| fs.is_file(&entry.join(name)));
        if has_index {
            if let Some(name) = entry.file_name() {
                modules.push(name.to_string_lossy().into_owned());
            }
        }
    }
    modules.sort();
    Ok(modules)
}

fn write_json(fs: &dyn FileSystem, path: &Path, value: &Value) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    fs.write(path, text.as_bytes())
}

/// `./`-prefixed forward-slash path of `file` relative to `out_dir`.
fn relative_entry(out_dir: &Path, file: &Path) -> Option<String> {
    file.strip_prefix(out_dir)
        .ok()
        .map(|rel| format!("./{}", to_slash(rel)))
}

fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
