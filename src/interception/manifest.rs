// src/interception/manifest.rs
//! Dependency manifests (`package.json`) and main-file detection

use crate::interception::module_info::{normalize_path, ModuleIdentity};
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const MANIFEST_FILE: &str = "package.json";

/// Conditions accepted in `exports` regardless of module format
const COMMON_CONDITIONS: &[&str] = &["default", "node", "node-addons"];

/// `exports` keys that denote the package entry point
const MAIN_EXPORT_KEYS: &[&str] = &[".", "./", "./index.js", "./index.mjs"];

/// The fields of a manifest the engine reads
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PackageManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    /// Usually a string; other shapes are treated as absent
    pub main: Option<JsonValue>,
    pub exports: Option<JsonValue>,
}

impl PackageManifest {
    pub fn from_json(text: &str, path: &Path) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| EngineError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Installed version, or `VersionUnresolved` when missing or empty
    pub fn installed_version(&self, package: &str) -> Result<String> {
        match self.version.as_deref().map(str::trim) {
            Some(version) if !version.is_empty() => Ok(version.to_string()),
            _ => Err(EngineError::VersionUnresolved(package.to_string())),
        }
    }
}

/// Whether `filename` is the entry point of the package `identity` belongs to
///
/// Checked in order: the specifier is the bare package name, `main` (with
/// and without `.js`), the default `index.js` / `index.mjs` when there is no
/// `main`, and finally the `exports` map.
pub fn is_main_file(
    identity: &ModuleIdentity,
    specifier: Option<&str>,
    filename: &Path,
    manifest: &PackageManifest,
    is_esm: bool,
) -> bool {
    if specifier == Some(identity.name.as_str()) {
        return true;
    }

    let filename = normalize_path(filename);
    let resolves_to = |relative: &str| normalize_path(&identity.base.join(relative)) == filename;

    match &manifest.main {
        Some(JsonValue::String(main)) => {
            if resolves_to(main) || resolves_to(&format!("{}.js", main)) {
                return true;
            }
        }
        None => {
            let default = if is_esm { "index.mjs" } else { "index.js" };
            if resolves_to(default) || resolves_to("index.js") {
                return true;
            }
        }
        Some(_) => {}
    }

    let Some(exports) = &manifest.exports else {
        return false;
    };
    main_export_targets(exports, is_esm)
        .iter()
        .any(|target| resolves_to(target))
}

/// Files the `exports` field maps the package root to
fn main_export_targets(exports: &JsonValue, is_esm: bool) -> Vec<String> {
    let mut targets = Vec::new();
    match exports {
        JsonValue::Object(map) if map.keys().any(|k| k.starts_with('.')) => {
            for key in MAIN_EXPORT_KEYS {
                if let Some(entry) = map.get(*key) {
                    collect_targets(entry, is_esm, &mut targets);
                }
            }
        }
        // Conditions or a target at the top level apply to "."
        other => collect_targets(other, is_esm, &mut targets),
    }
    targets
}

fn collect_targets(entry: &JsonValue, is_esm: bool, targets: &mut Vec<String>) {
    match entry {
        JsonValue::String(target) => targets.push(target.clone()),
        JsonValue::Array(items) => {
            for item in items {
                collect_targets(item, is_esm, targets);
            }
        }
        JsonValue::Object(conditions) => {
            let format_condition = if is_esm { "import" } else { "require" };
            for (condition, value) in conditions {
                if condition == format_condition || COMMON_CONDITIONS.contains(&condition.as_str()) {
                    collect_targets(value, is_esm, targets);
                }
            }
        }
        _ => {}
    }
}

/// Back channel for reading dependency manifests
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Read the manifest in the dependency root `base`
    fn read_blocking(&self, base: &Path) -> Result<PackageManifest>;

    async fn read(&self, base: &Path) -> Result<PackageManifest> {
        self.read_blocking(base)
    }
}

/// Reads `package.json` from disk, caching by directory
#[derive(Debug, Default)]
pub struct FsManifestSource {
    cache: DashMap<PathBuf, PackageManifest>,
}

impl FsManifestSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ManifestSource for FsManifestSource {
    fn read_blocking(&self, base: &Path) -> Result<PackageManifest> {
        if let Some(cached) = self.cache.get(base) {
            return Ok(cached.value().clone());
        }
        let path = base.join(MANIFEST_FILE);
        debug!("Reading manifest {}", path.display());
        let text = std::fs::read_to_string(&path)?;
        let manifest = PackageManifest::from_json(&text, &path)?;
        self.cache.insert(base.to_path_buf(), manifest.clone());
        Ok(manifest)
    }

    async fn read(&self, base: &Path) -> Result<PackageManifest> {
        if let Some(cached) = self.cache.get(base) {
            return Ok(cached.value().clone());
        }
        let path = base.join(MANIFEST_FILE);
        debug!("Reading manifest {}", path.display());
        let text = tokio::fs::read_to_string(&path).await?;
        let manifest = PackageManifest::from_json(&text, &path)?;
        self.cache.insert(base.to_path_buf(), manifest.clone());
        Ok(manifest)
    }
}
