// src/interception/load_hook.rs
//! Asynchronous load-hook interception
//!
//! Runs at the source stage, before a module is compiled:
//!
//! ```text
//! previous stage ──▶ builtin?      ──▶ shim re-exporting wrapped exports
//!                ──▶ self-check?   ──▶ marker substituted
//!                ──▶ dependency?   ──▶ rewritten by file instructions
//!                ──▶ application?  ──▶ best-effort rewrite (opt-in)
//! ```
//!
//! Every failure falls back to the previous stage's result.

use crate::engine::Engine;
use crate::interception::builtin_shim::generate_builtin_shim;
use crate::interception::module_info::module_identity_from_path;
use crate::interception::require_patch::ModuleLoader;
use crate::observability::metrics::{self, Adapter};
use crate::transform::SourceDialect;
use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Format tag of a loaded module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
    Builtin,
    CommonJs,
    Module,
    Json,
    Wasm,
    Addon,
    Other(String),
}

impl ModuleFormat {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "builtin" => ModuleFormat::Builtin,
            "commonjs" => ModuleFormat::CommonJs,
            "module" => ModuleFormat::Module,
            "json" => ModuleFormat::Json,
            "wasm" => ModuleFormat::Wasm,
            "addon" => ModuleFormat::Addon,
            other => ModuleFormat::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ModuleFormat::Builtin => "builtin",
            ModuleFormat::CommonJs => "commonjs",
            ModuleFormat::Module => "module",
            ModuleFormat::Json => "json",
            ModuleFormat::Wasm => "wasm",
            ModuleFormat::Addon => "addon",
            ModuleFormat::Other(tag) => tag,
        }
    }

    /// Formats whose source the engine may replace
    pub fn is_instrumentable(&self) -> bool {
        matches!(self, ModuleFormat::Builtin | ModuleFormat::CommonJs | ModuleFormat::Module)
    }

    fn dialect(&self) -> SourceDialect {
        match self {
            ModuleFormat::Module => SourceDialect::Module,
            _ => SourceDialect::CommonJs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleSource {
    Text(String),
    Binary(Vec<u8>),
}

impl ModuleSource {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ModuleSource::Text(text) => Some(text),
            ModuleSource::Binary(bytes) => std::str::from_utf8(bytes).ok(),
        }
    }
}

/// Result of a load stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub format: ModuleFormat,
    pub short_circuit: bool,
    pub source: Option<ModuleSource>,
}

impl LoadResult {
    fn with_source(&self, source: String) -> Self {
        Self {
            format: self.format.clone(),
            short_circuit: self.short_circuit,
            source: Some(ModuleSource::Text(source)),
        }
    }
}

/// What the host knew about the module before any loader ran
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadContext {
    pub format: Option<ModuleFormat>,
    pub conditions: Vec<String>,
}

/// Source-stage adapter
pub struct LoadHookAdapter {
    engine: Arc<Engine>,
    loader: Arc<dyn ModuleLoader>,
}

impl LoadHookAdapter {
    /// `loader` answers builtin queries (which names are builtins, their exports)
    pub fn new(engine: Arc<Engine>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self { engine, loader }
    }

    pub async fn on_module_load(&self, url: &str, context: &LoadContext, previous: LoadResult) -> LoadResult {
        if !previous.format.is_instrumentable() {
            return previous;
        }

        let builtin_prefix = &self.engine.config().loader.builtin_prefix;
        let is_builtin = previous.format == ModuleFormat::Builtin
            || url.starts_with(builtin_prefix.as_str())
            || self.loader.is_builtin(url);
        if is_builtin {
            // Another hook system already replaced the builtin with source
            let modified_elsewhere =
                context.format == Some(ModuleFormat::Builtin) && previous.format != ModuleFormat::Builtin;
            if modified_elsewhere {
                debug!("Builtin {} already modified by another hook, skipping", url);
                return previous;
            }
            return self.patch_builtin(url, previous);
        }

        let Some(path) = url_to_path(url) else {
            return previous;
        };
        match self.patch_file(&path, &previous).await {
            Ok(Some(result)) => result,
            Ok(None) => previous,
            Err(err) => {
                warn!("Failed to instrument {}: {}", path.display(), err);
                self.engine.agent().on_failed_to_wrap_module(&path.to_string_lossy(), &err);
                previous
            }
        }
    }

    fn patch_builtin(&self, url: &str, previous: LoadResult) -> LoadResult {
        let name = self.engine.config().loader.builtin_name(url);
        if !self.engine.snapshot().index.has_builtin(name) {
            return previous;
        }

        let export_names = self.loader.builtin_export_names(name);
        let entry_module = &self.engine.config().instrumentation.entry_module;
        match generate_builtin_shim(name, export_names.as_deref(), entry_module) {
            Some(shim) => {
                metrics::record_module_wrapped(Adapter::LoadHook);
                LoadResult {
                    format: ModuleFormat::Module,
                    short_circuit: previous.short_circuit,
                    source: Some(ModuleSource::Text(shim)),
                }
            }
            None => {
                debug!("No exports known for builtin {}, leaving it alone", name);
                previous
            }
        }
    }

    async fn patch_file(&self, path: &Path, previous: &LoadResult) -> Result<Option<LoadResult>> {
        let Some(source) = previous.source.as_ref().and_then(ModuleSource::as_text) else {
            return Ok(None);
        };
        let config = self.engine.config();

        if path.ends_with(&config.instrumentation.self_check_file) {
            let marker = &config.instrumentation.self_check_marker;
            if !source.contains(marker.as_str()) {
                return Ok(None);
            }
            let checked = source.replacen(marker.as_str(), &config.instrumentation.self_check_replacement, 1);
            return Ok(Some(previous.with_source(checked)));
        }

        let Some(identity) = module_identity_from_path(path, &config.loader.dependency_dir_marker) else {
            if !config.instrumentation.transform_application_code {
                return Ok(None);
            }
            let rewritten = self
                .engine
                .transformer()
                .transform_best_effort(source, previous.format.dialect());
            return Ok(rewritten.map(|text| previous.with_source(text)));
        };

        // One generation for the whole event, even across the manifest read
        let generation = self.engine.snapshot();
        if !generation.index.has_dependency(&identity.name) {
            return Ok(None);
        }

        let manifest = self.engine.manifests().read(&identity.base).await?;
        let version = match manifest.installed_version(&identity.name) {
            Ok(version) => version,
            Err(err) => {
                debug!("Not instrumenting {}: {}", identity.name, err);
                return Ok(None);
            }
        };

        let supported = generation.index.supports_version(&identity.name, &version);
        self.engine.agent().on_package_wrapped(&identity.name, &version, supported);

        let Some(instructions) = generation.index.file_instructions(&identity.name, &version, &identity.path) else {
            return Ok(None);
        };

        let transformed = self.engine.transformer().transform(
            &identity.name,
            &version,
            &identity.path,
            source,
            previous.format.dialect(),
            instructions,
        );
        metrics::record_transform(transformed.is_ok());
        let transformed = transformed.map_err(EngineError::from)?;

        debug!("Rewrote {}@{} ({})", identity.name, version, identity.path);
        metrics::record_module_wrapped(Adapter::LoadHook);
        Ok(Some(previous.with_source(transformed)))
    }
}

/// `file://` URLs become paths; other schemes are not files
fn url_to_path(url: &str) -> Option<PathBuf> {
    if !url.contains("://") {
        return Some(PathBuf::from(url));
    }
    let parsed = Url::parse(url).ok()?;
    if parsed.scheme() != "file" {
        return None;
    }
    parsed.to_file_path().ok()
}
