// src/interception/object_created.rs
//! Object-creation event interception
//!
//! For hosts that announce each module namespace once it exists instead of
//! exposing a mutable loader. The event carries its own dependency root,
//! which wins over the one derived from the path (nested and scoped
//! dependencies can disagree).

use crate::engine::Engine;
use crate::hooks::interceptor::{RequireInterceptor, WrapPackageInfo};
use crate::interception::cache::CacheSlot;
use crate::interception::executor::{execute_interceptors, patch_builtin};
use crate::interception::load_hook::ModuleFormat;
use crate::interception::manifest::is_main_file;
use crate::interception::module_info::{module_identity_from_path, ModuleIdentity};
use crate::observability::metrics::{self, Adapter};
use crate::runtime::Value;
use crate::utils::errors::Result;
use std::path::{Component, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// A module namespace the host just created
#[derive(Debug, Clone)]
pub struct NamespaceCreated {
    /// Specifier the module was imported with
    pub specifier: String,
    pub path: PathBuf,
    /// Dependency root as the host resolved it
    pub base_dir: Option<PathBuf>,
    pub format: ModuleFormat,
    pub namespace: Value,
}

pub struct ObjectCreatedAdapter {
    engine: Arc<Engine>,
}

impl ObjectCreatedAdapter {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// The namespace the host should expose for `event`
    pub async fn on_namespace_created(&self, event: NamespaceCreated) -> Value {
        let loader_config = &self.engine.config().loader;
        let is_builtin =
            event.format == ModuleFormat::Builtin || event.specifier.starts_with(loader_config.builtin_prefix.as_str());
        if is_builtin {
            let name = loader_config.builtin_name(&event.specifier);
            let generation = self.engine.snapshot();
            return patch_builtin(
                name,
                event.namespace,
                generation.index.builtin_interceptors(name),
                &generation.builtin_cache,
                self.engine.agent(),
                Adapter::ObjectCreated,
            );
        }

        let namespace = event.namespace.clone();
        match self.patch_dependency(&event).await {
            Ok(Some(patched)) => patched,
            Ok(None) => namespace,
            Err(err) => {
                warn!("Failed to intercept {}: {}", event.path.display(), err);
                self.engine.agent().on_failed_to_wrap_module(&event.specifier, &err);
                namespace
            }
        }
    }

    async fn patch_dependency(&self, event: &NamespaceCreated) -> Result<Option<Value>> {
        let marker = &self.engine.config().loader.dependency_dir_marker;
        let Some(identity) = event_identity(event, marker) else {
            return Ok(None);
        };

        let generation = self.engine.snapshot();
        if !generation.index.has_dependency(&identity.name) {
            return Ok(None);
        }

        let cache_key = format!("{}:{}", event.format.as_str(), event.path.to_string_lossy());
        if let Some(cached) = generation.package_cache.get(&cache_key) {
            metrics::record_cache_hit(Adapter::ObjectCreated);
            return Ok(Some(cached));
        }

        // The regular loader may be patched; read through the back channel
        let manifest = self.engine.manifests().read(&identity.base).await?;
        let version = match manifest.installed_version(&identity.name) {
            Ok(version) => version,
            Err(err) => {
                debug!("Not instrumenting {}: {}", identity.name, err);
                return Ok(None);
            }
        };

        let agent = self.engine.agent();
        agent.on_package_required(&identity.name, &version);
        let supported = generation.index.supports_version(&identity.name, &version);
        agent.on_package_wrapped(&identity.name, &version, supported);

        let matching = generation.index.matching_hooks(&identity.name, &version);
        if matching.is_empty() {
            return Ok(None);
        }

        let is_esm = event.format == ModuleFormat::Module;
        let interceptors: Vec<RequireInterceptor> =
            if is_main_file(&identity, Some(&event.specifier), &event.path, &manifest, is_esm) {
                matching
                    .iter()
                    .flat_map(|hook| hook.main_interceptors().iter().cloned())
                    .collect()
            } else {
                matching
                    .iter()
                    .filter_map(|hook| hook.file_interceptor(&identity.path).cloned())
                    .collect()
            };
        if interceptors.is_empty() {
            return Ok(None);
        }

        let info = WrapPackageInfo::external(&identity.name, &version, &identity.base, &identity.path);
        let patched = execute_interceptors(
            &interceptors,
            event.namespace.clone(),
            Some(CacheSlot::new(&generation.package_cache, &cache_key)),
            &info,
            agent,
        );
        metrics::record_module_wrapped(Adapter::ObjectCreated);
        Ok(Some(patched))
    }
}

/// Identity from the event path, re-rooted at the event's base directory
fn event_identity(event: &NamespaceCreated, marker: &str) -> Option<ModuleIdentity> {
    let mut identity = module_identity_from_path(&event.path, marker)?;
    let Some(base) = &event.base_dir else {
        return Some(identity);
    };

    if let Ok(relative) = event.path.strip_prefix(base) {
        let segments: Vec<String> = relative
            .components()
            .filter_map(|component| match component {
                Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if !segments.is_empty() {
            identity.base = base.clone();
            identity.path = segments.join("/");
        }
    }
    Some(identity)
}
