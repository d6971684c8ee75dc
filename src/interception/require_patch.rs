// src/interception/require_patch.rs
//! Synchronous load interception
//!
//! Replaces the host's primary loader with a [`PatchedLoader`] that lets the
//! original load each module, then runs the matching interceptors over the
//! exports before handing them back.

use crate::engine::Engine;
use crate::hooks::interceptor::{RequireInterceptor, WrapPackageInfo};
use crate::interception::cache::CacheSlot;
use crate::interception::executor::{execute_interceptors, patch_builtin};
use crate::interception::manifest::is_main_file;
use crate::interception::module_info::module_identity_from_path;
use crate::observability::metrics::{self, Adapter};
use crate::runtime::{HostError, Value};
use crate::utils::errors::{EngineError, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The host's module loader
pub trait ModuleLoader: Send + Sync {
    /// Resolve a specifier to an absolute filename
    fn resolve_filename(&self, specifier: &str, parent: Option<&Path>) -> std::result::Result<PathBuf, HostError>;

    /// Load (or fetch from the host's own cache) and evaluate a module
    fn load(&self, specifier: &str, parent: Option<&Path>) -> std::result::Result<Value, HostError>;

    fn is_builtin(&self, specifier: &str) -> bool;

    /// Export names of a builtin module, if the host can list them
    fn builtin_export_names(&self, _name: &str) -> Option<Vec<String>> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InstallationState {
    Uninstalled = 0,
    Installed = 1,
}

/// The host's single loader entry point, which can be swapped once
pub struct LoaderEntryPoint {
    current: RwLock<Arc<dyn ModuleLoader>>,
    state: AtomicU8,
}

impl LoaderEntryPoint {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            current: RwLock::new(loader),
            state: AtomicU8::new(InstallationState::Uninstalled as u8),
        }
    }

    /// Load through whichever loader is currently installed
    pub fn require(&self, specifier: &str, parent: Option<&Path>) -> std::result::Result<Value, HostError> {
        let loader = self.current();
        loader.load(specifier, parent)
    }

    pub fn current(&self) -> Arc<dyn ModuleLoader> {
        self.current.read().clone()
    }

    pub fn state(&self) -> InstallationState {
        match self.state.load(Ordering::Acquire) {
            1 => InstallationState::Installed,
            _ => InstallationState::Uninstalled,
        }
    }

    fn claim_installation(&self) -> bool {
        self.state
            .compare_exchange(
                InstallationState::Uninstalled as u8,
                InstallationState::Installed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Installs the patched loader on an entry point
pub struct RequirePatch {
    engine: Arc<Engine>,
}

impl RequirePatch {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Wrap the entry point's loader; later calls are no-ops
    ///
    /// Returns `true` if this call installed the patch.
    pub fn install(&self, entry: &LoaderEntryPoint) -> bool {
        if !entry.claim_installation() {
            debug!("Loader already patched");
            return false;
        }

        let mut current = entry.current.write();
        let patched = PatchedLoader::new(current.clone(), self.engine.clone());
        *current = Arc::new(patched);
        info!("Patched module loader");
        true
    }
}

/// Loader that runs interceptors over what the original loader returns
pub struct PatchedLoader {
    original: Arc<dyn ModuleLoader>,
    engine: Arc<Engine>,
}

impl PatchedLoader {
    pub fn new(original: Arc<dyn ModuleLoader>, engine: Arc<Engine>) -> Self {
        Self { original, engine }
    }

    fn intercept(&self, specifier: &str, parent: Option<&Path>, exports: Value) -> Value {
        let result = if self.original.is_builtin(specifier) {
            Ok(self.patch_builtin(specifier, exports.clone()))
        } else {
            self.patch_package(specifier, parent, exports.clone())
        };

        match result {
            Ok(patched) => patched,
            Err(err) => {
                warn!("Failed to intercept {}: {}", specifier, err);
                self.engine.agent().on_failed_to_wrap_module(specifier, &err);
                exports
            }
        }
    }

    fn patch_builtin(&self, specifier: &str, exports: Value) -> Value {
        let name = self.engine.config().loader.builtin_name(specifier);
        let generation = self.engine.snapshot();
        let interceptors = generation.index.builtin_interceptors(name);

        patch_builtin(
            name,
            exports,
            interceptors,
            &generation.builtin_cache,
            self.engine.agent(),
            Adapter::Require,
        )
    }

    fn patch_package(&self, specifier: &str, parent: Option<&Path>, exports: Value) -> Result<Value> {
        let loader_config = &self.engine.config().loader;
        let filename = self
            .original
            .resolve_filename(specifier, parent)
            .map_err(|e| EngineError::Loader(e.to_string()))?;
        if loader_config.is_ignored(&filename) {
            return Ok(exports);
        }

        let generation = self.engine.snapshot();
        let key = filename.to_string_lossy();
        if let Some(cached) = generation.package_cache.get(&key) {
            metrics::record_cache_hit(Adapter::Require);
            return Ok(cached);
        }

        let Some(identity) = module_identity_from_path(&filename, &loader_config.dependency_dir_marker) else {
            return Ok(exports);
        };
        if !generation.index.has_dependency(&identity.name) {
            return Ok(exports);
        }

        let manifest = self.engine.manifests().read_blocking(&identity.base)?;
        let version = match manifest.installed_version(&identity.name) {
            Ok(version) => version,
            Err(err) => {
                debug!("Not instrumenting {}: {}", identity.name, err);
                return Ok(exports);
            }
        };

        let agent = self.engine.agent();
        agent.on_package_required(&identity.name, &version);

        let matching = generation.index.matching_hooks(&identity.name, &version);
        let supported = generation.index.supports_version(&identity.name, &version);
        agent.on_package_wrapped(&identity.name, &version, supported);
        if matching.is_empty() {
            return Ok(exports);
        }

        let interceptors: Vec<RequireInterceptor> =
            if is_main_file(&identity, Some(specifier), &filename, &manifest, false) {
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

        let info = WrapPackageInfo::external(&identity.name, &version, &identity.base, &identity.path);
        let patched = execute_interceptors(
            &interceptors,
            exports,
            Some(CacheSlot::new(&generation.package_cache, &key)),
            &info,
            agent,
        );
        if !interceptors.is_empty() {
            debug!("Wrapped {}@{} ({})", identity.name, version, identity.path);
            metrics::record_module_wrapped(Adapter::Require);
        }
        Ok(patched)
    }
}

impl ModuleLoader for PatchedLoader {
    fn resolve_filename(&self, specifier: &str, parent: Option<&Path>) -> std::result::Result<PathBuf, HostError> {
        self.original.resolve_filename(specifier, parent)
    }

    fn load(&self, specifier: &str, parent: Option<&Path>) -> std::result::Result<Value, HostError> {
        let exports = self.original.load(specifier, parent)?;
        Ok(self.intercept(specifier, parent, exports))
    }

    fn is_builtin(&self, specifier: &str) -> bool {
        self.original.is_builtin(specifier)
    }

    fn builtin_export_names(&self, name: &str) -> Option<Vec<String>> {
        self.original.builtin_export_names(name)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeLoader, StaticManifests};
    use super::*;
    use crate::hooks::HookRegistry;
    use crate::runtime::agent::testing::RecordingAgent;
    use crate::runtime::ObjectRef;
    use crate::utils::config::EngineConfig;
    use parking_lot::Mutex;

    const PG_MAIN: &str = "/app/node_modules/pg/lib/index.js";

    fn pg_exports() -> Value {
        let client = ObjectRef::new();
        client.set("query", Value::function("query", |_, args| Ok(args.into_iter().next().unwrap_or_default())));
        let exports = ObjectRef::new();
        exports.set("Client", client);
        Value::Object(exports)
    }

    fn engine(version: &str, agent: Arc<RecordingAgent>) -> Arc<Engine> {
        let manifests = StaticManifests::default().with("/app/node_modules/pg", "pg", version);
        Arc::new(Engine::new(EngineConfig::default(), agent).with_manifest_source(Arc::new(manifests)))
    }

    fn counting_registry(calls: Arc<Mutex<usize>>) -> HookRegistry {
        let mut registry = HookRegistry::new();
        registry
            .add_dependency("pg")
            .unwrap()
            .with_versions("^8.0.0")
            .unwrap()
            .on_require(move |_, _, _| {
                *calls.lock() += 1;
                Ok(None)
            });
        registry
    }

    #[test]
    fn test_install_is_idempotent() {
        let calls = Arc::new(Mutex::new(0));
        let engine = engine("8.11.0", Arc::new(RecordingAgent::default()));
        engine.register(&counting_registry(calls.clone()));

        let loader = Arc::new(FakeLoader::default().with_module("pg", PG_MAIN, pg_exports()));
        let entry = LoaderEntryPoint::new(loader);
        let patch = RequirePatch::new(engine.clone());

        assert!(patch.install(&entry));
        assert!(!patch.install(&entry));
        assert!(!RequirePatch::new(engine).install(&entry));
        assert_eq!(entry.state(), InstallationState::Installed);

        entry.require("pg", None).unwrap();
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_exactly_once_per_generation() {
        let calls = Arc::new(Mutex::new(0));
        let engine = engine("8.11.0", Arc::new(RecordingAgent::default()));
        engine.register(&counting_registry(calls.clone()));

        let entry = LoaderEntryPoint::new(Arc::new(FakeLoader::default().with_module("pg", PG_MAIN, pg_exports())));
        RequirePatch::new(engine.clone()).install(&entry);

        let first = entry.require("pg", None).unwrap();
        let second = entry.require("pg", None).unwrap();
        assert_eq!(*calls.lock(), 1);
        assert!(first.same(&second));

        // A new registration starts with empty caches
        engine.register(&counting_registry(calls.clone()));
        entry.require("pg", None).unwrap();
        assert_eq!(*calls.lock(), 2);
    }

    #[test]
    fn test_version_gating() {
        let calls = Arc::new(Mutex::new(0));
        let recording = Arc::new(RecordingAgent::default());
        let engine = engine("7.18.2", recording.clone());
        engine.register(&counting_registry(calls.clone()));

        let entry = LoaderEntryPoint::new(Arc::new(FakeLoader::default().with_module("pg", PG_MAIN, pg_exports())));
        RequirePatch::new(engine).install(&entry);
        entry.require("pg", None).unwrap();

        assert_eq!(*calls.lock(), 0);
        assert_eq!(
            *recording.wrapped.lock(),
            vec![("pg".to_string(), "7.18.2".to_string(), false)]
        );
    }

    #[test]
    fn test_reentrant_load_from_interceptor() {
        let calls = Arc::new(Mutex::new(0));
        let engine = engine("8.11.0", Arc::new(RecordingAgent::default()));
        let loader = Arc::new(FakeLoader::default().with_module("pg", PG_MAIN, pg_exports()));
        let entry = Arc::new(LoaderEntryPoint::new(loader));

        let mut registry = HookRegistry::new();
        let entry_in = entry.clone();
        let calls_in = calls.clone();
        registry
            .add_dependency("pg")
            .unwrap()
            .with_versions("^8.0.0")
            .unwrap()
            .on_require(move |exports, _, _| {
                *calls_in.lock() += 1;
                let again = entry_in.require("pg", None).map_err(|e| anyhow::anyhow!(e))?;
                anyhow::ensure!(again.same(exports), "re-entrant load returned different exports");
                Ok(None)
            });
        engine.register(&registry);

        RequirePatch::new(engine).install(&entry);
        entry.require("pg", None).unwrap();
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_file_interceptor_for_non_main_file() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let engine = engine("8.11.0", Arc::new(RecordingAgent::default()));
        let calls_in = calls.clone();

        let mut registry = HookRegistry::new();
        registry
            .add_dependency("pg")
            .unwrap()
            .with_versions("^8.0.0")
            .unwrap()
            .on_file_require("lib/native/client.js", move |_, info, _| {
                calls_in.lock().push(info.path.clone().unwrap_or_default());
                Ok(None)
            })
            .unwrap();
        engine.register(&registry);

        let loader = FakeLoader::default()
            .with_module("pg", PG_MAIN, pg_exports())
            .with_module("./native/client", "/app/node_modules/pg/lib/native/client.js", Value::object());
        let entry = LoaderEntryPoint::new(Arc::new(loader));
        RequirePatch::new(engine).install(&entry);

        entry.require("pg", None).unwrap();
        entry.require("./native/client", None).unwrap();
        assert_eq!(*calls.lock(), vec!["lib/native/client.js".to_string()]);
    }

    #[test]
    fn test_subject_wrapping_through_loader() {
        let recording = Arc::new(RecordingAgent::blocking());
        let engine = engine("8.11.0", recording.clone());

        let mut registry = HookRegistry::new();
        registry
            .add_dependency("pg")
            .unwrap()
            .with_versions("^8.0.0")
            .unwrap()
            .add_subject(|exports| exports.get("Client"))
            .inspect("query", |args, _, _| {
                let sql = args.first().and_then(Value::as_str).unwrap_or_default();
                Ok(sql.contains("' OR ").then(|| crate::runtime::Violation {
                    kind: crate::runtime::ViolationKind::SqlInjection,
                    operation: "pg.query".to_string(),
                    path: ".[0]".to_string(),
                    payload: Some(sql.to_string()),
                }))
            })
            .unwrap();
        engine.register(&registry);

        let entry = LoaderEntryPoint::new(Arc::new(FakeLoader::default().with_module("pg", PG_MAIN, pg_exports())));
        RequirePatch::new(engine).install(&entry);

        let query = entry.require("pg", None).unwrap().get("Client").unwrap().get("query").unwrap();
        assert!(query.call(&Value::Undefined, vec!["SELECT 1".into()]).is_ok());
        assert!(matches!(
            query.call(&Value::Undefined, vec!["1' OR 1=1".into()]),
            Err(HostError::Blocked(_))
        ));
    }

    #[test]
    fn test_builtin_interception() {
        let recording = Arc::new(RecordingAgent::default());
        let engine = engine("8.11.0", recording.clone());
        let calls = Arc::new(Mutex::new(0));
        let calls_in = calls.clone();

        let mut registry = HookRegistry::new();
        registry.add_builtin("child_process").unwrap().on_require(move |_, info, _| {
            assert!(info.is_builtin());
            *calls_in.lock() += 1;
            Ok(None)
        });
        engine.register(&registry);

        let loader = FakeLoader::default().with_builtin("child_process", Value::object());
        let entry = LoaderEntryPoint::new(Arc::new(loader));
        RequirePatch::new(engine).install(&entry);

        entry.require("node:child_process", None).unwrap();
        entry.require("child_process", None).unwrap();
        assert_eq!(*calls.lock(), 1);
        assert_eq!(*recording.builtins.lock(), vec!["child_process".to_string()]);
    }

    #[test]
    fn test_manifest_failure_is_reported() {
        let recording = Arc::new(RecordingAgent::default());
        let calls = Arc::new(Mutex::new(0));
        let engine = Arc::new(
            Engine::new(EngineConfig::default(), recording.clone())
                .with_manifest_source(Arc::new(StaticManifests::default())),
        );
        engine.register(&counting_registry(calls.clone()));

        let exports = pg_exports();
        let entry = LoaderEntryPoint::new(Arc::new(FakeLoader::default().with_module("pg", PG_MAIN, exports.clone())));
        RequirePatch::new(engine).install(&entry);

        let loaded = entry.require("pg", None).unwrap();
        assert!(loaded.same(&exports));
        assert_eq!(*calls.lock(), 0);
        assert_eq!(recording.failure_count(), 1);
    }

    #[test]
    fn test_application_and_json_files_pass_through() {
        let calls = Arc::new(Mutex::new(0));
        let engine = engine("8.11.0", Arc::new(RecordingAgent::default()));
        engine.register(&counting_registry(calls.clone()));

        let loader = FakeLoader::default()
            .with_module("./server", "/app/src/server.js", Value::object())
            .with_module("pg/package.json", "/app/node_modules/pg/package.json", Value::object());
        let entry = LoaderEntryPoint::new(Arc::new(loader));
        RequirePatch::new(engine.clone()).install(&entry);

        entry.require("./server", None).unwrap();
        entry.require("pg/package.json", None).unwrap();
        assert_eq!(*calls.lock(), 0);
        assert!(engine.snapshot().package_cache.is_empty());
    }
}
