// src/hooks/registry.rs
//! Hook registry
//!
//! Mutable builder populated by the agent at startup. Nothing here performs
//! I/O; the registry is compiled into an immutable index before use.

use crate::hooks::file_instruction::{FileInstrumentation, FunctionHook};
use crate::hooks::interceptor::{RequireInterceptor, WrapPackageInfo};
use crate::hooks::subject::Subject;
use crate::hooks::version_range::VersionRange;
use crate::runtime::{AgentHandle, Value};
use crate::utils::errors::{EngineError, Result};
use std::sync::Arc;
use tracing::debug;

/// Everything the agent wants intercepted
#[derive(Debug, Default)]
pub struct HookRegistry {
    dependencies: Vec<HookedDependency>,
    builtins: Vec<BuiltinModule>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or fetch) a dependency by package name
    ///
    /// Names are unique: registering the same name again returns the
    /// existing entry so further ranges accumulate on it.
    pub fn add_dependency(&mut self, name: &str) -> Result<&mut HookedDependency> {
        let name = name.trim();
        if name.is_empty() {
            return Err(EngineError::InvalidName(
                "dependency name must not be empty".to_string(),
            ));
        }

        match self.dependencies.iter().position(|d| d.name == name) {
            Some(index) => Ok(&mut self.dependencies[index]),
            None => {
                debug!("Registering dependency {}", name);
                self.dependencies.push(HookedDependency::new(name));
                let last = self.dependencies.len() - 1;
                Ok(&mut self.dependencies[last])
            }
        }
    }

    /// Register (or fetch) a builtin module; a `node:` prefix is ignored
    pub fn add_builtin(&mut self, name: &str) -> Result<&mut BuiltinModule> {
        let name = name.trim();
        let name = name.strip_prefix("node:").unwrap_or(name);
        if name.is_empty() {
            return Err(EngineError::InvalidName(
                "builtin name must not be empty".to_string(),
            ));
        }

        match self.builtins.iter().position(|b| b.name == name) {
            Some(index) => Ok(&mut self.builtins[index]),
            None => {
                self.builtins.push(BuiltinModule::new(name));
                let last = self.builtins.len() - 1;
                Ok(&mut self.builtins[last])
            }
        }
    }

    pub fn dependencies(&self) -> &[HookedDependency] {
        &self.dependencies
    }

    pub fn builtins(&self) -> &[BuiltinModule] {
        &self.builtins
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.builtins.is_empty()
    }
}

/// A third-party package, keyed by its published name
#[derive(Debug)]
pub struct HookedDependency {
    name: String,
    versions: Vec<VersionedHook>,
}

impl HookedDependency {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            versions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start a hook set that applies when the installed version satisfies `range`
    pub fn with_versions(&mut self, range: &str) -> Result<&mut VersionedHook> {
        let range = VersionRange::parse(range)?;
        self.versions.push(VersionedHook::new(range));
        let last = self.versions.len() - 1;
        Ok(&mut self.versions[last])
    }

    /// Versioned hook sets in registration order
    pub fn versions(&self) -> &[VersionedHook] {
        &self.versions
    }
}

/// Hooks that apply to one version range of a dependency
#[derive(Debug)]
pub struct VersionedHook {
    range: VersionRange,
    subjects: Vec<Subject>,
    require_interceptors: Vec<RequireInterceptorEntry>,
    file_interceptors: Vec<(String, RequireInterceptorEntry)>,
    file_instrumentations: Vec<FileInstrumentation>,
    import_side_effect: Option<Subject>,
}

/// Debug-printable wrapper around a raw require interceptor
#[derive(Clone)]
pub(crate) struct RequireInterceptorEntry(pub(crate) RequireInterceptor);

impl std::fmt::Debug for RequireInterceptorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RequireInterceptor")
    }
}

impl VersionedHook {
    fn new(range: VersionRange) -> Self {
        Self {
            range,
            subjects: Vec::new(),
            require_interceptors: Vec::new(),
            file_interceptors: Vec::new(),
            file_instrumentations: Vec::new(),
            import_side_effect: None,
        }
    }

    pub fn range(&self) -> &VersionRange {
        &self.range
    }

    /// Add an object to patch once the package's main file has loaded
    pub fn add_subject<S>(&mut self, selector: S) -> &mut Subject
    where
        S: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.subjects.push(Subject::new(selector));
        let last = self.subjects.len() - 1;
        &mut self.subjects[last]
    }

    /// Raw interceptor for the package's main file
    pub fn on_require<F>(&mut self, interceptor: F) -> &mut Self
    where
        F: Fn(&Value, &WrapPackageInfo, &AgentHandle) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.require_interceptors
            .push(RequireInterceptorEntry(Arc::new(interceptor)));
        self
    }

    /// Raw interceptor for a file other than the main file
    pub fn on_file_require<F>(&mut self, path: &str, interceptor: F) -> Result<&mut Self>
    where
        F: Fn(&Value, &WrapPackageInfo, &AgentHandle) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        let path = normalize_relative_path(path)?;
        if self.file_interceptors.iter().any(|(p, _)| *p == path) {
            return Err(EngineError::DuplicateInterceptor(path));
        }
        self.file_interceptors
            .push((path, RequireInterceptorEntry(Arc::new(interceptor))));
        Ok(self)
    }

    pub fn add_file_instrumentation(&mut self, mut file: FileInstrumentation) -> Result<&mut Self> {
        file.path = normalize_relative_path(&file.path)?;
        if self.file_instrumentations.iter().any(|f| f.path == file.path) {
            return Err(EngineError::DuplicateInterceptor(file.path));
        }
        validate_functions(&file.functions)?;
        self.file_instrumentations.push(file);
        Ok(self)
    }

    /// Apply the same function hooks to several files
    ///
    /// All paths are validated before any is added.
    pub fn add_multi_file_instrumentation(
        &mut self,
        paths: &[&str],
        functions: Vec<FunctionHook>,
    ) -> Result<&mut Self> {
        validate_functions(&functions)?;
        let mut normalized: Vec<String> = Vec::with_capacity(paths.len());
        for path in paths {
            let path = normalize_relative_path(path)?;
            if normalized.contains(&path) || self.file_instrumentations.iter().any(|f| f.path == path) {
                return Err(EngineError::DuplicateInterceptor(path));
            }
            normalized.push(path);
        }

        for path in normalized {
            self.file_instrumentations.push(FileInstrumentation {
                path,
                functions: functions.clone(),
                access_local_variables: None,
            });
        }
        Ok(self)
    }

    /// Subject for packages whose exports object is itself callable
    ///
    /// The exports are replaced by a wrapper that keeps every property of
    /// the original.
    pub fn on_import(&mut self) -> &mut Subject {
        self.import_side_effect.get_or_insert_with(Subject::exports)
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn file_instrumentations(&self) -> &[FileInstrumentation] {
        &self.file_instrumentations
    }

    pub fn import_side_effect(&self) -> Option<&Subject> {
        self.import_side_effect.as_ref()
    }

    pub(crate) fn require_interceptors(&self) -> impl Iterator<Item = &RequireInterceptor> {
        self.require_interceptors.iter().map(|entry| &entry.0)
    }

    pub(crate) fn file_interceptors(&self) -> impl Iterator<Item = (&str, &RequireInterceptor)> {
        self.file_interceptors
            .iter()
            .map(|(path, entry)| (path.as_str(), &entry.0))
    }
}

/// A module shipped with the host runtime
#[derive(Debug)]
pub struct BuiltinModule {
    name: String,
    subjects: Vec<Subject>,
    require_interceptors: Vec<RequireInterceptorEntry>,
}

impl BuiltinModule {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subjects: Vec::new(),
            require_interceptors: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_subject<S>(&mut self, selector: S) -> &mut Subject
    where
        S: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        self.subjects.push(Subject::new(selector));
        let last = self.subjects.len() - 1;
        &mut self.subjects[last]
    }

    pub fn on_require<F>(&mut self, interceptor: F) -> &mut Self
    where
        F: Fn(&Value, &WrapPackageInfo, &AgentHandle) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.require_interceptors
            .push(RequireInterceptorEntry(Arc::new(interceptor)));
        self
    }

    pub fn subjects(&self) -> &[Subject] {
        &self.subjects
    }

    pub(crate) fn require_interceptors(&self) -> impl Iterator<Item = &RequireInterceptor> {
        self.require_interceptors.iter().map(|entry| &entry.0)
    }
}

/// Validate and normalize a dependency-relative file path
///
/// Rejects empty, absolute and `..` paths; strips a leading `./`.
pub fn normalize_relative_path(path: &str) -> Result<String> {
    let normalized = path.trim().replace('\\', "/");
    if normalized.is_empty() {
        return Err(EngineError::invalid_path(path, "path must not be empty"));
    }
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return Err(EngineError::invalid_path(path, "path must be relative"));
    }

    let stripped = normalized.strip_prefix("./").unwrap_or(&normalized);
    if stripped.split('/').any(|segment| segment == "..") {
        return Err(EngineError::invalid_path(path, "path must not contain '..'"));
    }
    if stripped.is_empty() {
        return Err(EngineError::invalid_path(path, "path must not be empty"));
    }

    Ok(stripped.to_string())
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

fn validate_functions(functions: &[FunctionHook]) -> Result<()> {
    if functions.iter().any(|f| f.name.trim().is_empty()) {
        return Err(EngineError::InvalidName(
            "function name must not be empty".to_string(),
        ));
    }
    Ok(())
}
