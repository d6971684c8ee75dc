// src/compiler/index.rs
//! The compiled, read-only view of a hook registry

use crate::hooks::interceptor::{InspectFn, LocalVariablesFn, ModifyArgumentsFn, ModifyReturnValueFn, RequireInterceptor};
use crate::hooks::version_range::VersionRange;
use crate::transform::{FileInstructions, OperationKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Callbacks behind one injected function identifier
#[derive(Clone)]
pub struct CallbackBundle {
    pub dependency: String,
    pub file_path: String,
    pub function_name: String,
    pub operation_kind: Option<OperationKind>,
    pub inspect_args: Option<InspectFn>,
    pub modify_args: Option<ModifyArgumentsFn>,
    pub modify_return_value: Option<ModifyReturnValueFn>,
}

impl CallbackBundle {
    /// `dependency.function` used when reporting
    pub fn operation(&self) -> String {
        format!("{}.{}", self.dependency, self.function_name)
    }
}

impl fmt::Debug for CallbackBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackBundle")
            .field("dependency", &self.dependency)
            .field("file_path", &self.file_path)
            .field("function_name", &self.function_name)
            .field("operation_kind", &self.operation_kind)
            .finish_non_exhaustive()
    }
}

/// Callback behind a file-level identifier
#[derive(Clone)]
pub struct FileCallbackBundle {
    pub dependency: String,
    pub file_path: String,
    pub names: Vec<String>,
    pub callback: LocalVariablesFn,
}

/// Source rewrite instructions with their parsed range
#[derive(Debug, Clone)]
pub struct CompiledFileInstructions {
    pub range: VersionRange,
    pub instructions: FileInstructions,
}

/// Object-patching interceptors of one versioned hook
#[derive(Clone)]
pub struct CompiledVersionedHook {
    pub range: VersionRange,
    main_interceptors: Vec<RequireInterceptor>,
    file_interceptors: HashMap<String, RequireInterceptor>,
}

impl CompiledVersionedHook {
    pub(crate) fn new(
        range: VersionRange,
        main_interceptors: Vec<RequireInterceptor>,
        file_interceptors: HashMap<String, RequireInterceptor>,
    ) -> Self {
        Self {
            range,
            main_interceptors,
            file_interceptors,
        }
    }

    /// Interceptors for the package's main file, in registration order
    pub fn main_interceptors(&self) -> &[RequireInterceptor] {
        &self.main_interceptors
    }

    pub fn file_interceptor(&self, path: &str) -> Option<&RequireInterceptor> {
        self.file_interceptors.get(path)
    }
}

#[derive(Default)]
pub struct CompiledIndex {
    pub(crate) by_dependency_name: HashMap<String, Vec<CompiledFileInstructions>>,
    pub(crate) by_identifier: HashMap<String, Arc<CallbackBundle>>,
    pub(crate) by_builtin_name: HashMap<String, Vec<RequireInterceptor>>,
    pub(crate) by_file_identifier: HashMap<String, Arc<FileCallbackBundle>>,
    pub(crate) packages: HashMap<String, Vec<CompiledVersionedHook>>,
}

impl CompiledIndex {
    /// First registered instructions whose range admits `version` for this file
    ///
    /// Overlapping ranges are not merged: the earliest registration wins.
    pub fn file_instructions(&self, dependency: &str, version: &str, path: &str) -> Option<&FileInstructions> {
        self.by_dependency_name
            .get(dependency)?
            .iter()
            .find(|entry| entry.instructions.path == path && entry.range.satisfies(version))
            .map(|entry| &entry.instructions)
    }

    pub fn callbacks(&self, identifier: &str) -> Option<Arc<CallbackBundle>> {
        self.by_identifier.get(identifier).cloned()
    }

    pub fn file_callbacks(&self, identifier: &str) -> Option<Arc<FileCallbackBundle>> {
        self.by_file_identifier.get(identifier).cloned()
    }

    pub fn builtin_interceptors(&self, name: &str) -> &[RequireInterceptor] {
        self.by_builtin_name
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_builtin(&self, name: &str) -> bool {
        self.by_builtin_name.contains_key(name)
    }

    pub fn has_dependency(&self, name: &str) -> bool {
        self.packages.contains_key(name) || self.by_dependency_name.contains_key(name)
    }

    /// Object-patching hooks whose range admits `version`
    pub fn matching_hooks(&self, name: &str, version: &str) -> Vec<&CompiledVersionedHook> {
        self.packages
            .get(name)
            .map(|hooks| hooks.iter().filter(|h| h.range.satisfies(version)).collect())
            .unwrap_or_default()
    }

    /// Whether any registration for `name` covers `version`
    pub fn supports_version(&self, name: &str, version: &str) -> bool {
        let patched = self
            .packages
            .get(name)
            .is_some_and(|hooks| hooks.iter().any(|h| h.range.satisfies(version)));
        let rewritten = self
            .by_dependency_name
            .get(name)
            .is_some_and(|files| files.iter().any(|f| f.range.satisfies(version)));
        patched || rewritten
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.by_dependency_name.is_empty() && self.by_builtin_name.is_empty()
    }
}

impl fmt::Debug for CompiledIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledIndex")
            .field("packages", &self.packages.len())
            .field("rewritten_dependencies", &self.by_dependency_name.len())
            .field("identifiers", &self.by_identifier.len())
            .field("builtins", &self.by_builtin_name.len())
            .finish()
    }
}
