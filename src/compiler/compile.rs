// src/compiler/compile.rs
//! Registry to index compilation

use crate::compiler::index::{
    CallbackBundle, CompiledFileInstructions, CompiledIndex, CompiledVersionedHook, FileCallbackBundle,
};
use crate::hooks::interceptor::RequireInterceptor;
use crate::hooks::registry::{HookRegistry, VersionedHook};
use crate::hooks::subject::Subject;
use crate::hooks::wrap::{wrap_root_callable, wrap_subject};
use crate::transform::{FileInstructions, FunctionInstructions};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Identifier baked into rewritten source for one function
pub fn function_identifier(dependency: &str, path: &str, function: &str, range: &str) -> String {
    format!("{}.{}.{}.{}", dependency, path, function, range)
}

/// Identifier baked into rewritten source for file-level callbacks
pub fn file_identifier(dependency: &str, path: &str, range: &str) -> String {
    format!("{}.{}.{}", dependency, path, range)
}

/// Flatten a registry into lookup tables
///
/// Pure: the registry is not modified and can be compiled again.
pub fn compile(registry: &HookRegistry) -> CompiledIndex {
    let mut index = CompiledIndex::default();

    for dependency in registry.dependencies() {
        let name = dependency.name();
        for versioned in dependency.versions() {
            compile_object_hooks(&mut index, name, versioned);
            compile_file_instrumentations(&mut index, name, versioned);
        }
    }

    for builtin in registry.builtins() {
        let mut interceptors: Vec<RequireInterceptor> = builtin.require_interceptors().cloned().collect();
        interceptors.extend(builtin.subjects().iter().cloned().map(subject_interceptor));
        if interceptors.is_empty() {
            continue;
        }
        index
            .by_builtin_name
            .insert(builtin.name().to_string(), interceptors);
    }

    info!(
        "Compiled hooks for {} dependencies, {} instrumented functions, {} builtins",
        registry.dependencies().len(),
        index.by_identifier.len(),
        index.by_builtin_name.len()
    );
    index
}

fn compile_object_hooks(index: &mut CompiledIndex, name: &str, versioned: &VersionedHook) {
    // Raw interceptors first, then subjects; the callable-root wrapper runs
    // last because it replaces the exports.
    let mut main: Vec<RequireInterceptor> = versioned.require_interceptors().cloned().collect();
    main.extend(versioned.subjects().iter().cloned().map(subject_interceptor));
    if let Some(subject) = versioned.import_side_effect() {
        main.push(import_interceptor(subject.clone()));
    }

    let files: HashMap<String, RequireInterceptor> = versioned
        .file_interceptors()
        .map(|(path, interceptor)| (path.to_string(), interceptor.clone()))
        .collect();

    if main.is_empty() && files.is_empty() {
        return;
    }

    index
        .packages
        .entry(name.to_string())
        .or_default()
        .push(CompiledVersionedHook::new(versioned.range().clone(), main, files));
}

fn compile_file_instrumentations(index: &mut CompiledIndex, name: &str, versioned: &VersionedHook) {
    let range = versioned.range();

    for file in versioned.file_instrumentations() {
        let file_id = file_identifier(name, &file.path, range.raw());

        let mut functions = Vec::with_capacity(file.functions.len());
        for hook in &file.functions {
            let identifier = function_identifier(name, &file.path, &hook.name, range.raw());
            if index.by_identifier.contains_key(&identifier) {
                debug!("Identifier {} already compiled, keeping the first", identifier);
            } else {
                index.by_identifier.insert(
                    identifier.clone(),
                    Arc::new(CallbackBundle {
                        dependency: name.to_string(),
                        file_path: file.path.clone(),
                        function_name: hook.name.clone(),
                        operation_kind: hook.operation_kind,
                        inspect_args: hook.inspect_args.clone(),
                        modify_args: hook.modify_args.clone(),
                        modify_return_value: hook.modify_return_value.clone(),
                    }),
                );
            }

            let modifies = hook.modify_args.is_some();
            functions.push(FunctionInstructions {
                node_type: hook.node_type,
                name: hook.name.clone(),
                identifier,
                inspect_args: hook.inspect_args.is_some(),
                modify_args: modifies && !hook.modify_arguments_object,
                modify_return_value: hook.modify_return_value.is_some(),
                modify_arguments_object: modifies && hook.modify_arguments_object,
            });
        }

        let mut local_variables = Vec::new();
        if let Some(access) = &file.access_local_variables {
            local_variables = access.names.clone();
            index
                .by_file_identifier
                .entry(file_id.clone())
                .or_insert_with(|| {
                    Arc::new(FileCallbackBundle {
                        dependency: name.to_string(),
                        file_path: file.path.clone(),
                        names: access.names.clone(),
                        callback: access.callback.clone(),
                    })
                });
        }

        index
            .by_dependency_name
            .entry(name.to_string())
            .or_default()
            .push(CompiledFileInstructions {
                range: range.clone(),
                instructions: FileInstructions {
                    path: file.path.clone(),
                    version_range: range.raw().to_string(),
                    identifier: file_id,
                    functions,
                    access_local_variables: local_variables,
                },
            });
    }
}

fn subject_interceptor(subject: Subject) -> RequireInterceptor {
    Arc::new(move |exports, info, agent| {
        wrap_subject(exports, &subject, info, agent);
        Ok(None)
    })
}

fn import_interceptor(subject: Subject) -> RequireInterceptor {
    Arc::new(move |exports, info, agent| Ok(wrap_root_callable(exports, &subject, info, agent)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{FileInstrumentation, FunctionHook, LocalVariableAccess};
    use crate::transform::NodeType;

    fn registry_with_baz() -> HookRegistry {
        let mut registry = HookRegistry::new();
        registry
            .add_dependency("foo")
            .unwrap()
            .with_versions("^1.0.0")
            .unwrap()
            .add_file_instrumentation(
                FileInstrumentation::new("bar.js").with_function(
                    FunctionHook::new(NodeType::FunctionDeclaration, "baz").inspect_args(|_, _, _| Ok(None)),
                ),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_identifier_format() {
        let index = compile(&registry_with_baz());
        let bundle = index.callbacks("foo.bar.js.baz.^1.0.0").unwrap();

        assert_eq!(bundle.function_name, "baz");
        assert!(bundle.inspect_args.is_some());
        assert!(bundle.modify_args.is_none());
    }

    #[test]
    fn test_version_gating() {
        let index = compile(&registry_with_baz());

        let instructions = index.file_instructions("foo", "1.1.2", "bar.js").unwrap();
        assert_eq!(instructions.functions[0].identifier, "foo.bar.js.baz.^1.0.0");
        assert!(instructions.functions[0].inspect_args);

        assert!(index.file_instructions("foo", "2.0.0", "bar.js").is_none());
        assert!(index.file_instructions("foo", "", "bar.js").is_none());
        assert!(index.file_instructions("foo", "1.1.2", "other.js").is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = HookRegistry::new();
        let dep = registry.add_dependency("mysql2").unwrap();
        dep.with_versions(">=2.0.0")
            .unwrap()
            .add_file_instrumentation(
                FileInstrumentation::new("lib/connection.js")
                    .with_function(FunctionHook::new(NodeType::MethodDefinition, "query")),
            )
            .unwrap();
        dep.with_versions("^3.0.0")
            .unwrap()
            .add_file_instrumentation(
                FileInstrumentation::new("lib/connection.js")
                    .with_function(FunctionHook::new(NodeType::MethodDefinition, "execute")),
            )
            .unwrap();

        let index = compile(&registry);
        let chosen = index.file_instructions("mysql2", "3.1.0", "lib/connection.js").unwrap();
        assert_eq!(chosen.version_range, ">=2.0.0");
        assert_eq!(chosen.functions[0].name, "query");
    }

    #[test]
    fn test_modify_arguments_object_flag() {
        let mut registry = HookRegistry::new();
        registry
            .add_dependency("axios")
            .unwrap()
            .with_versions("*")
            .unwrap()
            .add_file_instrumentation(
                FileInstrumentation::new("lib/core/Axios.js").with_function(
                    FunctionHook::new(NodeType::MethodDefinition, "request").modify_arguments_object(|a, _, _| Ok(a)),
                ),
            )
            .unwrap();

        let index = compile(&registry);
        let function = &index
            .file_instructions("axios", "1.6.0", "lib/core/Axios.js")
            .unwrap()
            .functions[0];
        assert!(function.modify_arguments_object);
        assert!(!function.modify_args);
    }

    #[test]
    fn test_file_callbacks_compiled() {
        let mut registry = HookRegistry::new();
        registry
            .add_dependency("express")
            .unwrap()
            .with_versions("^4")
            .unwrap()
            .add_file_instrumentation(
                FileInstrumentation::new("lib/express.js")
                    .with_local_variables(LocalVariableAccess::new(vec!["app".into()], |_, _, _| Ok(()))),
            )
            .unwrap();

        let index = compile(&registry);
        let instructions = index.file_instructions("express", "4.18.2", "lib/express.js").unwrap();
        assert_eq!(instructions.identifier, "express.lib/express.js.^4");
        assert_eq!(instructions.access_local_variables, vec!["app"]);
        assert!(index.file_callbacks("express.lib/express.js.^4").is_some());
    }

    #[test]
    fn test_object_hooks_and_builtins() {
        let mut registry = HookRegistry::new();
        registry
            .add_dependency("pg")
            .unwrap()
            .with_versions("^8.0.0")
            .unwrap()
            .on_require(|_, _, _| Ok(None))
            .add_subject(|exports| exports.get("Client"))
            .inspect("query", |_, _, _| Ok(None))
            .unwrap();
        registry
            .add_builtin("child_process")
            .unwrap()
            .add_subject(|exports| Some(exports.clone()))
            .inspect("exec", |_, _, _| Ok(None))
            .unwrap();
        registry.add_builtin("fs").unwrap();

        let index = compile(&registry);
        let hooks = index.matching_hooks("pg", "8.11.0");
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].main_interceptors().len(), 2);
        assert!(index.matching_hooks("pg", "7.0.0").is_empty());
        assert!(index.supports_version("pg", "8.0.1"));
        assert!(!index.supports_version("pg", "9.0.0"));

        assert_eq!(index.builtin_interceptors("child_process").len(), 1);
        assert!(!index.has_builtin("fs"));
        assert!(index.builtin_interceptors("fs").is_empty());
    }
}
