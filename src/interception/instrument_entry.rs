// src/interception/instrument_entry.rs
//! Runtime targets of the calls injected into rewritten sources
//!
//! Rewritten code only carries identifiers. Each entry point looks the
//! identifier up in one snapshot of the current generation and runs the
//! registered callbacks. Callback failures are reported and swallowed; the
//! only error host code can see is a block decision.

use crate::engine::Engine;
use crate::hooks::interceptor::{ModuleKind, WrapPackageInfo};
use crate::hooks::wrap::{report_inspection, report_interceptor_error};
use crate::interception::executor::patch_builtin;
use crate::interception::require_patch::ModuleLoader;
use crate::observability::metrics::Adapter;
use crate::runtime::{HostError, Value};
use crate::utils::errors::EngineError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry points called from instrumented code
pub struct InstrumentEntry {
    engine: Arc<Engine>,
    /// The host loader as it was before any patching
    loader: Arc<dyn ModuleLoader>,
}

impl InstrumentEntry {
    pub fn new(engine: Arc<Engine>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self { engine, loader }
    }

    /// `__instrumentInspectArgs(id, args, dependency, version, fn, this)`
    pub fn inspect_args(
        &self,
        identifier: &str,
        args: &[Value],
        dependency: &str,
        version: &str,
        function_name: &str,
        this: &Value,
    ) -> Result<(), HostError> {
        let generation = self.engine.snapshot();
        let Some(bundle) = generation.index.callbacks(identifier) else {
            debug!("No callbacks for {} ({}@{} {})", identifier, dependency, version, function_name);
            return Ok(());
        };
        let Some(inspect) = &bundle.inspect_args else {
            return Ok(());
        };

        let agent = self.engine.agent();
        let outcome = inspect(args, this, agent);
        report_inspection(agent, &bundle.dependency, &bundle.function_name, outcome)
    }

    /// `__instrumentModifyArgs(id, args, this)`: the arguments to continue with
    pub fn modify_args(&self, identifier: &str, args: Vec<Value>, this: &Value) -> Vec<Value> {
        let generation = self.engine.snapshot();
        let Some(bundle) = generation.index.callbacks(identifier) else {
            return args;
        };
        let Some(modify) = &bundle.modify_args else {
            return args;
        };

        let agent = self.engine.agent();
        match modify(args.clone(), this, agent) {
            Ok(updated) => updated,
            Err(err) => {
                report_interceptor_error(agent, &bundle.dependency, &bundle.function_name, &err);
                args
            }
        }
    }

    /// `__instrumentModifyReturnValue(id, args, value, this)`
    pub fn modify_return_value(&self, identifier: &str, args: &[Value], value: Value, this: &Value) -> Value {
        let generation = self.engine.snapshot();
        let Some(bundle) = generation.index.callbacks(identifier) else {
            return value;
        };
        let Some(modify) = &bundle.modify_return_value else {
            return value;
        };

        let agent = self.engine.agent();
        match modify(args, value.clone(), this, agent) {
            Ok(updated) => updated,
            Err(err) => {
                report_interceptor_error(agent, &bundle.dependency, &bundle.function_name, &err);
                value
            }
        }
    }

    /// `__instrumentAccessLocalVariables(fileId, [values])`
    pub fn access_local_variables(&self, file_identifier: &str, values: &[Value]) {
        let generation = self.engine.snapshot();
        let Some(bundle) = generation.index.file_callbacks(file_identifier) else {
            return;
        };

        let info = WrapPackageInfo {
            name: bundle.dependency.clone(),
            version: None,
            kind: ModuleKind::External,
            base: None,
            path: Some(bundle.file_path.clone()),
        };
        let agent = self.engine.agent();
        if let Err(err) = (bundle.callback)(values, &info, agent) {
            let error = EngineError::interceptor(&bundle.dependency, &err);
            warn!("Local variable access failed for {}: {}", bundle.file_path, error);
            agent.on_failed_to_wrap_module(&bundle.dependency, &error);
        }
    }

    /// `__instrumentPackageLoaded(name, version)`, appended when bundling
    pub fn package_loaded(&self, name: &str, version: &str) {
        self.engine.agent().on_package_required(name, version);
    }

    /// Patch a builtin on behalf of a generated shim
    pub fn wrap_builtin_exports(&self, name: &str, exports: Value) -> Value {
        let name = self.engine.config().loader.builtin_name(name);
        let generation = self.engine.snapshot();
        patch_builtin(
            name,
            exports,
            generation.index.builtin_interceptors(name),
            &generation.builtin_cache,
            self.engine.agent(),
            Adapter::Entry,
        )
    }

    /// The builtin as the unpatched loader returns it
    pub fn builtin_without_patching(&self, name: &str) -> Result<Value, HostError> {
        self.loader.load(name, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{FileInstrumentation, FunctionHook, HookRegistry, LocalVariableAccess};
    use crate::interception::require_patch::testing::FakeLoader;
    use crate::runtime::agent::testing::RecordingAgent;
    use crate::runtime::{Violation, ViolationKind};
    use crate::transform::NodeType;
    use crate::utils::config::EngineConfig;
    use parking_lot::Mutex;

    const QUERY_ID: &str = "mysql.lib/Connection.js.query.^2.0.0";

    fn sql_detector(args: &[Value], _this: &Value, _agent: &crate::runtime::AgentHandle) -> anyhow::Result<Option<Violation>> {
        let sql = args.first().and_then(Value::as_str).unwrap_or_default();
        Ok(sql.contains("' OR ").then(|| Violation {
            kind: ViolationKind::SqlInjection,
            operation: "mysql.query".to_string(),
            path: ".[0]".to_string(),
            payload: Some(sql.to_string()),
        }))
    }

    fn entry(agent: Arc<RecordingAgent>, registry: &HookRegistry, loader: FakeLoader) -> InstrumentEntry {
        let engine = Arc::new(Engine::new(EngineConfig::default(), agent));
        engine.register(registry);
        InstrumentEntry::new(engine, Arc::new(loader))
    }

    fn mysql_registry(hook: FunctionHook) -> HookRegistry {
        let mut registry = HookRegistry::new();
        registry
            .add_dependency("mysql")
            .unwrap()
            .with_versions("^2.0.0")
            .unwrap()
            .add_file_instrumentation(FileInstrumentation::new("lib/Connection.js").with_function(hook))
            .unwrap();
        registry
    }

    #[test]
    fn test_inspect_args_block_decision() {
        let recording = Arc::new(RecordingAgent::blocking());
        let hook = FunctionHook::new(NodeType::MethodDefinition, "query").inspect_args(sql_detector);
        let entry = entry(recording.clone(), &mysql_registry(hook), FakeLoader::default());

        let safe = vec![Value::string("SELECT 1")];
        assert!(entry
            .inspect_args(QUERY_ID, &safe, "mysql", "2.18.1", "query", &Value::Undefined)
            .is_ok());

        let attack = vec![Value::string("1' OR 1=1")];
        let result = entry.inspect_args(QUERY_ID, &attack, "mysql", "2.18.1", "query", &Value::Undefined);
        assert!(matches!(result, Err(HostError::Blocked(v)) if v.kind == ViolationKind::SqlInjection));
        assert_eq!(recording.attacks.lock().len(), 1);
    }

    #[test]
    fn test_inspect_args_allow_decision() {
        let recording = Arc::new(RecordingAgent::default());
        let hook = FunctionHook::new(NodeType::MethodDefinition, "query").inspect_args(sql_detector);
        let entry = entry(recording.clone(), &mysql_registry(hook), FakeLoader::default());

        let attack = vec![Value::string("1' OR 1=1")];
        assert!(entry
            .inspect_args(QUERY_ID, &attack, "mysql", "2.18.1", "query", &Value::Undefined)
            .is_ok());
        assert_eq!(recording.attacks.lock().len(), 1);
    }

    #[test]
    fn test_failing_detector_is_swallowed() {
        let recording = Arc::new(RecordingAgent::blocking());
        let hook = FunctionHook::new(NodeType::MethodDefinition, "query")
            .inspect_args(|_, _, _| Err(anyhow::anyhow!("detector crashed")));
        let entry = entry(recording.clone(), &mysql_registry(hook), FakeLoader::default());

        let result = entry.inspect_args(QUERY_ID, &[], "mysql", "2.18.1", "query", &Value::Undefined);
        assert!(result.is_ok());
        assert_eq!(
            *recording.interceptor_errors.lock(),
            vec![("mysql.query".to_string(), "detector crashed".to_string())]
        );
    }

    #[test]
    fn test_modify_args() {
        let hook = FunctionHook::new(NodeType::MethodDefinition, "query").modify_args(|mut args, _, _| {
            anyhow::ensure!(!args.is_empty(), "no arguments");
            args[0] = Value::string("SELECT 2");
            Ok(args)
        });
        let recording = Arc::new(RecordingAgent::default());
        let entry = entry(recording.clone(), &mysql_registry(hook), FakeLoader::default());

        let updated = entry.modify_args(QUERY_ID, vec![Value::string("SELECT 1")], &Value::Undefined);
        assert_eq!(updated[0].as_str(), Some("SELECT 2"));

        // Failure hands back the original arguments
        assert!(entry.modify_args(QUERY_ID, Vec::new(), &Value::Undefined).is_empty());
        assert_eq!(recording.interceptor_errors.lock().len(), 1);

        let unknown = entry.modify_args("mysql.other.^2.0.0", vec![Value::Null], &Value::Undefined);
        assert_eq!(unknown.len(), 1);
    }

    #[test]
    fn test_modify_return_value() {
        let hook = FunctionHook::new(NodeType::MethodDefinition, "query")
            .modify_return_value(|args, value, _, _| Ok(Value::from(vec![value, Value::from(args.len() as f64)])));
        let entry = entry(Arc::new(RecordingAgent::default()), &mysql_registry(hook), FakeLoader::default());

        let result = entry.modify_return_value(QUERY_ID, &[Value::Null, Value::Null], Value::string("rows"), &Value::Undefined);
        let Value::Array(items) = result else {
            panic!("expected an array");
        };
        assert_eq!(items[0].as_str(), Some("rows"));
        assert_eq!(items[1].as_f64(), Some(2.0));
    }

    #[test]
    fn test_access_local_variables() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();

        let mut registry = HookRegistry::new();
        registry
            .add_dependency("express")
            .unwrap()
            .with_versions("^4")
            .unwrap()
            .add_file_instrumentation(FileInstrumentation::new("lib/express.js").with_local_variables(
                LocalVariableAccess::new(vec!["app".to_string()], move |values, info, _| {
                    seen_in
                        .lock()
                        .push((info.name.clone(), info.path.clone(), values.len()));
                    Ok(())
                }),
            ))
            .unwrap();
        let entry = entry(Arc::new(RecordingAgent::default()), &registry, FakeLoader::default());

        entry.access_local_variables("express.lib/express.js.^4", &[Value::object()]);
        entry.access_local_variables("express.lib/other.js.^4", &[Value::object()]);
        assert_eq!(
            *seen.lock(),
            vec![("express".to_string(), Some("lib/express.js".to_string()), 1)]
        );
    }

    #[test]
    fn test_package_loaded_notifies_agent() {
        let recording = Arc::new(RecordingAgent::default());
        let entry = entry(recording.clone(), &HookRegistry::new(), FakeLoader::default());

        entry.package_loaded("pg", "8.11.0");
        assert_eq!(*recording.required.lock(), vec![("pg".to_string(), "8.11.0".to_string())]);
    }

    #[test]
    fn test_builtin_shim_entry_points() {
        let calls = Arc::new(Mutex::new(0));
        let calls_in = calls.clone();
        let mut registry = HookRegistry::new();
        registry.add_builtin("child_process").unwrap().on_require(move |_, _, _| {
            *calls_in.lock() += 1;
            Ok(None)
        });

        let builtin = Value::object();
        let loader = FakeLoader::default().with_builtin("child_process", builtin.clone());
        let entry = entry(Arc::new(RecordingAgent::default()), &registry, loader);

        let original = entry.builtin_without_patching("child_process").unwrap();
        assert!(original.same(&builtin));

        let first = entry.wrap_builtin_exports("node:child_process", original.clone());
        let second = entry.wrap_builtin_exports("child_process", original);
        assert!(first.same(&second));
        assert_eq!(*calls.lock(), 1);
    }
}
