// src/hooks/interceptor.rs
//! Callback types supplied by detectors
//!
//! Detector code is opaque to the engine, so every callback returns
//! `anyhow::Result`. A failing callback is reported and its effect skipped;
//! it never breaks the intercepted call.

use crate::runtime::{AgentHandle, InterceptorResult, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Builtin,
    External,
}

/// Describes the module an interceptor is running for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapPackageInfo {
    pub name: String,

    /// Installed version; `None` for builtins
    pub version: Option<String>,

    pub kind: ModuleKind,

    /// Root directory of the dependency
    pub base: Option<PathBuf>,

    /// File path relative to `base`, `/` separated
    pub path: Option<String>,
}

impl WrapPackageInfo {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            kind: ModuleKind::Builtin,
            base: None,
            path: None,
        }
    }

    pub fn external(
        name: impl Into<String>,
        version: impl Into<String>,
        base: impl Into<PathBuf>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
            kind: ModuleKind::External,
            base: Some(base.into()),
            path: Some(path.into()),
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.kind == ModuleKind::Builtin
    }
}

/// Runs once per module load; `Some` replaces the module's exports
pub type RequireInterceptor =
    Arc<dyn Fn(&Value, &WrapPackageInfo, &AgentHandle) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// `(args, subject/this, agent)`: inspect arguments before the call
pub type InspectFn =
    Arc<dyn Fn(&[Value], &Value, &AgentHandle) -> anyhow::Result<InterceptorResult> + Send + Sync>;

/// `(args, result, subject/this, agent)`: inspect the return value
pub type InspectResultFn = Arc<
    dyn Fn(&[Value], &Value, &Value, &AgentHandle) -> anyhow::Result<InterceptorResult>
        + Send
        + Sync,
>;

/// `(args, subject/this, agent)`: return the arguments to call with
pub type ModifyArgumentsFn =
    Arc<dyn Fn(Vec<Value>, &Value, &AgentHandle) -> anyhow::Result<Vec<Value>> + Send + Sync>;

/// Receives a freshly created instance; `Some` replaces it
pub type NewInstanceFn =
    Arc<dyn Fn(&Value, &WrapPackageInfo) -> anyhow::Result<Option<Value>> + Send + Sync>;

/// `(args, return value, subject/this, agent)`: return the value to hand back
pub type ModifyReturnValueFn =
    Arc<dyn Fn(&[Value], Value, &Value, &AgentHandle) -> anyhow::Result<Value> + Send + Sync>;

/// Receives the values of a file's local variables once it has evaluated
pub type LocalVariablesFn =
    Arc<dyn Fn(&[Value], &WrapPackageInfo, &AgentHandle) -> anyhow::Result<()> + Send + Sync>;
