// src/hooks/file_instruction.rs
//! Source-level instrumentation requests for a single dependency file

use crate::hooks::interceptor::{InspectFn, LocalVariablesFn, ModifyArgumentsFn, ModifyReturnValueFn, WrapPackageInfo};
use crate::runtime::{AgentHandle, InterceptorResult, Value};
use crate::transform::{NodeType, OperationKind};
use std::fmt;
use std::sync::Arc;

/// One function to rewrite, located by node type and name
#[derive(Clone)]
pub struct FunctionHook {
    pub node_type: NodeType,
    pub name: String,
    pub operation_kind: Option<OperationKind>,
    pub inspect_args: Option<InspectFn>,
    pub modify_args: Option<ModifyArgumentsFn>,
    pub modify_return_value: Option<ModifyReturnValueFn>,
    /// Rewrite `arguments` itself instead of the named parameters
    pub modify_arguments_object: bool,
}

impl FunctionHook {
    pub fn new(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            node_type,
            name: name.into(),
            operation_kind: None,
            inspect_args: None,
            modify_args: None,
            modify_return_value: None,
            modify_arguments_object: false,
        }
    }

    pub fn with_operation_kind(mut self, kind: OperationKind) -> Self {
        self.operation_kind = Some(kind);
        self
    }

    pub fn inspect_args<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[Value], &Value, &AgentHandle) -> anyhow::Result<InterceptorResult> + Send + Sync + 'static,
    {
        self.inspect_args = Some(Arc::new(callback));
        self
    }

    pub fn modify_args<F>(mut self, callback: F) -> Self
    where
        F: Fn(Vec<Value>, &Value, &AgentHandle) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.modify_args = Some(Arc::new(callback));
        self
    }

    /// Like [`modify_args`](Self::modify_args) but replaces `arguments` wholesale
    pub fn modify_arguments_object<F>(mut self, callback: F) -> Self
    where
        F: Fn(Vec<Value>, &Value, &AgentHandle) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        self.modify_args = Some(Arc::new(callback));
        self.modify_arguments_object = true;
        self
    }

    pub fn modify_return_value<F>(mut self, callback: F) -> Self
    where
        F: Fn(&[Value], Value, &Value, &AgentHandle) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.modify_return_value = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for FunctionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHook")
            .field("node_type", &self.node_type)
            .field("name", &self.name)
            .field("operation_kind", &self.operation_kind)
            .field("inspect_args", &self.inspect_args.is_some())
            .field("modify_args", &self.modify_args.is_some())
            .field("modify_return_value", &self.modify_return_value.is_some())
            .field("modify_arguments_object", &self.modify_arguments_object)
            .finish()
    }
}

/// Top-level variables of a file handed to a callback after evaluation
#[derive(Clone)]
pub struct LocalVariableAccess {
    pub names: Vec<String>,
    pub callback: LocalVariablesFn,
}

impl LocalVariableAccess {
    pub fn new<F>(names: Vec<String>, callback: F) -> Self
    where
        F: Fn(&[Value], &WrapPackageInfo, &AgentHandle) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            names,
            callback: Arc::new(callback),
        }
    }
}

impl fmt::Debug for LocalVariableAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalVariableAccess")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct FileInstrumentation {
    /// Path relative to the dependency root, `/` separated
    pub path: String,
    pub functions: Vec<FunctionHook>,
    pub access_local_variables: Option<LocalVariableAccess>,
}

impl FileInstrumentation {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            functions: Vec::new(),
            access_local_variables: None,
        }
    }

    pub fn with_function(mut self, function: FunctionHook) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_local_variables(mut self, access: LocalVariableAccess) -> Self {
        self.access_local_variables = Some(access);
        self
    }
}
