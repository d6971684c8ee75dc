// src/hooks/subject.rs
//! Subjects: objects reached from a module's exports whose methods get wrapped

use crate::hooks::interceptor::{InspectFn, InspectResultFn, ModifyArgumentsFn, NewInstanceFn, WrapPackageInfo};
use crate::runtime::{AgentHandle, InterceptorResult, Value};
use crate::utils::errors::{EngineError, Result};
use std::fmt;
use std::sync::Arc;

/// Pure function from a module's exports to the object to patch
pub type Selector = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

#[derive(Clone)]
pub enum MethodInterceptor {
    /// Inspect arguments before the original runs
    Inspect { name: String, interceptor: InspectFn },

    /// Inspect the return value after the original ran
    InspectResult {
        name: String,
        interceptor: InspectResultFn,
    },

    /// Replace the arguments passed to the original
    ModifyArguments {
        name: String,
        interceptor: ModifyArgumentsFn,
    },

    /// Observe (or replace) the value a factory or constructor returned
    NewInstance {
        name: String,
        interceptor: NewInstanceFn,
    },
}

impl MethodInterceptor {
    pub fn name(&self) -> &str {
        match self {
            MethodInterceptor::Inspect { name, .. }
            | MethodInterceptor::InspectResult { name, .. }
            | MethodInterceptor::ModifyArguments { name, .. }
            | MethodInterceptor::NewInstance { name, .. } => name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            MethodInterceptor::Inspect { .. } => "inspect",
            MethodInterceptor::InspectResult { .. } => "inspect_result",
            MethodInterceptor::ModifyArguments { .. } => "modify_arguments",
            MethodInterceptor::NewInstance { .. } => "new_instance",
        }
    }
}

impl fmt::Debug for MethodInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.name())
    }
}

#[derive(Clone)]
pub struct Subject {
    selector: Selector,
    methods: Vec<MethodInterceptor>,
}

impl Subject {
    pub fn new<S>(selector: S) -> Self
    where
        S: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            selector: Arc::new(selector),
            methods: Vec::new(),
        }
    }

    /// Subject that is the exports object itself
    pub fn exports() -> Self {
        Self::new(|exports| Some(exports.clone()))
    }

    pub fn inspect<F>(&mut self, name: &str, interceptor: F) -> Result<&mut Self>
    where
        F: Fn(&[Value], &Value, &AgentHandle) -> anyhow::Result<InterceptorResult> + Send + Sync + 'static,
    {
        let name = method_name(name)?;
        self.methods.push(MethodInterceptor::Inspect {
            name,
            interceptor: Arc::new(interceptor),
        });
        Ok(self)
    }

    pub fn inspect_result<F>(&mut self, name: &str, interceptor: F) -> Result<&mut Self>
    where
        F: Fn(&[Value], &Value, &Value, &AgentHandle) -> anyhow::Result<InterceptorResult>
            + Send
            + Sync
            + 'static,
    {
        let name = method_name(name)?;
        self.methods.push(MethodInterceptor::InspectResult {
            name,
            interceptor: Arc::new(interceptor),
        });
        Ok(self)
    }

    pub fn modify_arguments<F>(&mut self, name: &str, interceptor: F) -> Result<&mut Self>
    where
        F: Fn(Vec<Value>, &Value, &AgentHandle) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        let name = method_name(name)?;
        self.methods.push(MethodInterceptor::ModifyArguments {
            name,
            interceptor: Arc::new(interceptor),
        });
        Ok(self)
    }

    pub fn new_instance<F>(&mut self, name: &str, interceptor: F) -> Result<&mut Self>
    where
        F: Fn(&Value, &WrapPackageInfo) -> anyhow::Result<Option<Value>> + Send + Sync + 'static,
    {
        let name = method_name(name)?;
        self.methods.push(MethodInterceptor::NewInstance {
            name,
            interceptor: Arc::new(interceptor),
        });
        Ok(self)
    }

    /// Apply the selector; `None` means there is nothing to patch
    pub fn select(&self, exports: &Value) -> Option<Value> {
        (self.selector)(exports)
    }

    pub fn methods(&self) -> &[MethodInterceptor] {
        &self.methods
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

fn method_name(name: &str) -> Result<String> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidName(
            "method name must not be empty".to_string(),
        ));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_creation() {
        let mut subject = Subject::new(|exports| exports.get("Client"));
        subject
            .inspect("query", |_, _, _| Ok(None))
            .unwrap()
            .modify_arguments("connect", |args, _, _| Ok(args))
            .unwrap();

        let names: Vec<&str> = subject.methods().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["query", "connect"]);
    }

    #[test]
    fn test_empty_method_name_rejected() {
        let mut subject = Subject::exports();
        let err = subject.inspect("", |_, _, _| Ok(None)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidName(_)));
        assert!(subject.methods().is_empty());
    }

    #[test]
    fn test_selector_is_applied() {
        let exports = Value::object();
        let client = Value::object();
        exports.as_object().unwrap().set("Client", client.clone());

        let subject = Subject::new(|exports| exports.get("Client"));
        assert!(subject.select(&exports).unwrap().same(&client));
        assert!(subject.select(&Value::Null).is_none());
    }
}
