// src/runtime/agent.rs
//! The agent seen from the engine
//!
//! The agent is the failure channel and notification sink. Every method must
//! return promptly and never panic; the engine calls them from inside module
//! loading.

use crate::utils::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Category of a detected attack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    SqlInjection,
    NosqlInjection,
    PathTraversal,
    ShellInjection,
    CodeInjection,
    Ssrf,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ViolationKind::SqlInjection => "SQL injection",
            ViolationKind::NosqlInjection => "NoSQL injection",
            ViolationKind::PathTraversal => "path traversal",
            ViolationKind::ShellInjection => "shell injection",
            ViolationKind::CodeInjection => "code injection",
            ViolationKind::Ssrf => "server-side request forgery",
        };
        f.write_str(name)
    }
}

/// What a detector found
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub kind: ViolationKind,

    /// Intercepted operation, e.g. `pg.query`
    pub operation: String,

    /// Where in the arguments the payload was found, e.g. `.[0]`
    pub path: String,

    pub payload: Option<String>,
}

/// Detector outcome: `None` means nothing found
pub type InterceptorResult = Option<Violation>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackDisposition {
    Allow,
    Block,
}

/// Errors visible to host code calling an intercepted function
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("{0}")]
    Thrown(String),

    #[error("Blocked {} in {}(...) at {}", .0.kind, .0.operation, .0.path)]
    Blocked(Violation),
}

/// The agent's side of the interface
pub trait Agent: Send + Sync {
    /// Wrapping a module failed; the module was handed back unmodified
    fn on_failed_to_wrap_module(&self, module: &str, error: &EngineError);

    fn on_package_required(&self, _name: &str, _version: &str) {}

    /// `supported` is false when no registered range covers `version`
    fn on_package_wrapped(&self, _name: &str, _version: &str, _supported: bool) {}

    fn on_builtin_wrapped(&self, _name: &str) {}

    /// A detector callback failed while inspecting a call
    fn on_error_thrown_by_interceptor(&self, _module: &str, _method: &str, _error: &anyhow::Error) {
    }

    fn on_detected_attack(
        &self,
        _module: &str,
        _method: &str,
        _violation: &Violation,
    ) -> AttackDisposition {
        AttackDisposition::Allow
    }
}

pub type AgentHandle = Arc<dyn Agent>;

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Agent that records every notification
    #[derive(Default)]
    pub struct RecordingAgent {
        pub failures: Mutex<Vec<(String, String)>>,
        pub required: Mutex<Vec<(String, String)>>,
        pub wrapped: Mutex<Vec<(String, String, bool)>>,
        pub builtins: Mutex<Vec<String>>,
        pub interceptor_errors: Mutex<Vec<(String, String)>>,
        pub attacks: Mutex<Vec<Violation>>,
        pub block: bool,
    }

    impl RecordingAgent {
        pub fn blocking() -> Self {
            Self {
                block: true,
                ..Self::default()
            }
        }

        pub fn failure_count(&self) -> usize {
            self.failures.lock().len()
        }
    }

    impl Agent for RecordingAgent {
        fn on_failed_to_wrap_module(&self, module: &str, error: &EngineError) {
            self.failures
                .lock()
                .push((module.to_string(), error.to_string()));
        }

        fn on_package_required(&self, name: &str, version: &str) {
            self.required
                .lock()
                .push((name.to_string(), version.to_string()));
        }

        fn on_package_wrapped(&self, name: &str, version: &str, supported: bool) {
            self.wrapped
                .lock()
                .push((name.to_string(), version.to_string(), supported));
        }

        fn on_builtin_wrapped(&self, name: &str) {
            self.builtins.lock().push(name.to_string());
        }

        fn on_error_thrown_by_interceptor(&self, module: &str, method: &str, error: &anyhow::Error) {
            self.interceptor_errors
                .lock()
                .push((format!("{}.{}", module, method), error.to_string()));
        }

        fn on_detected_attack(
            &self,
            _module: &str,
            _method: &str,
            violation: &Violation,
        ) -> AttackDisposition {
            self.attacks.lock().push(violation.clone());
            if self.block {
                AttackDisposition::Block
            } else {
                AttackDisposition::Allow
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_error_message() {
        let err = HostError::Blocked(Violation {
            kind: ViolationKind::SqlInjection,
            operation: "mysql.query".to_string(),
            path: ".[0]".to_string(),
            payload: Some("1' OR 1=1".to_string()),
        });
        assert_eq!(err.to_string(), "Blocked SQL injection in mysql.query(...) at .[0]");
    }

    #[test]
    fn test_violation_kind_serialization() {
        let json = serde_json::to_string(&ViolationKind::PathTraversal).unwrap();
        assert_eq!(json, "\"path_traversal\"");
    }
}
