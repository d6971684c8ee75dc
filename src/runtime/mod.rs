// src/runtime/mod.rs
//! Host runtime model
//!
//! The engine never executes host code itself. It sees the host through:
//!
//! - **Values**: shared objects and functions exported by loaded modules
//! - **Agent**: the sink for failures, notifications and detected attacks

pub mod agent;
pub mod value;

// Re-export commonly used types
pub use agent::{
    Agent, AgentHandle, AttackDisposition, HostError, InterceptorResult, Violation, ViolationKind,
};
pub use value::{Callable, ObjectRef, Value};
