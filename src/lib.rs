// src/lib.rs
//! RASP Module Interception & Instrumentation Engine
//!
//! Decides which function in which loaded dependency gets observed or
//! modified by a runtime self-protection agent, and applies that decision
//! whichever way the host loads modules.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **hooks**: registry of dependencies, version ranges and interceptors
//! - **compiler**: compiles a registry into an immutable, swappable index
//! - **interception**: load adapters and the interceptor execution engine
//! - **transform**: source rewrite compiler injecting instrumentation calls
//! - **runtime**: the host value model and the agent interface
//! - **observability**: tracing setup and metrics
//! - **utils**: configuration and errors

// Public module exports
pub mod compiler;
pub mod engine;
pub mod hooks;
pub mod interception;
pub mod observability;
pub mod runtime;
pub mod transform;
pub mod utils;

// Re-export commonly used types
pub use compiler::{compile, CompiledIndex, Generation, IndexHandle};
pub use engine::Engine;
pub use hooks::{FileInstrumentation, FunctionHook, HookRegistry, Subject, VersionRange};
pub use interception::{InstrumentEntry, LoadHookAdapter, ObjectCreatedAdapter, RequirePatch};
pub use runtime::{Agent, AgentHandle, HostError, Value, Violation};
pub use transform::{SourceTransformer, TransformError};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
