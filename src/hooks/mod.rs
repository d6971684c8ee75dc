// src/hooks/mod.rs
//! Hook registration
//!
//! The agent describes what it wants intercepted through a builder API:
//!
//! - **Registry**: dependencies (by name) and builtin modules
//! - **Versioned hooks**: per version range, the subjects to patch after
//!   load, raw require interceptors, and source-level file instrumentation
//! - **Subjects**: objects selected from a module's exports whose methods
//!   are wrapped with inspect / modify interceptors
//! - **Wrapping**: installs the method wrappers on live objects
//!
//! # Structure
//!
//! ```text
//! HookRegistry
//!     ├─ HookedDependency "pg"
//!     │     └─ VersionedHook "^8.0.0"
//!     │           ├─ Subject (exports => exports.Client.prototype)
//!     │           │     └─ inspect("query")
//!     │           ├─ on_file_require("lib/native/client.js")
//!     │           └─ FileInstrumentation "lib/client.js"
//!     │                 └─ FunctionHook MethodDefinition "query"
//!     └─ BuiltinModule "child_process"
//!           └─ Subject (exports => exports)
//!                 └─ inspect("exec")
//! ```

pub mod file_instruction;
pub mod interceptor;
pub mod registry;
pub mod subject;
pub mod version_range;
pub mod wrap;

// Re-export commonly used types
pub use file_instruction::{FileInstrumentation, FunctionHook, LocalVariableAccess};
pub use interceptor::{
    InspectFn, InspectResultFn, LocalVariablesFn, ModifyArgumentsFn, ModifyReturnValueFn, ModuleKind,
    NewInstanceFn, RequireInterceptor, WrapPackageInfo,
};
pub use registry::{normalize_relative_path, BuiltinModule, HookRegistry, HookedDependency, VersionedHook};
pub use subject::{MethodInterceptor, Selector, Subject};
pub use version_range::VersionRange;
pub use wrap::{is_wrapped, original_of, wrap_method, wrap_root_callable, wrap_subject};
