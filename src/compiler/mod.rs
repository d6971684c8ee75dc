// src/compiler/mod.rs
//! Instruction compiler
//!
//! Turns the mutable [`HookRegistry`](crate::hooks::HookRegistry) into an
//! immutable [`CompiledIndex`] and publishes it atomically:
//!
//! ```text
//! HookRegistry ──compile──▶ CompiledIndex ──install──▶ IndexHandle (ArcSwap)
//!                              │                            │
//!                              ├─ by_dependency_name        ├─ snapshot() per load event
//!                              ├─ by_identifier             └─ caches reset per generation
//!                              ├─ by_builtin_name
//!                              └─ packages
//! ```

pub mod compile;
pub mod handle;
pub mod index;

// Re-export commonly used types
pub use compile::{compile, file_identifier, function_identifier};
pub use handle::{Generation, IndexHandle};
pub use index::{CallbackBundle, CompiledFileInstructions, CompiledIndex, CompiledVersionedHook, FileCallbackBundle};
