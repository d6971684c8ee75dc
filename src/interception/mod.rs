// src/interception/mod.rs
//! Module load interception layer
//!
//! Three adapters drive the same execution engine, one per loading
//! capability the host exposes:
//!
//! - **Require Patch**: wraps the synchronous loader and patches evaluated exports
//! - **Load Hook**: rewrites source text before evaluation, shims builtins
//! - **Object Created**: patches namespaces announced by the host
//! - **Instrument Entry**: runtime target of calls injected by the rewriter
//!
//! # Architecture
//!
//! ```text
//! Host loader
//!     │
//!     ├─ load(specifier) ───────▶ RequirePatch ─────────┐
//!     ├─ load hook(url, source) ▶ LoadHookAdapter ──┐   │
//!     └─ namespace created ────▶ ObjectCreatedAdapter ─┤
//!                                      │            │   │
//!                             source rewrite        ▼   ▼
//!                                      │      execute_interceptors
//!                                      ▼            │
//!                        injected calls ──▶ InstrumentEntry ──▶ Agent
//! ```
//!
//! All adapters read one [`Generation`](crate::compiler::Generation) per
//! load event and never let a failure escape into the host.

pub mod builtin_shim;
pub mod cache;
pub mod executor;
pub mod instrument_entry;
pub mod load_hook;
pub mod manifest;
pub mod module_info;
pub mod object_created;
pub mod require_patch;

// Re-export commonly used types
pub use builtin_shim::generate_builtin_shim;
pub use cache::{CacheSlot, ModuleCache};
pub use executor::{execute_interceptors, patch_builtin};
pub use instrument_entry::InstrumentEntry;
pub use load_hook::{LoadContext, LoadHookAdapter, LoadResult, ModuleFormat, ModuleSource};
pub use manifest::{is_main_file, FsManifestSource, ManifestSource, PackageManifest};
pub use module_info::{module_identity_from_path, ModuleIdentity};
pub use object_created::{NamespaceCreated, ObjectCreatedAdapter};
pub use require_patch::{InstallationState, LoaderEntryPoint, ModuleLoader, PatchedLoader, RequirePatch};
