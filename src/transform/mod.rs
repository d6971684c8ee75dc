// src/transform/mod.rs
//! Source rewrite compiler
//!
//! Rewrites dependency sources before evaluation so selected functions call
//! into the agent:
//!
//! - **Dependency rewriting**: inject inspect / modify calls into functions
//!   named by [`FileInstructions`], plus one import of the entry functions
//! - **Application rewriting**: best-effort wrapping of string operations
//! - **Package-loaded notification**: a single call appended to a file
//!
//! # Pipeline
//!
//! ```text
//! source ──parse──▶ syntax tree ──match instructions──▶ edits ──apply──▶ rewritten source
//!                        │
//!                        └─ syntax error → TransformError::Parse
//! ```
//!
//! Rewritten files must never be rewritten again: any source that already
//! mentions an entry function is rejected.

pub mod application;
pub mod dependency;
pub(crate) mod edits;
pub mod instructions;
pub mod source;
pub(crate) mod snippets;

use thiserror::Error;

// Re-export commonly used types
pub use application::METHODS_TO_WRAP;
pub use dependency::{contains_instrumentation, SourceTransformer};
pub use instructions::{FileInstructions, FunctionInstructions, NodeType, OperationKind};
pub use source::SourceDialect;

pub const INSPECT_ARGS_FN: &str = "__instrumentInspectArgs";
pub const MODIFY_ARGS_FN: &str = "__instrumentModifyArgs";
pub const MODIFY_RETURN_VALUE_FN: &str = "__instrumentModifyReturnValue";
pub const ACCESS_LOCAL_VARIABLES_FN: &str = "__instrumentAccessLocalVariables";
pub const PACKAGE_LOADED_FN: &str = "__instrumentPackageLoaded";

/// Every function rewritten dependency code may import
pub const ENTRY_FUNCTIONS: &[&str] = &[
    INSPECT_ARGS_FN,
    MODIFY_ARGS_FN,
    MODIFY_RETURN_VALUE_FN,
    ACCESS_LOCAL_VARIABLES_FN,
    PACKAGE_LOADED_FN,
];

pub const WRAP_METHOD_CALL_RESULT_FN: &str = "__wrapMethodCallResult";
pub const WRAP_CONCAT_FN: &str = "__wrapConcat";

/// Specifier rewritten code imports the entry functions from
pub const DEFAULT_ENTRY_MODULE: &str = "@rasp-engine/instrument/internals";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("[already-instrumented] source already calls instrumentation entry points")]
    AlreadyInstrumented,

    /// Syntax error, as `line:column message`
    #[error("[parse] {diagnostic}")]
    Parse { diagnostic: String },

    #[error("[instructions] {0}")]
    InvalidInstructions(String),

    #[error("[parser] {0}")]
    Parser(String),
}

/// Rewrite with the default entry module
pub fn transform(
    dependency: &str,
    version: &str,
    file_path: &str,
    source: &str,
    dialect: SourceDialect,
    instructions: &FileInstructions,
) -> Result<String, TransformError> {
    SourceTransformer::default().transform(dependency, version, file_path, source, dialect, instructions)
}

pub fn transform_json(
    dependency: &str,
    version: &str,
    file_path: &str,
    source: &str,
    dialect: SourceDialect,
    instructions_json: &str,
) -> Result<String, TransformError> {
    SourceTransformer::default().transform_json(dependency, version, file_path, source, dialect, instructions_json)
}

pub fn transform_best_effort(source: &str, dialect: SourceDialect) -> Option<String> {
    SourceTransformer::default().transform_best_effort(source, dialect)
}

pub fn insert_package_loaded(
    dependency: &str,
    version: &str,
    source: &str,
    dialect: SourceDialect,
) -> Result<String, TransformError> {
    SourceTransformer::default().insert_package_loaded(dependency, version, source, dialect)
}
