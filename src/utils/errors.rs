// src/utils/errors.rs
//! Error types for the interception engine
//!
//! Registration errors are returned to the caller. Errors raised while a
//! module is being loaded never propagate into the host: the adapters report
//! them through the agent and hand back the unmodified module.

use crate::transform::TransformError;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A dependency, builtin or method name was empty
    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// The same relative path was registered twice on one versioned hook
    #[error("Interceptor for file '{0}' is already registered")]
    DuplicateInterceptor(String),

    #[error("Invalid version range '{range}': {reason}")]
    InvalidVersionRange { range: String, reason: String },

    /// The installed version of a dependency could not be determined
    #[error("Could not determine installed version of '{0}'")]
    VersionUnresolved(String),

    #[error("Interceptor failed for '{module}': {message}")]
    InterceptorFailure { module: String, message: String },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("Failed to read manifest at {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    /// The host loader failed to resolve or load a module
    #[error("Loader error: {0}")]
    Loader(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_range(range: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVersionRange {
            range: range.into(),
            reason: reason.into(),
        }
    }

    /// Wrap an opaque interceptor error, keeping its context chain
    pub fn interceptor(module: impl Into<String>, error: &anyhow::Error) -> Self {
        Self::InterceptorFailure {
            module: module.into(),
            message: format!("{:#}", error),
        }
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interceptor_error_keeps_context() {
        let source = anyhow::anyhow!("detector crashed").context("inspecting query");
        let err = EngineError::interceptor("pg", &source);

        let message = err.to_string();
        assert!(message.contains("'pg'"));
        assert!(message.contains("inspecting query"));
        assert!(message.contains("detector crashed"));
    }

    #[test]
    fn test_transform_error_is_transparent() {
        let err = EngineError::from(TransformError::AlreadyInstrumented);
        assert_eq!(err.to_string(), TransformError::AlreadyInstrumented.to_string());
    }
}
