// src/utils/mod.rs
//! Shared utilities: the engine error type and configuration loading.

pub mod config;
pub mod errors;

pub use config::{EngineConfig, InstrumentationConfig, LoaderConfig, LoggingConfig};
pub use errors::{EngineError, Result};
