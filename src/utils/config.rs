// src/utils/config.rs
//! Engine configuration
//!
//! Built-in defaults are layered under an optional configuration file using
//! the `config` crate. Every section can be omitted from the file.

use crate::utils::errors::Result;
use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Default name of the configuration file (any extension `config` understands)
pub const DEFAULT_CONFIG_NAME: &str = "rasp-engine";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub loader: LoaderConfig,
    pub instrumentation: InstrumentationConfig,
    pub logging: LoggingConfig,
}

/// How loaded files are mapped to dependencies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory segment that marks the start of a dependency
    pub dependency_dir_marker: String,

    /// Prefix the host may put in front of builtin module names
    pub builtin_prefix: String,

    /// Files with these extensions are never intercepted
    pub ignored_extensions: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            dependency_dir_marker: "node_modules".to_string(),
            builtin_prefix: "node:".to_string(),
            ignored_extensions: vec![".json".to_string()],
        }
    }
}

impl LoaderConfig {
    /// Strip the builtin prefix (`node:fs` -> `fs`)
    pub fn builtin_name<'a>(&self, specifier: &'a str) -> &'a str {
        specifier
            .strip_prefix(self.builtin_prefix.as_str())
            .unwrap_or(specifier)
    }

    pub fn is_ignored(&self, filename: &Path) -> bool {
        let name = filename.to_string_lossy();
        self.ignored_extensions
            .iter()
            .any(|ext| name.ends_with(ext.as_str()))
    }
}

/// Source rewriting options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationConfig {
    /// Module specifier the rewritten code imports its entry functions from
    pub entry_module: String,

    /// Path suffix of the file used to verify that load hooks are active
    pub self_check_file: String,

    /// Token replaced inside the self-check file
    pub self_check_marker: String,

    pub self_check_replacement: String,

    /// Run best-effort rewrites on application (non-dependency) code
    pub transform_application_code: bool,

    /// Append a package-loaded notification to every rewritten file
    pub bundling: bool,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            entry_module: crate::transform::DEFAULT_ENTRY_MODULE.to_string(),
            self_check_file: "instrument/self-check.js".to_string(),
            self_check_marker: "__RASP_SELF_CHECK_PENDING__".to_string(),
            self_check_replacement: "__RASP_SELF_CHECK_PASSED__".to_string(),
            transform_application_code: false,
            bundling: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Load `rasp-engine.{toml,json,yaml,...}` from the working directory if present
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_NAME)
    }

    /// Load defaults overlaid with the file at `path` (missing file is not an error)
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading engine configuration from {}", path.display());

        let settings = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?)
            .add_source(File::from(path).required(false))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
