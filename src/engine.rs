// src/engine.rs
//! Shared engine state handed to every adapter

use crate::compiler::{Generation, IndexHandle};
use crate::hooks::HookRegistry;
use crate::interception::manifest::{FsManifestSource, ManifestSource};
use crate::runtime::AgentHandle;
use crate::transform::SourceTransformer;
use crate::utils::config::EngineConfig;
use std::sync::Arc;
use tracing::info;

/// Configuration, current hook generation, agent and manifest back channel
pub struct Engine {
    config: EngineConfig,
    index: IndexHandle,
    agent: AgentHandle,
    manifests: Arc<dyn ManifestSource>,
    transformer: SourceTransformer,
}

impl Engine {
    pub fn new(config: EngineConfig, agent: AgentHandle) -> Self {
        info!(
            "Initializing interception engine (marker: {}, entry module: {})",
            config.loader.dependency_dir_marker, config.instrumentation.entry_module
        );
        let transformer = SourceTransformer::new(config.instrumentation.entry_module.clone())
            .with_bundling(config.instrumentation.bundling);

        Self {
            config,
            index: IndexHandle::new(),
            agent,
            manifests: Arc::new(FsManifestSource::new()),
            transformer,
        }
    }

    /// Replace the filesystem manifest reader
    pub fn with_manifest_source(mut self, manifests: Arc<dyn ManifestSource>) -> Self {
        self.manifests = manifests;
        self
    }

    /// Compile `registry` and make it the current generation
    pub fn register(&self, registry: &HookRegistry) -> u64 {
        self.index.install(registry)
    }

    /// The generation to use for one load event
    pub fn snapshot(&self) -> Arc<Generation> {
        self.index.snapshot()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn agent(&self) -> &AgentHandle {
        &self.agent
    }

    pub fn manifests(&self) -> &Arc<dyn ManifestSource> {
        &self.manifests
    }

    pub fn transformer(&self) -> &SourceTransformer {
        &self.transformer
    }
}
