// src/compiler/handle.rs
//! Atomically swappable compiled state
//!
//! Each registration produces a new [`Generation`]. Readers take one
//! snapshot per load event and keep using it even if a newer generation is
//! installed meanwhile.

use crate::compiler::compile::compile;
use crate::compiler::index::CompiledIndex;
use crate::hooks::registry::HookRegistry;
use crate::interception::cache::ModuleCache;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Compiled index plus the module caches that belong to it
#[derive(Debug, Default)]
pub struct Generation {
    pub number: u64,
    pub index: CompiledIndex,
    /// Final exports by resolved filename
    pub package_cache: ModuleCache,
    /// Final exports by builtin name
    pub builtin_cache: ModuleCache,
}

impl Generation {
    fn new(number: u64, index: CompiledIndex) -> Self {
        Self {
            number,
            index,
            package_cache: ModuleCache::new(),
            builtin_cache: ModuleCache::new(),
        }
    }
}

pub struct IndexHandle {
    current: ArcSwap<Generation>,
    counter: AtomicU64,
}

impl IndexHandle {
    /// Start with an empty generation 0
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Generation::default()),
            counter: AtomicU64::new(0),
        }
    }

    /// Compile `registry` and make it current; returns the new generation number
    pub fn install(&self, registry: &HookRegistry) -> u64 {
        let number = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let index = compile(registry);
        self.current.store(Arc::new(Generation::new(number, index)));
        info!("Installed hook generation {}", number);
        number
    }

    pub fn snapshot(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().number
    }
}

impl Default for IndexHandle {
    fn default() -> Self {
        Self::new()
    }
}
