// src/interception/cache.rs
//! Per-generation module caches
//!
//! Keys are resolved filenames for dependencies and bare names for builtins.
//! Writes are idempotent: the same key always maps to the final exports
//! produced for it within one generation.

use crate::runtime::Value;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct ModuleCache {
    entries: DashMap<String, Value>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, key: &str, exports: Value) {
        self.entries.insert(key.to_string(), exports);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where the execution engine records a module's exports
#[derive(Debug, Clone, Copy)]
pub struct CacheSlot<'a> {
    pub cache: &'a ModuleCache,
    pub key: &'a str,
}

impl<'a> CacheSlot<'a> {
    pub fn new(cache: &'a ModuleCache, key: &'a str) -> Self {
        Self { cache, key }
    }

    pub fn write(&self, exports: &Value) {
        self.cache.insert(self.key, exports.clone());
    }
}
