// src/observability/metrics.rs
//! Counter names and recording helpers

use ::metrics::counter;

pub const MODULES_WRAPPED: &str = "rasp_modules_wrapped_total";
pub const INTERCEPTOR_FAILURES: &str = "rasp_interceptor_failures_total";
pub const CACHE_HITS: &str = "rasp_module_cache_hits_total";
pub const TRANSFORMS_APPLIED: &str = "rasp_transforms_applied_total";
pub const TRANSFORMS_FAILED: &str = "rasp_transforms_failed_total";
pub const ATTACKS_DETECTED: &str = "rasp_attacks_detected_total";

/// Which adapter produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adapter {
    Require,
    LoadHook,
    ObjectCreated,
    Entry,
}

impl Adapter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Adapter::Require => "require",
            Adapter::LoadHook => "load_hook",
            Adapter::ObjectCreated => "object_created",
            Adapter::Entry => "entry",
        }
    }
}

pub fn record_module_wrapped(adapter: Adapter) {
    counter!(MODULES_WRAPPED, "adapter" => adapter.as_str()).increment(1);
}

pub fn record_interceptor_failure() {
    counter!(INTERCEPTOR_FAILURES).increment(1);
}

pub fn record_cache_hit(adapter: Adapter) {
    counter!(CACHE_HITS, "adapter" => adapter.as_str()).increment(1);
}

pub fn record_transform(applied: bool) {
    if applied {
        counter!(TRANSFORMS_APPLIED).increment(1);
    } else {
        counter!(TRANSFORMS_FAILED).increment(1);
    }
}

pub fn record_attack(blocked: bool) {
    let outcome = if blocked { "blocked" } else { "allowed" };
    counter!(ATTACKS_DETECTED, "outcome" => outcome).increment(1);
}
