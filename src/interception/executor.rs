// src/interception/executor.rs
//! Interceptor execution
//!
//! Runs the interceptors selected for one module load. The cache entry is
//! written before any interceptor runs so that interceptor code requiring
//! the same module again gets the in-progress exports instead of recursing.

use crate::hooks::interceptor::{RequireInterceptor, WrapPackageInfo};
use crate::interception::cache::{CacheSlot, ModuleCache};
use crate::observability::metrics::{self, Adapter};
use crate::runtime::{AgentHandle, Value};
use crate::utils::errors::EngineError;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, warn};

/// Property marking builtin exports that were already patched
pub const BUILTIN_PATCHED_MARKER: &str = "__rasp_builtin_patched";

/// Run `interceptors` in order over `exports`
///
/// A failing (or panicking) interceptor is reported and skipped; the rest
/// still run. Never fails: the worst case is the original exports.
pub fn execute_interceptors(
    interceptors: &[RequireInterceptor],
    exports: Value,
    cache: Option<CacheSlot<'_>>,
    info: &WrapPackageInfo,
    agent: &AgentHandle,
) -> Value {
    if let Some(slot) = &cache {
        slot.write(&exports);
    }

    let mut exports = exports;
    for (position, interceptor) in interceptors.iter().enumerate() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| interceptor(&exports, info, agent)));
        match outcome {
            Ok(Ok(Some(replacement))) => {
                debug!("Interceptor {} replaced exports of {}", position, info.name);
                exports = replacement;
            }
            Ok(Ok(None)) => {}
            Ok(Err(err)) => report_failure(info, agent, EngineError::interceptor(&info.name, &err)),
            Err(_) => report_failure(
                info,
                agent,
                EngineError::InterceptorFailure {
                    module: info.name.clone(),
                    message: format!("interceptor {} panicked", position),
                },
            ),
        }
    }

    if let Some(slot) = &cache {
        slot.write(&exports);
    }
    exports
}

fn report_failure(info: &WrapPackageInfo, agent: &AgentHandle, error: EngineError) {
    warn!("Failed to wrap {}: {}", info.name, error);
    metrics::record_interceptor_failure();
    agent.on_failed_to_wrap_module(&info.name, &error);
}

pub fn is_builtin_patched(exports: &Value) -> bool {
    matches!(exports.get(BUILTIN_PATCHED_MARKER), Some(Value::Bool(true)))
}

/// Patch builtin exports at most once, whichever adapter gets there first
///
/// Consults the generation's builtin cache, then the marker property left
/// on previously patched exports.
pub fn patch_builtin(
    name: &str,
    exports: Value,
    interceptors: &[RequireInterceptor],
    cache: &ModuleCache,
    agent: &AgentHandle,
    adapter: Adapter,
) -> Value {
    if let Some(cached) = cache.get(name) {
        metrics::record_cache_hit(adapter);
        return cached;
    }
    if interceptors.is_empty() {
        return exports;
    }
    if is_builtin_patched(&exports) {
        debug!("Builtin {} already patched, skipping", name);
        return exports;
    }

    if let Value::Object(object) = &exports {
        object.set(BUILTIN_PATCHED_MARKER, true);
    }
    agent.on_builtin_wrapped(name);

    let info = WrapPackageInfo::builtin(name);
    let patched = execute_interceptors(interceptors, exports, Some(CacheSlot::new(cache, name)), &info, agent);
    if let Value::Object(object) = &patched {
        object.set(BUILTIN_PATCHED_MARKER, true);
    }
    metrics::record_module_wrapped(adapter);
    patched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::agent::testing::RecordingAgent;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn info() -> WrapPackageInfo {
        WrapPackageInfo::external("pg", "8.11.0", "/app/node_modules/pg", "lib/index.js")
    }

    #[test]
    fn test_fault_isolation() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = order.clone();
        let third = order.clone();
        let replacement = Value::object();
        let returned = replacement.clone();

        let interceptors: Vec<RequireInterceptor> = vec![
            Arc::new(move |_, _, _| {
                first.lock().push(1);
                Ok(None)
            }),
            Arc::new(|_, _, _| Err(anyhow::anyhow!("boom"))),
            Arc::new(move |_, _, _| {
                third.lock().push(3);
                Ok(Some(returned.clone()))
            }),
        ];

        let recording = Arc::new(RecordingAgent::default());
        let agent: AgentHandle = recording.clone();
        let cache = ModuleCache::new();
        let result = execute_interceptors(
            &interceptors,
            Value::object(),
            Some(CacheSlot::new(&cache, "/app/node_modules/pg/lib/index.js")),
            &info(),
            &agent,
        );

        assert!(result.same(&replacement));
        assert_eq!(*order.lock(), vec![1, 3]);
        assert_eq!(recording.failure_count(), 1);
        assert!(recording.failures.lock()[0].1.contains("boom"));
        assert!(cache.get("/app/node_modules/pg/lib/index.js").unwrap().same(&replacement));
    }

    #[test]
    fn test_panicking_interceptor_is_contained() {
        let interceptors: Vec<RequireInterceptor> = vec![Arc::new(|_, _, _| panic!("detector bug"))];
        let recording = Arc::new(RecordingAgent::default());
        let agent: AgentHandle = recording.clone();
        let exports = Value::object();

        let result = execute_interceptors(&interceptors, exports.clone(), None, &info(), &agent);
        assert!(result.same(&exports));
        assert_eq!(recording.failure_count(), 1);
    }

    #[test]
    fn test_cache_written_before_interceptors() {
        let cache = Arc::new(ModuleCache::new());
        let seen = Arc::new(Mutex::new(false));
        let cache_in = cache.clone();
        let seen_in = seen.clone();
        let interceptors: Vec<RequireInterceptor> = vec![Arc::new(move |_, _, _| {
            *seen_in.lock() = cache_in.contains("key");
            Ok(None)
        })];

        let agent: AgentHandle = Arc::new(RecordingAgent::default());
        execute_interceptors(&interceptors, Value::object(), Some(CacheSlot::new(&cache, "key")), &info(), &agent);
        assert!(*seen.lock());
    }

    #[test]
    fn test_empty_interceptors_still_cache() {
        let cache = ModuleCache::new();
        let agent: AgentHandle = Arc::new(RecordingAgent::default());
        let exports = Value::object();

        let result = execute_interceptors(&[], exports.clone(), Some(CacheSlot::new(&cache, "k")), &info(), &agent);
        assert!(result.same(&exports));
        assert!(cache.contains("k"));
    }

    #[test]
    fn test_builtin_double_patch_guard() {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let interceptors: Vec<RequireInterceptor> = vec![Arc::new(move |_, _, _| {
            *counter.lock() += 1;
            Ok(None)
        })];
        let recording = Arc::new(RecordingAgent::default());
        let agent: AgentHandle = recording.clone();
        let exports = Value::object();

        // Two adapters with separate caches see the same exports object
        let first_cache = ModuleCache::new();
        let second_cache = ModuleCache::new();
        patch_builtin("fs", exports.clone(), &interceptors, &first_cache, &agent, Adapter::Require);
        patch_builtin("fs", exports.clone(), &interceptors, &second_cache, &agent, Adapter::ObjectCreated);
        patch_builtin("fs", exports.clone(), &interceptors, &first_cache, &agent, Adapter::Require);

        assert_eq!(*calls.lock(), 1);
        assert!(is_builtin_patched(&exports));
        assert_eq!(*recording.builtins.lock(), vec!["fs".to_string()]);
    }
}
