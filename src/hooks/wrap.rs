// src/hooks/wrap.rs
//! Method wrapping for subjects
//!
//! A wrapper keeps a reference to the function it replaced and carries a
//! marker property. Several interceptors on one method nest: the first
//! registered runs outermost.

use crate::hooks::interceptor::WrapPackageInfo;
use crate::hooks::subject::{MethodInterceptor, Subject};
use crate::observability::metrics;
use crate::runtime::{AgentHandle, AttackDisposition, HostError, InterceptorResult, ObjectRef, Value};
use crate::utils::errors::EngineError;
use tracing::{debug, warn};

/// Property set on every wrapper function
pub const WRAPPED_MARKER: &str = "__rasp_wrapped";

/// Property holding the function a wrapper replaced
pub const ORIGINAL_PROPERTY: &str = "__rasp_original";

pub fn is_wrapped(value: &Value) -> bool {
    matches!(value.get(WRAPPED_MARKER), Some(Value::Bool(true)))
}

/// The unwrapped function behind any number of wrapper layers
pub fn original_of(value: &Value) -> Value {
    let mut current = value.clone();
    while let Some(original) = current.get(ORIGINAL_PROPERTY) {
        current = original;
    }
    current
}

/// Wrap every method a subject names on the object its selector picks
pub fn wrap_subject(exports: &Value, subject: &Subject, info: &WrapPackageInfo, agent: &AgentHandle) {
    let target = match subject.select(exports) {
        Some(Value::Object(target)) => target,
        _ => {
            debug!("Selector found nothing to patch in {}", info.name);
            return;
        }
    };

    for method in subject.methods().iter().rev() {
        wrap_method(&target, method, info, agent);
    }
}

/// Replace `target[name]` with a wrapper running the interceptor
pub fn wrap_method(target: &ObjectRef, method: &MethodInterceptor, info: &WrapPackageInfo, agent: &AgentHandle) {
    let name = method.name();
    let original = match target.get(name) {
        Some(Value::Object(original)) if original.is_callable() => original,
        _ => {
            warn!("{}.{} is not a function, skipping", info.name, name);
            agent.on_failed_to_wrap_module(
                &info.name,
                &EngineError::InterceptorFailure {
                    module: info.name.clone(),
                    message: format!("no original function {} to wrap", name),
                },
            );
            return;
        }
    };

    let wrapper = build_wrapper(original, method, info, agent);
    target.set(name, wrapper);
}

/// Wrap a callable exports value itself
///
/// Returns the replacement exports, or `None` when the exports are not
/// callable. Properties of the original are copied onto the wrapper.
pub fn wrap_root_callable(
    exports: &Value,
    subject: &Subject,
    info: &WrapPackageInfo,
    agent: &AgentHandle,
) -> Option<Value> {
    let root = match exports {
        Value::Object(root) if root.is_callable() => root.clone(),
        _ => {
            debug!("Exports of {} are not callable", info.name);
            return None;
        }
    };

    let mut current = root.clone();
    for method in subject.methods().iter().rev() {
        current = build_wrapper(current, method, info, agent);
    }

    for key in root.keys() {
        if key == WRAPPED_MARKER || key == ORIGINAL_PROPERTY {
            continue;
        }
        if let Some(value) = root.get(&key) {
            current.set(key, value);
        }
    }

    Some(Value::Object(current))
}

fn build_wrapper(original: ObjectRef, method: &MethodInterceptor, info: &WrapPackageInfo, agent: &AgentHandle) -> ObjectRef {
    let name = method.name().to_string();
    let module = info.name.clone();
    let agent = agent.clone();
    let target = original.clone();

    let wrapper = match method.clone() {
        MethodInterceptor::Inspect { interceptor, .. } => ObjectRef::function(name.clone(), move |this, args| {
            let outcome = interceptor(&args, this, &agent);
            report_inspection(&agent, &module, &name, outcome)?;
            target.call(this, args)
        }),
        MethodInterceptor::InspectResult { interceptor, .. } => ObjectRef::function(name.clone(), move |this, args| {
            let result = target.call(this, args.clone())?;
            let outcome = interceptor(&args, &result, this, &agent);
            report_inspection(&agent, &module, &name, outcome)?;
            Ok(result)
        }),
        MethodInterceptor::ModifyArguments { interceptor, .. } => ObjectRef::function(name.clone(), move |this, args| {
            let args = match interceptor(args.clone(), this, &agent) {
                Ok(updated) => updated,
                Err(err) => {
                    report_interceptor_error(&agent, &module, &name, &err);
                    args
                }
            };
            target.call(this, args)
        }),
        MethodInterceptor::NewInstance { interceptor, .. } => {
            let info = info.clone();
            ObjectRef::function(name.clone(), move |this, args| {
                let instance = target.call(this, args)?;
                match interceptor(&instance, &info) {
                    Ok(Some(replacement)) => Ok(replacement),
                    Ok(None) => Ok(instance),
                    Err(err) => {
                        report_interceptor_error(&agent, &module, &name, &err);
                        Ok(instance)
                    }
                }
            })
        }
    };

    wrapper.set(ORIGINAL_PROPERTY, original);
    wrapper.set(WRAPPED_MARKER, true);
    wrapper
}

/// Hand a detector outcome to the agent; a block decision becomes a host error
pub(crate) fn report_inspection(
    agent: &AgentHandle,
    module: &str,
    method: &str,
    outcome: anyhow::Result<InterceptorResult>,
) -> Result<(), HostError> {
    match outcome {
        Ok(None) => Ok(()),
        Ok(Some(violation)) => {
            let disposition = agent.on_detected_attack(module, method, &violation);
            let blocked = disposition == AttackDisposition::Block;
            metrics::record_attack(blocked);
            if blocked {
                warn!("Blocked {} in {}.{}", violation.kind, module, method);
                return Err(HostError::Blocked(violation));
            }
            Ok(())
        }
        Err(err) => {
            report_interceptor_error(agent, module, method, &err);
            Ok(())
        }
    }
}

pub(crate) fn report_interceptor_error(agent: &AgentHandle, module: &str, method: &str, err: &anyhow::Error) {
    warn!("Interceptor for {}.{} failed: {:#}", module, method, err);
    metrics::record_interceptor_failure();
    agent.on_error_thrown_by_interceptor(module, method, err);
}
