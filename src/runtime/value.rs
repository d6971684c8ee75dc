// src/runtime/value.rs
//! Host values as seen by interceptors
//!
//! Objects are shared: cloning a [`Value::Object`] clones the reference, so a
//! method installed on a namespace through one handle is visible through
//! every other handle. Functions are objects with a native callable.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::agent::HostError;

/// Native function body: `(this, arguments) -> return value`
pub type Callable = Arc<dyn Fn(&Value, Vec<Value>) -> Result<Value, HostError> + Send + Sync>;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Array(Vec<Value>),
    Object(ObjectRef),
}

/// Shared handle to a host object
#[derive(Clone)]
pub struct ObjectRef(Arc<Object>);

struct Object {
    name: Option<String>,
    properties: RwLock<HashMap<String, Value>>,
    callable: Option<Callable>,
}

impl ObjectRef {
    pub fn new() -> Self {
        Self(Arc::new(Object {
            name: None,
            properties: RwLock::new(HashMap::new()),
            callable: None,
        }))
    }

    pub fn function<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Value, Vec<Value>) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Self(Arc::new(Object {
            name: Some(name.into()),
            properties: RwLock::new(HashMap::new()),
            callable: Some(Arc::new(body)),
        }))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.properties.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.properties.write().insert(key.into(), value.into());
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.properties.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.0.properties.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn is_callable(&self) -> bool {
        self.0.callable.is_some()
    }

    /// Invoke the object as a function; the property lock is not held
    pub fn call(&self, this: &Value, args: Vec<Value>) -> Result<Value, HostError> {
        match &self.0.callable {
            Some(body) => body(this, args),
            None => Err(HostError::Thrown(format!(
                "{} is not a function",
                self.name().unwrap_or("object")
            ))),
        }
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&Value::Object(self.clone()), f)
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::new()
    }
}

impl Value {
    pub fn object() -> Self {
        Value::Object(ObjectRef::new())
    }

    pub fn function<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Value, Vec<Value>) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Value::Object(ObjectRef::function(name, body))
    }

    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Object(obj) if obj.is_callable())
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Property lookup; non-objects have no properties
    pub fn get(&self, key: &str) -> Option<Value> {
        self.as_object().and_then(|obj| obj.get(key))
    }

    pub fn call(&self, this: &Value, args: Vec<Value>) -> Result<Value, HostError> {
        match self {
            Value::Object(obj) => obj.call(this, args),
            other => Err(HostError::Thrown(format!("{:?} is not a function", other))),
        }
    }

    /// Strict equality: objects by identity, primitives by value
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same(y))
            }
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items).finish(),
            Value::Object(obj) => match obj.name() {
                Some(name) => write!(f, "[Function: {}]", name),
                None => write!(f, "[Object]"),
            },
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objects_share_properties() {
        let exports = Value::object();
        let alias = exports.clone();
        alias.as_object().unwrap().set("version", "1.0.0");

        assert_eq!(exports.get("version").unwrap().as_str(), Some("1.0.0"));
        assert!(exports.same(&alias));
        assert!(!exports.same(&Value::object()));
    }

    #[test]
    fn test_function_call() {
        let add = Value::function("add", |_, args| {
            let sum = args.iter().filter_map(Value::as_f64).sum::<f64>();
            Ok(Value::Number(sum))
        });

        let result = add
            .call(&Value::Undefined, vec![1.0.into(), 2.0.into()])
            .unwrap();
        assert_eq!(result.as_f64(), Some(3.0));
        assert!(add.is_callable());
    }

    #[test]
    fn test_call_non_function_throws() {
        let err = Value::object().call(&Value::Undefined, vec![]).unwrap_err();
        assert!(matches!(err, HostError::Thrown(_)));
    }

    #[test]
    fn test_function_can_mutate_own_properties() {
        let counter = ObjectRef::new();
        counter.set("calls", 0.0);
        let target = counter.clone();
        let bump = ObjectRef::function("bump", move |_, _| {
            let calls = target.get("calls").and_then(|v| v.as_f64()).unwrap_or(0.0);
            target.set("calls", calls + 1.0);
            Ok(Value::Undefined)
        });
        counter.set("bump", bump.clone());

        bump.call(&Value::Undefined, vec![]).unwrap();
        bump.call(&Value::Undefined, vec![]).unwrap();
        assert_eq!(counter.get("calls").unwrap().as_f64(), Some(2.0));
    }
}
