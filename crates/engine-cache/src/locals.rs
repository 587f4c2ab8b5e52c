//! Per-call template context.

use std::future::Future;

use engine_cache_helpers::{HelperError, HelperStore};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{RenderError, Result};

/// Data and helpers passed to a single compile or render call.
///
/// The registry never mutates a caller's `Locals`: decorated engines take
/// ownership of (or clone) the value before augmenting it.
///
/// # Example
///
/// ```rust
/// use engine_cache::Locals;
/// use serde_json::{json, Value};
///
/// let locals = Locals::new()
///     .with("name", "Ada")
///     .with_helper("shout", |args: &[Value]| {
///         Ok(json!(format!("{}!", args[0].as_str().unwrap_or_default())))
///     });
///
/// assert_eq!(locals.get("name"), Some(&json!("Ada")));
/// assert!(locals.helpers.contains("shout"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Locals {
    /// Template variables.
    pub data: Map<String, Value>,

    /// Call-site helpers. These win over engine helpers with the same name.
    pub helpers: HelperStore,

    /// Set when the render goes through the asynchronous path, where async
    /// helpers are available to the template.
    pub is_async: bool,
}

impl Locals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds locals from any serializable value.
    ///
    /// Objects become template variables; `null` gives empty locals. Any
    /// other value is rejected since it has no variable names.
    pub fn from_serialize<T: Serialize + ?Sized>(data: &T) -> Result<Self> {
        match serde_json::to_value(data).map_err(RenderError::engine)? {
            Value::Object(map) => Ok(Self::from(map)),
            Value::Null => Ok(Self::new()),
            other => Err(RenderError::usage(
                "locals",
                format!(
                    "expected template data to be an object, got {}.",
                    crate::util::value_kind(&other)
                ),
            )),
        }
    }

    /// Adds or replaces a template variable.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_helper<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HelperError> + Send + Sync + 'static,
    {
        self.helpers.add_helper(name, f);
        self
    }

    pub fn with_async_helper<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HelperError>> + Send + 'static,
    {
        self.helpers.add_async_helper(name, f);
        self
    }

    pub fn with_helpers(mut self, helpers: &HelperStore) -> Self {
        self.helpers.extend(helpers);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Resolves a dotted path against the template variables.
    ///
    /// Supports nested objects (`user.name`) and array indices (`items.0`).
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.data.get(parts.next()?)?;

        for part in parts {
            current = match current {
                Value::Object(map) => map.get(part)?,
                Value::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }
}

impl From<Map<String, Value>> for Locals {
    fn from(data: Map<String, Value>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }
}

/// Non-object values carry no variables and convert to empty locals.
impl From<Value> for Locals {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from(map),
            _ => Self::default(),
        }
    }
}

impl From<&Value> for Locals {
    fn from(value: &Value) -> Self {
        Self::from(value.clone())
    }
}

impl From<&Locals> for Locals {
    fn from(locals: &Locals) -> Self {
        locals.clone()
    }
}
