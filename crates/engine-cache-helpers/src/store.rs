//! Named helper storage.

use std::collections::BTreeMap;
use std::future::Future;

use serde_json::Value;

use crate::{AsyncHelper, Helper, HelperError, HelperFn};

/// A mapping from helper name to helper function.
///
/// Iteration is ordered by name so that merged stores behave the same on
/// every run.
///
/// # Example
///
/// ```rust
/// use engine_cache_helpers::HelperStore;
/// use serde_json::{json, Value};
///
/// let mut helpers = HelperStore::new();
/// helpers.add_helper("lower", |args: &[Value]| {
///     Ok(json!(args[0].as_str().unwrap_or_default().to_lowercase()))
/// });
/// helpers.add_async_helper("upper", |args: Vec<Value>| async move {
///     Ok(json!(args[0].as_str().unwrap_or_default().to_uppercase()))
/// });
///
/// assert!(!helpers.is_async("lower"));
/// assert!(helpers.is_async("upper"));
/// assert_eq!(helpers.len(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct HelperStore {
    helpers: BTreeMap<String, HelperFn>,
}

impl HelperStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a helper under `name`, replacing any helper with the same name.
    pub fn add(&mut self, name: impl Into<String>, helper: impl Into<HelperFn>) -> &mut Self {
        self.helpers.insert(name.into(), helper.into());
        self
    }

    /// Adds a synchronous helper.
    pub fn add_helper<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, HelperError> + Send + Sync + 'static,
    {
        self.add(name, Helper::new(f))
    }

    /// Adds an asynchronous helper.
    pub fn add_async_helper<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HelperError>> + Send + 'static,
    {
        self.add(name, AsyncHelper::new(f))
    }

    pub fn get_helper(&self, name: &str) -> Option<&HelperFn> {
        self.helpers.get(name)
    }

    /// Returns the complete name to helper mapping.
    pub fn helpers(&self) -> &BTreeMap<String, HelperFn> {
        &self.helpers
    }

    pub fn contains(&self, name: &str) -> bool {
        self.helpers.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<HelperFn> {
        self.helpers.remove(name)
    }

    pub fn is_async(&self, name: &str) -> bool {
        self.helpers.get(name).is_some_and(HelperFn::is_async)
    }

    pub fn sync_helpers(&self) -> impl Iterator<Item = (&str, &Helper)> {
        self.helpers.iter().filter_map(|(name, helper)| match helper {
            HelperFn::Sync(h) => Some((name.as_str(), h)),
            HelperFn::Async(_) => None,
        })
    }

    pub fn async_helpers(&self) -> impl Iterator<Item = (&str, &AsyncHelper)> {
        self.helpers.iter().filter_map(|(name, helper)| match helper {
            HelperFn::Async(h) => Some((name.as_str(), h)),
            HelperFn::Sync(_) => None,
        })
    }

    /// Returns a new store containing `self` overlaid with `other`.
    ///
    /// Helpers in `other` win on name collisions.
    pub fn merge(&self, other: &HelperStore) -> HelperStore {
        let mut merged = self.clone();
        merged.extend(other);
        merged
    }

    /// Copies every helper from `other` into `self`, replacing collisions.
    pub fn extend(&mut self, other: &HelperStore) {
        for (name, helper) in &other.helpers {
            self.helpers.insert(name.clone(), helper.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.helpers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.helpers.is_empty()
    }
}
