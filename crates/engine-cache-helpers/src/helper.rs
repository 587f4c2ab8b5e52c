//! Helper function types.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::HelperError;

type SyncHelperFn = dyn Fn(&[Value]) -> Result<Value, HelperError> + Send + Sync;
type AsyncHelperFn =
    dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, HelperError>> + Send + Sync;

/// A synchronous helper callable from templates.
///
/// Helpers take their positional arguments as JSON values and return a JSON
/// value, which the calling engine formats into its output.
#[derive(Clone)]
pub struct Helper(Arc<SyncHelperFn>);

impl Helper {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HelperError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, HelperError> {
        (self.0)(args)
    }

    /// Returns true if both handles point at the same function.
    pub fn ptr_eq(&self, other: &Helper) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Helper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Helper(..)")
    }
}

/// An asynchronous helper.
///
/// Template engines cannot await, so async helpers are never handed to an
/// engine directly. See [`AsyncHelperStore::wrap`](crate::AsyncHelperStore::wrap).
#[derive(Clone)]
pub struct AsyncHelper(Arc<AsyncHelperFn>);

impl AsyncHelper {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HelperError>> + Send + 'static,
    {
        Self(Arc::new(move |args| f(args).boxed()))
    }

    pub fn call(&self, args: Vec<Value>) -> BoxFuture<'static, Result<Value, HelperError>> {
        (self.0)(args)
    }
}

impl fmt::Debug for AsyncHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AsyncHelper(..)")
    }
}

/// A helper stored in a [`HelperStore`](crate::HelperStore), tagged by
/// calling convention.
#[derive(Clone, Debug)]
pub enum HelperFn {
    Sync(Helper),
    Async(AsyncHelper),
}

impl HelperFn {
    pub fn is_async(&self) -> bool {
        matches!(self, HelperFn::Async(_))
    }
}

impl From<Helper> for HelperFn {
    fn from(helper: Helper) -> Self {
        HelperFn::Sync(helper)
    }
}

impl From<AsyncHelper> for HelperFn {
    fn from(helper: AsyncHelper) -> Self {
        HelperFn::Async(helper)
    }
}

/// Formats a helper result for splicing into rendered text.
///
/// Strings are inserted verbatim, `null` becomes empty, everything else uses
/// its JSON representation.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sync_helper_call() {
        let helper = Helper::new(|args| Ok(json!(args.len())));
        assert_eq!(helper.call(&[json!(1), json!(2)]).unwrap(), json!(2));
    }

    #[tokio::test]
    async fn test_async_helper_call() {
        let helper = AsyncHelper::new(|args: Vec<Value>| async move {
            Ok(json!(format!("{}!", value_to_string(&args[0]))))
        });
        assert_eq!(helper.call(vec![json!("hi")]).await.unwrap(), json!("hi!"));
    }

    #[test]
    fn test_helper_fn_tags() {
        let sync: HelperFn = Helper::new(|_| Ok(Value::Null)).into();
        let asynchronous: HelperFn = AsyncHelper::new(|_| async { Ok(Value::Null) }).into();
        assert!(!sync.is_async());
        assert!(asynchronous.is_async());
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("text")), "text");
        assert_eq!(value_to_string(&json!(42)), "42");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&Value::Null), "");
        assert_eq!(value_to_string(&json!([1, 2])), "[1,2]");
    }
}
