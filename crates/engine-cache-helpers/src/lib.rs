//! Helper stores for template engines.
//!
//! This crate provides the two collaborators an engine needs to expose
//! functions to templates:
//!
//! - [`HelperStore`]: a name to function mapping holding both synchronous
//!   ([`Helper`]) and asynchronous ([`AsyncHelper`]) helpers.
//! - [`AsyncHelperStore`]: the bridge that lets a synchronous template engine
//!   call an asynchronous helper. The wrapped helper returns an opaque
//!   placeholder token immediately and records the pending invocation in a
//!   stash; once rendering finishes, each token found in the output is
//!   resolved and spliced back in. A [`RenderScope`] groups the calls of
//!   one render and forgets them when dropped.
//!
//! # Example
//!
//! ```rust
//! use engine_cache_helpers::{AsyncHelper, AsyncHelperStore};
//! use serde_json::{json, Value};
//!
//! let store = AsyncHelperStore::new();
//! store.set("upper", AsyncHelper::new(|args: Vec<Value>| async move {
//!     Ok(json!(args[0].as_str().unwrap_or_default().to_uppercase()))
//! }));
//!
//! // What a template engine sees: a plain synchronous function.
//! let upper = store.wrap("upper").unwrap();
//! let token = upper.call(&[json!("foo")]).unwrap();
//! let token = token.as_str().unwrap();
//! assert!(store.has_pending(token));
//!
//! let value = futures::executor::block_on(store.resolve(token)).unwrap();
//! assert_eq!(value, json!("FOO"));
//! assert!(!store.has_pending(token));
//! ```

mod error;
mod helper;
mod stash;
mod store;

pub use error::HelperError;
pub use helper::{value_to_string, AsyncHelper, Helper, HelperFn};
pub use stash::{AsyncHelperStore, RenderScope};
pub use store::HelperStore;
