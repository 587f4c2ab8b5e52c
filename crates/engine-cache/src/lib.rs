//! # Engine Cache - Pluggable Template Engine Registry
//!
//! `engine-cache` keeps template engines keyed by file extension and renders
//! through all of them with one interface, whatever calling convention the
//! underlying library uses.
//!
//! ## Core Concepts
//!
//! - [`EngineSpec`] / [`EngineDefinition`]: how a template library is
//!   described: any of `render`, `render_sync`, `compile`, `render_file`
//! - [`EngineRegistry`]: extension to engine mapping with default and
//!   wildcard fallbacks
//! - [`Engine`]: a registered engine; `compile`, `render`, `render_sync`
//!   and `render_file` work the same for every library
//! - [`Locals`]: template variables plus call-site helpers
//! - Async helpers: helpers returning futures, usable from synchronous
//!   template libraries through placeholder substitution
//!
//! ## Quick Start
//!
//! ```rust
//! use engine_cache::{defaults, EngineRegistry, Locals};
//!
//! let mut registry = EngineRegistry::with_defaults()?;
//! registry.register("tmpl", defaults::base())?;
//!
//! let engine = registry.get("tmpl").unwrap();
//! let out = engine.render_sync("Hello, <%= name %>!", Locals::new().with("name", "Ada"))?;
//! assert_eq!(out, "Hello, Ada!");
//!
//! // Unknown extensions fall back to the pass-through engine under `*`.
//! let raw = registry.get("md").unwrap().render_sync("# <%= name %>", Locals::new())?;
//! assert_eq!(raw, "# <%= name %>");
//! # Ok::<(), engine_cache::RenderError>(())
//! ```
//!
//! ## Async Helpers
//!
//! Template libraries call helpers synchronously. An async helper is
//! replaced, for the duration of an async render, by a stand-in returning a
//! placeholder token; the token is swapped for the helper's result once the
//! library is done.
//!
//! ```rust
//! use engine_cache::{defaults, EngineRegistry, Locals};
//! use futures::executor::block_on;
//! use serde_json::{json, Value};
//!
//! let mut registry = EngineRegistry::new();
//! registry.register("tmpl", defaults::base())?;
//!
//! let locals = Locals::new()
//!     .with("jon", "foo")
//!     .with_async_helper("upper", |args: Vec<Value>| async move {
//!         Ok(json!(args[0].as_str().unwrap_or_default().to_uppercase()))
//!     });
//!
//! let engine = registry.get("tmpl").unwrap();
//! let out = block_on(engine.render("Jon: <%= upper(jon) %>", locals))?;
//! assert_eq!(out, "Jon: FOO");
//! # Ok::<(), engine_cache::RenderError>(())
//! ```
//!
//! ## Cargo Features
//!
//! - `minijinja` (default): the [`defaults::MiniJinjaEngine`] adapter

pub mod config;
pub mod defaults;
mod definition;
mod engine;
mod error;
mod locals;
mod registry;
pub mod util;

pub use config::{DefaultEngine, RegistryConfig, RegistrySettings};
pub use definition::{
    CompileFn, Compiled, EngineDefinition, EngineFunction, EngineSpec, RegistrationArg,
    RenderFileFn, RenderFn, RenderSyncFn, TemplateFn,
};
pub use engine::{decorate, normalize, CompiledTemplate, Engine, NormalizedEngine, Source};
pub use error::{BoxError, RenderError, Result};
pub use locals::Locals;
pub use registry::EngineRegistry;

pub use engine_cache_helpers::{
    AsyncHelper, AsyncHelperStore, Helper, HelperError, HelperFn, HelperStore, RenderScope,
};
