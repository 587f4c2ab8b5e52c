//! Engine definitions as supplied by callers.
//!
//! A template library is described to the registry by an [`EngineDefinition`]:
//! either a bare render function or an [`EngineSpec`] listing whichever
//! capabilities the library has. The registry inspects the definition once,
//! when it is registered, and from then on only deals with the canonical
//! [`Engine`](crate::Engine).
//!
//! # Capabilities
//!
//! | Capability | Signature | Required |
//! |------------|-----------|----------|
//! | `render` | `Fn(String, Locals) -> Future<Result<String>>` | one of `render` / `render_sync` |
//! | `render_sync` | `Fn(&str, &Locals) -> Result<String>` | one of `render` / `render_sync` |
//! | `compile` | `Fn(&str, &Locals) -> Result<Compiled>` | no, defaults to pass-through |
//! | `render_file` | `Fn(PathBuf, Locals) -> Future<Result<String>>` | no |
//!
//! `express` is accepted as an alias for `render_file`, matching libraries
//! that only ship a web-framework view callback.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use engine_cache_helpers::{HelperError, HelperStore};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::locals::Locals;
use crate::util::function_name;

pub type RenderFn = Arc<dyn Fn(String, Locals) -> BoxFuture<'static, Result<String>> + Send + Sync>;
pub type RenderSyncFn = Arc<dyn Fn(&str, &Locals) -> Result<String> + Send + Sync>;
pub type CompileFn = Arc<dyn Fn(&str, &Locals) -> Result<Compiled> + Send + Sync>;
pub type RenderFileFn =
    Arc<dyn Fn(PathBuf, Locals) -> BoxFuture<'static, Result<String>> + Send + Sync>;
pub type TemplateFn = Arc<dyn Fn(&Locals) -> Result<String> + Send + Sync>;

/// What a library's raw `compile` produced.
#[derive(Clone)]
pub enum Compiled {
    /// A plain string, rendered later through the library's render functions.
    Source(String),
    /// A callable template.
    Template(TemplateFn),
}

impl Compiled {
    pub fn template<F>(f: F) -> Self
    where
        F: Fn(&Locals) -> Result<String> + Send + Sync + 'static,
    {
        Compiled::Template(Arc::new(f))
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Compiled::Template(_))
    }
}

impl fmt::Debug for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compiled::Source(src) => f.debug_tuple("Source").field(src).finish(),
            Compiled::Template(_) => f.write_str("Template(..)"),
        }
    }
}

/// A capability together with the name of the Rust function providing it.
#[derive(Clone)]
pub(crate) struct Named<T> {
    pub(crate) name: Option<String>,
    pub(crate) f: T,
}

/// A bare render function used as an engine definition.
#[derive(Clone)]
pub struct EngineFunction {
    pub(crate) render: Named<RenderSyncFn>,
}

/// Capability record for a template library.
///
/// Build one with the chained setters; any capability left unset is simply
/// absent. Extra values set with [`extra`](Self::extra) are kept verbatim on
/// the registered engine.
///
/// # Example
///
/// ```rust
/// use engine_cache::{EngineSpec, Locals};
///
/// fn shout(src: &str, _locals: &Locals) -> engine_cache::Result<String> {
///     Ok(src.to_uppercase())
/// }
///
/// let spec = EngineSpec::new()
///     .render_sync(shout)
///     .option("layout", "default")
///     .extra("version", "1.2.0");
///
/// assert!(spec.has_render_sync());
/// assert!(!spec.has_render());
/// ```
#[derive(Clone, Default)]
pub struct EngineSpec {
    pub(crate) name: Option<String>,
    pub(crate) render: Option<Named<RenderFn>>,
    pub(crate) render_sync: Option<Named<RenderSyncFn>>,
    pub(crate) render_file: Option<RenderFileFn>,
    pub(crate) express: Option<RenderFileFn>,
    pub(crate) compile: Option<CompileFn>,
    pub(crate) options: Map<String, Value>,
    pub(crate) helpers: HelperStore,
    pub(crate) extras: Map<String, Value>,
}

impl EngineSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the engine name. Without one, the name is derived from the render
    /// function or from the extension.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn render<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, Locals) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.render = Some(Named {
            name: function_name::<F>(),
            f: Arc::new(move |src: String, locals: Locals| f(src, locals).boxed()),
        });
        self
    }

    pub fn render_sync<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Locals) -> Result<String> + Send + Sync + 'static,
    {
        self.render_sync = Some(Named {
            name: function_name::<F>(),
            f: Arc::new(f),
        });
        self
    }

    pub fn render_file<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PathBuf, Locals) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.render_file = Some(Arc::new(move |path: PathBuf, locals: Locals| {
            f(path, locals).boxed()
        }));
        self
    }

    /// Sets the web-framework view callback, used as `render_file` when no
    /// `render_file` is given.
    pub fn express<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(PathBuf, Locals) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.express = Some(Arc::new(move |path: PathBuf, locals: Locals| {
            f(path, locals).boxed()
        }));
        self
    }

    pub fn compile<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &Locals) -> Result<Compiled> + Send + Sync + 'static,
    {
        self.compile = Some(Arc::new(f));
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn options(mut self, options: Map<String, Value>) -> Self {
        self.options.extend(options);
        self
    }

    /// Adds a helper available to every template rendered by this engine.
    pub fn helper<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, HelperError> + Send + Sync + 'static,
    {
        self.helpers.add_helper(name, f);
        self
    }

    pub fn async_helper<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HelperError>> + Send + 'static,
    {
        self.helpers.add_async_helper(name, f);
        self
    }

    /// Stores an arbitrary value on the engine record.
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    pub fn has_render(&self) -> bool {
        self.render.is_some()
    }

    pub fn has_render_sync(&self) -> bool {
        self.render_sync.is_some()
    }

    pub fn has_render_file(&self) -> bool {
        self.render_file.is_some() || self.express.is_some()
    }

    /// Returns true if the record carries any rendering capability.
    pub fn looks_like_engine(&self) -> bool {
        self.has_render() || self.has_render_sync() || self.has_render_file()
    }
}

impl fmt::Debug for EngineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSpec")
            .field("name", &self.name)
            .field("render", &self.has_render())
            .field("render_sync", &self.has_render_sync())
            .field("render_file", &self.has_render_file())
            .field("compile", &self.compile.is_some())
            .field("options", &self.options)
            .field("extras", &self.extras)
            .finish()
    }
}

/// An engine as supplied to the registry.
#[derive(Clone)]
pub enum EngineDefinition {
    /// A bare function, used as the engine's `render`.
    Function(EngineFunction),
    /// A capability record.
    Spec(EngineSpec),
}

impl EngineDefinition {
    /// Uses `f` directly as the engine's render function.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&str, &Locals) -> Result<String> + Send + Sync + 'static,
    {
        EngineDefinition::Function(EngineFunction {
            render: Named {
                name: function_name::<F>(),
                f: Arc::new(f),
            },
        })
    }
}

impl From<EngineSpec> for EngineDefinition {
    fn from(spec: EngineSpec) -> Self {
        EngineDefinition::Spec(spec)
    }
}

impl fmt::Debug for EngineDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineDefinition::Function(func) => f
                .debug_tuple("Function")
                .field(&func.render.name)
                .finish(),
            EngineDefinition::Spec(spec) => f.debug_tuple("Spec").field(spec).finish(),
        }
    }
}

/// One positional argument of [`EngineRegistry::register_with`](crate::EngineRegistry::register_with).
///
/// Registration accepts the engine and its options in either order; this type
/// lets both slots hold either kind of value.
#[derive(Clone, Debug)]
pub enum RegistrationArg {
    Definition(EngineDefinition),
    Options(Map<String, Value>),
    /// A value that is neither an engine nor an options object.
    Invalid(Value),
}

impl RegistrationArg {
    /// Returns true for a function, or a record with `render`, `render_sync`
    /// or `render_file`.
    pub fn is_engine(&self) -> bool {
        match self {
            RegistrationArg::Definition(EngineDefinition::Function(_)) => true,
            RegistrationArg::Definition(EngineDefinition::Spec(spec)) => spec.looks_like_engine(),
            RegistrationArg::Options(_) | RegistrationArg::Invalid(_) => false,
        }
    }
}

impl From<EngineDefinition> for RegistrationArg {
    fn from(definition: EngineDefinition) -> Self {
        RegistrationArg::Definition(definition)
    }
}

impl From<EngineSpec> for RegistrationArg {
    fn from(spec: EngineSpec) -> Self {
        RegistrationArg::Definition(EngineDefinition::Spec(spec))
    }
}

impl From<Map<String, Value>> for RegistrationArg {
    fn from(options: Map<String, Value>) -> Self {
        RegistrationArg::Options(options)
    }
}

impl From<Value> for RegistrationArg {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => RegistrationArg::Options(map),
            other => RegistrationArg::Invalid(other),
        }
    }
}
