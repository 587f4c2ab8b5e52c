//! MiniJinja adapter.
//!
//! Exposes a MiniJinja [`Environment`] as an engine definition. Helpers
//! become template functions: `{{ upper(name) }}` calls the `upper` helper
//! with the value of `name`.

use std::sync::Arc;

use ::minijinja::value::{Rest, Value};
use ::minijinja::{Environment, Error, ErrorKind, UndefinedBehavior};
use engine_cache_helpers::HelperStore;

use crate::definition::{Compiled, EngineSpec};
use crate::error::Result;
use crate::locals::Locals;

const TEMPLATE_NAME: &str = "template";

/// A MiniJinja environment usable as an engine.
///
/// The environment is shared by every render; each render works on a cheap
/// clone so that per-call helpers never leak into other renders.
///
/// # Example
///
/// ```rust
/// use engine_cache::defaults::MiniJinjaEngine;
/// use engine_cache::{EngineRegistry, Locals};
/// use serde_json::{json, Value};
///
/// let mut registry = EngineRegistry::new();
/// registry.register("j2", MiniJinjaEngine::new().into_spec())?;
///
/// let locals = Locals::new()
///     .with("items", json!(["a", "b"]))
///     .with_helper("shout", |args: &[Value]| {
///         Ok(json!(args[0].as_str().unwrap_or_default().to_uppercase()))
///     });
/// let out = registry
///     .get("j2")
///     .unwrap()
///     .render_sync("{% for i in items %}{{ shout(i) }}{% endfor %}", locals)?;
/// assert_eq!(out, "AB");
/// # Ok::<(), engine_cache::RenderError>(())
/// ```
#[derive(Clone)]
pub struct MiniJinjaEngine {
    env: Arc<Environment<'static>>,
}

impl MiniJinjaEngine {
    pub fn new() -> Self {
        Self::with_environment(Environment::new())
    }

    /// Like [`new`](Self::new), but undefined variables are errors instead
    /// of rendering as empty strings.
    pub fn strict() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self::with_environment(env)
    }

    /// Wraps a preconfigured environment (filters, tests, globals).
    pub fn with_environment(env: Environment<'static>) -> Self {
        Self { env: Arc::new(env) }
    }

    pub fn environment(&self) -> &Environment<'static> {
        &self.env
    }

    /// Returns a mutable reference to the environment, cloning it first if
    /// it is shared with an engine definition.
    pub fn environment_mut(&mut self) -> &mut Environment<'static> {
        Arc::make_mut(&mut self.env)
    }

    pub fn render_str(&self, src: &str, locals: &Locals) -> Result<String> {
        let env = with_helpers(&self.env, &locals.helpers);
        Ok(env.render_str(src, Value::from_serialize(&locals.data))?)
    }

    /// Parses `src` once; the returned template renders with per-call helpers.
    pub fn compile(&self, src: &str) -> Result<Compiled> {
        let mut env = Environment::clone(&self.env);
        env.add_template_owned(TEMPLATE_NAME, src.to_string())?;

        Ok(Compiled::template(move |locals| {
            let env = with_helpers(&env, &locals.helpers);
            let template = env.get_template(TEMPLATE_NAME)?;
            Ok(template.render(Value::from_serialize(&locals.data))?)
        }))
    }

    /// Builds the engine definition, named `minijinja`.
    pub fn into_spec(self) -> EngineSpec {
        let render = self.clone();
        EngineSpec::new()
            .name("minijinja")
            .render_sync(move |src: &str, locals: &Locals| render.render_str(src, locals))
            .compile(move |src: &str, _locals: &Locals| self.compile(src))
    }
}

impl Default for MiniJinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// The MiniJinja engine definition with a default environment.
pub fn minijinja() -> EngineSpec {
    MiniJinjaEngine::new().into_spec()
}

fn with_helpers(env: &Environment<'static>, helpers: &HelperStore) -> Environment<'static> {
    let mut env = env.clone();
    for (name, helper) in helpers.sync_helpers() {
        let helper = helper.clone();
        env.add_function(name.to_string(), move |args: Rest<Value>| {
            let args = args
                .iter()
                .map(to_json)
                .collect::<std::result::Result<Vec<_>, Error>>()?;
            let result = helper
                .call(&args)
                .map_err(|err| Error::new(ErrorKind::InvalidOperation, err.to_string()))?;
            Ok::<Value, Error>(Value::from_serialize(&result))
        });
    }
    env
}

fn to_json(value: &Value) -> std::result::Result<serde_json::Value, Error> {
    serde_json::to_value(value).map_err(|err| Error::new(ErrorKind::BadSerialization, err.to_string()))
}
