//! Canonical engine records.
//!
//! Registration goes through two steps, each with its own type:
//!
//! 1. [`normalize`] validates an engine definition and builds a
//!    [`NormalizedEngine`]: the raw capabilities of the library, its options,
//!    and freshly allocated helper stores.
//! 2. [`decorate`] turns that record into an [`Engine`], whose `compile`,
//!    `render`, `render_sync` and `render_file` merge helpers, accept either
//!    source text or compiled templates, and resolve async helper placeholders.
//!
//! Callers normally never see step 1; [`EngineRegistry`](crate::EngineRegistry)
//! runs both.

mod compiled;
mod decorate;

use std::fmt;
use std::sync::Arc;

use engine_cache_helpers::{AsyncHelperStore, HelperStore};
use futures::FutureExt;
use log::debug;
use serde_json::{Map, Value};

use crate::definition::{
    CompileFn, EngineDefinition, EngineSpec, RegistrationArg, RenderFileFn, RenderFn,
    RenderSyncFn,
};
use crate::error::{RenderError, Result};
use crate::locals::Locals;
use crate::util::{format_ext, strip_ext, value_kind};

pub use compiled::{CompiledTemplate, Source};
pub use decorate::decorate;

/// The raw functions of the underlying library.
#[derive(Clone, Default)]
pub(crate) struct Capabilities {
    pub(crate) render: Option<RenderFn>,
    pub(crate) render_sync: Option<RenderSyncFn>,
    pub(crate) compile: Option<CompileFn>,
    pub(crate) render_file: Option<RenderFileFn>,
}

/// A validated engine whose methods have not been wrapped yet.
pub struct NormalizedEngine {
    pub(crate) name: String,
    pub(crate) ext: String,
    pub(crate) options: Map<String, Value>,
    pub(crate) extras: Map<String, Value>,
    pub(crate) helpers: HelperStore,
    pub(crate) async_helpers: AsyncHelperStore,
    pub(crate) caps: Capabilities,
}

impl NormalizedEngine {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }
}

impl fmt::Debug for NormalizedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedEngine")
            .field("name", &self.name)
            .field("ext", &self.ext)
            .finish_non_exhaustive()
    }
}

/// Validates `definition` and builds the canonical record for `ext`.
///
/// `options` are layered over the definition's own options, and the
/// normalized extension is stored under `options["ext"]`.
///
/// # Errors
///
/// [`RenderError::Configuration`] when the extension is empty, when the
/// definition is not an object or function, or when it provides neither
/// `render` nor `render_sync`.
pub fn normalize(
    ext: &str,
    definition: impl Into<RegistrationArg>,
    options: Option<Map<String, Value>>,
) -> Result<NormalizedEngine> {
    let ext = format_ext(ext);
    if ext.len() < 2 {
        return Err(RenderError::configuration(
            ext,
            "expected a non-empty extension",
        ));
    }

    let spec = match definition.into() {
        RegistrationArg::Definition(EngineDefinition::Spec(spec)) => spec,
        RegistrationArg::Definition(EngineDefinition::Function(func)) => {
            let render = func.render.f;
            EngineSpec {
                render: Some(crate::definition::Named {
                    name: func.render.name,
                    f: Arc::new(move |src: String, locals: Locals| {
                        futures::future::ready(render(src.as_str(), &locals)).boxed()
                    }),
                }),
                ..EngineSpec::default()
            }
        }
        // A plain object keeps its keys, and then fails the render check below.
        RegistrationArg::Options(map) => EngineSpec {
            extras: map,
            ..EngineSpec::default()
        },
        RegistrationArg::Invalid(value) => {
            return Err(RenderError::configuration(
                ext,
                format!(
                    "expected engine to be an object or function, got {}",
                    value_kind(&value)
                ),
            ));
        }
    };

    if spec.render.is_none() && spec.render_sync.is_none() {
        return Err(RenderError::configuration(
            ext,
            "engines are expected to have a \"render\" or \"render_sync\" method",
        ));
    }

    let name = spec
        .name
        .clone()
        .or_else(|| spec.render.as_ref().and_then(|r| r.name.clone()))
        .or_else(|| spec.render_sync.as_ref().and_then(|r| r.name.clone()))
        .unwrap_or_else(|| strip_ext(&ext).to_string());

    let mut merged_options = spec.options;
    if let Some(options) = options {
        merged_options.extend(options);
    }
    merged_options.insert("ext".to_string(), Value::String(ext.clone()));

    let async_helpers = AsyncHelperStore::new();
    for (helper_name, helper) in spec.helpers.async_helpers() {
        async_helpers.set(helper_name, helper.clone());
    }

    debug!("normalized engine \"{}\" for {}", name, ext);

    Ok(NormalizedEngine {
        name,
        ext,
        options: merged_options,
        extras: spec.extras,
        helpers: spec.helpers,
        async_helpers,
        caps: Capabilities {
            render: spec.render.map(|r| r.f),
            render_sync: spec.render_sync.map(|r| r.f),
            compile: spec.compile,
            render_file: spec.render_file.or(spec.express),
        },
    })
}

/// A registered template engine.
///
/// Created by the [`EngineRegistry`](crate::EngineRegistry) (or by
/// [`normalize`] followed by [`decorate`]). Rendering methods live in the
/// `decorate` module.
#[derive(Clone)]
pub struct Engine {
    pub(crate) name: String,
    pub(crate) ext: String,
    pub(crate) options: Map<String, Value>,
    pub(crate) extras: Map<String, Value>,
    pub(crate) helpers: HelperStore,
    pub(crate) async_helpers: AsyncHelperStore,
    pub(crate) caps: Arc<Capabilities>,
}

impl Engine {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The normalized extension this engine was registered for.
    pub fn ext(&self) -> &str {
        &self.ext
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    /// Values carried over verbatim from the definition.
    pub fn extras(&self) -> &Map<String, Value> {
        &self.extras
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }

    pub fn helpers(&self) -> &HelperStore {
        &self.helpers
    }

    pub fn helpers_mut(&mut self) -> &mut HelperStore {
        &mut self.helpers
    }

    pub fn async_helpers(&self) -> &AsyncHelperStore {
        &self.async_helpers
    }

    pub fn has_render(&self) -> bool {
        self.caps.render.is_some()
    }

    pub fn has_render_sync(&self) -> bool {
        self.caps.render_sync.is_some()
    }

    pub fn has_compile(&self) -> bool {
        self.caps.compile.is_some()
    }

    pub fn has_render_file(&self) -> bool {
        self.caps.render_file.is_some()
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.name)
            .field("ext", &self.ext)
            .field("render", &self.has_render())
            .field("render_sync", &self.has_render_sync())
            .field("compile", &self.has_compile())
            .field("render_file", &self.has_render_file())
            .field("options", &self.options)
            .field("helpers", &self.helpers.helpers().keys().collect::<Vec<_>>())
            .finish()
    }
}
