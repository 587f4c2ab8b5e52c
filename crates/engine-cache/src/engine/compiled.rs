//! Compiled templates and render sources.

use std::fmt;
use std::sync::Arc;

use engine_cache_helpers::{value_to_string, AsyncHelperStore, HelperFn, HelperStore, RenderScope};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::trace;
use serde_json::Value;

use super::Capabilities;
use crate::definition::Compiled;
use crate::error::{RenderError, Result};
use crate::locals::Locals;

/// The template argument of `compile`, `render` and `render_sync`.
///
/// Usually built implicitly: `&str` and `String` become [`Source::Text`], a
/// [`CompiledTemplate`] becomes [`Source::Compiled`]. A JSON string value is
/// text; any other JSON value is [`Source::Invalid`] and is rejected with a
/// usage error.
#[derive(Clone, Debug)]
pub enum Source {
    Text(String),
    Compiled(CompiledTemplate),
    Invalid(Value),
}

impl From<&str> for Source {
    fn from(text: &str) -> Self {
        Source::Text(text.to_string())
    }
}

impl From<String> for Source {
    fn from(text: String) -> Self {
        Source::Text(text)
    }
}

impl From<&String> for Source {
    fn from(text: &String) -> Self {
        Source::Text(text.clone())
    }
}

impl From<CompiledTemplate> for Source {
    fn from(template: CompiledTemplate) -> Self {
        Source::Compiled(template)
    }
}

impl From<&CompiledTemplate> for Source {
    fn from(template: &CompiledTemplate) -> Self {
        Source::Compiled(template.clone())
    }
}

impl From<Value> for Source {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Source::Text(text),
            other => Source::Invalid(other),
        }
    }
}

struct Inner {
    compiled: Compiled,
    helpers: HelperStore,
    caps: Arc<Capabilities>,
    async_helpers: AsyncHelperStore,
}

/// A template compiled by a decorated engine.
///
/// Cloning is cheap and clones compare equal under [`ptr_eq`](Self::ptr_eq).
/// Passing a compiled template back to `compile` returns it unchanged.
#[derive(Clone)]
pub struct CompiledTemplate {
    inner: Arc<Inner>,
}

impl CompiledTemplate {
    pub(crate) fn new(
        compiled: Compiled,
        helpers: HelperStore,
        caps: Arc<Capabilities>,
        async_helpers: AsyncHelperStore,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                compiled,
                helpers,
                caps,
                async_helpers,
            }),
        }
    }

    /// What the library's `compile` returned.
    pub fn compiled(&self) -> &Compiled {
        &self.inner.compiled
    }

    /// The template text, when the library compiled to a plain string.
    pub fn source(&self) -> Option<&str> {
        match &self.inner.compiled {
            Compiled::Source(src) => Some(src.as_str()),
            Compiled::Template(_) => None,
        }
    }

    /// Helpers captured at compile time (engine helpers plus the compile
    /// call's helpers).
    pub fn helpers(&self) -> &HelperStore {
        &self.inner.helpers
    }

    pub fn ptr_eq(&self, other: &CompiledTemplate) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Renders synchronously.
    ///
    /// Async helpers are not available in this mode. Fails with a usage error
    /// when the template compiled to a string and the library only renders
    /// asynchronously.
    pub fn render(&self, locals: impl Into<Locals>) -> Result<String> {
        let locals = prepare(locals.into(), &self.inner.helpers, None);
        match &self.inner.compiled {
            Compiled::Template(template) => template(&locals),
            Compiled::Source(src) => match &self.inner.caps.render_sync {
                Some(render_sync) => render_sync(src.as_str(), &locals),
                None => Err(RenderError::usage(
                    "render_sync",
                    "is not supported by an engine without a synchronous render method.",
                )),
            },
        }
    }

    /// Renders with async helpers enabled, then resolves their placeholders.
    pub fn render_async(&self, locals: impl Into<Locals>) -> BoxFuture<'static, Result<String>> {
        self.render_in(locals.into(), self.inner.async_helpers.scope())
    }

    /// Async render whose helper calls belong to `scope`. The scope lives as
    /// long as the returned future, so its calls are gone once it completes
    /// or is dropped.
    pub(crate) fn render_in(
        &self,
        locals: Locals,
        scope: RenderScope,
    ) -> BoxFuture<'static, Result<String>> {
        let this = self.clone();
        async move {
            let inner = &this.inner;
            let locals = prepare(locals, &inner.helpers, Some(&scope));
            let output = match &inner.compiled {
                Compiled::Template(template) => template(&locals)?,
                Compiled::Source(src) => match (&inner.caps.render, &inner.caps.render_sync) {
                    (Some(render), _) => render(src.clone(), locals).await?,
                    (None, Some(render_sync)) => render_sync(src.as_str(), &locals)?,
                    (None, None) => {
                        return Err(RenderError::usage("render", "has no render method."))
                    }
                },
            };
            resolve_placeholders(scope.store(), Some(&scope), output).await
        }
        .boxed()
    }
}

impl fmt::Debug for CompiledTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledTemplate")
            .field("compiled", &self.inner.compiled)
            .field("helpers", &self.inner.helpers.len())
            .finish()
    }
}

/// Builds the locals handed to a library: a copy of `locals` whose helpers
/// are `base` overlaid with the call-site helpers.
///
/// With a render scope, async helpers are replaced by placeholder-producing
/// stand-ins. Without one they are left out, so libraries only ever see
/// synchronous helpers.
pub(crate) fn prepare(locals: Locals, base: &HelperStore, scope: Option<&RenderScope>) -> Locals {
    let merged = base.merge(&locals.helpers);
    let mut helpers = HelperStore::new();
    for (name, helper) in merged.helpers() {
        match (helper, scope) {
            (HelperFn::Sync(helper), _) => {
                helpers.add(name.clone(), helper.clone());
            }
            (HelperFn::Async(helper), Some(scope)) => {
                helpers.add(name.clone(), scope.wrap_helper(name, helper.clone()));
            }
            (HelperFn::Async(_), None) => {}
        }
    }

    Locals {
        data: locals.data,
        helpers,
        is_async: scope.is_some(),
    }
}

/// Replaces every placeholder found in `content` with its value.
///
/// With a scope only that render's tokens are considered; without one, every
/// pending token of `store`. Tokens are resolved in creation order and the
/// first failure aborts. Values may themselves carry tokens, so the content
/// is scanned again until none is left or a pass changes nothing. Tokens
/// that do not occur in `content` are left alone.
pub(crate) async fn resolve_placeholders(
    store: &AsyncHelperStore,
    scope: Option<&RenderScope>,
    mut content: String,
) -> Result<String> {
    loop {
        let candidates = match scope {
            Some(scope) => scope.tokens(),
            None => store.stash(),
        };
        let mut progressed = false;
        for token in candidates {
            if !content.contains(&token) {
                continue;
            }
            let value = store
                .resolve(&token)
                .await
                .map_err(|source| RenderError::Resolution {
                    token: token.clone(),
                    source,
                })?;
            trace!("replacing {}", token);
            let replaced = content.replace(&token, &value_to_string(&value));
            progressed |= replaced != content;
            content = replaced;
        }
        if !progressed {
            return Ok(content);
        }
    }
}
