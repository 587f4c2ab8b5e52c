//! The uniform engine contract.

use std::path::Path;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use engine_cache_helpers::RenderScope;
use futures::FutureExt;
use log::debug;

use super::compiled::{prepare, resolve_placeholders, CompiledTemplate, Source};
use super::{Engine, NormalizedEngine};
use crate::definition::Compiled;
use crate::error::{RenderError, Result};
use crate::locals::Locals;

/// Wraps a normalized engine's raw capabilities into an [`Engine`].
pub fn decorate(engine: NormalizedEngine) -> Engine {
    Engine {
        name: engine.name,
        ext: engine.ext,
        options: engine.options,
        extras: engine.extras,
        helpers: engine.helpers,
        async_helpers: engine.async_helpers,
        caps: Arc::new(engine.caps),
    }
}

impl Engine {
    /// Compiles `src` into a reusable template.
    ///
    /// A [`CompiledTemplate`] passed as `src` is returned as is. Text is
    /// handed to the library's `compile` with the engine helpers merged with
    /// the call's helpers; libraries without `compile` keep the text, which
    /// is then rendered through `render` / `render_sync`.
    ///
    /// # Errors
    ///
    /// [`RenderError::Usage`] for a source that is neither text nor compiled,
    /// or whatever the library's `compile` reports.
    pub fn compile(
        &self,
        src: impl Into<Source>,
        locals: impl Into<Locals>,
    ) -> Result<CompiledTemplate> {
        match src.into() {
            Source::Compiled(template) => Ok(template),
            Source::Text(text) => {
                let locals = locals.into();
                let scope = locals.is_async.then(|| self.async_helpers.scope());
                self.compile_text(&text, locals, scope.as_ref())
            }
            Source::Invalid(value) => Err(RenderError::invalid_source("compile", &value)),
        }
    }

    fn compile_text(
        &self,
        text: &str,
        locals: Locals,
        scope: Option<&RenderScope>,
    ) -> Result<CompiledTemplate> {
        let helpers = self.helpers.merge(&locals.helpers);
        for (name, helper) in helpers.async_helpers() {
            self.async_helpers.set(name, helper.clone());
        }

        let compiled = match &self.caps.compile {
            Some(compile) => compile(text, &prepare(locals, &helpers, scope))?,
            None => Compiled::Source(text.to_string()),
        };

        Ok(CompiledTemplate::new(
            compiled,
            helpers,
            Arc::clone(&self.caps),
            self.async_helpers.clone(),
        ))
    }

    /// Renders `src` with async helpers enabled.
    ///
    /// Text is compiled first. Placeholders left by async helpers are
    /// resolved, in the order the helpers were called, before the future
    /// completes. Calls the render stashed but never resolved are dropped
    /// with it, whatever the outcome. `locals` is copied; the caller's value
    /// is never changed.
    ///
    /// # Example
    ///
    /// ```rust
    /// use engine_cache::{EngineRegistry, EngineSpec, Locals};
    /// use futures::executor::block_on;
    ///
    /// let mut registry = EngineRegistry::new();
    /// registry.register(
    ///     "txt",
    ///     EngineSpec::new().render_sync(|src: &str, _: &Locals| Ok(src.to_uppercase())),
    /// )?;
    ///
    /// let engine = registry.get("txt").unwrap();
    /// assert_eq!(block_on(engine.render("hi", Locals::new()))?, "HI");
    /// # Ok::<(), engine_cache::RenderError>(())
    /// ```
    pub fn render(
        &self,
        src: impl Into<Source>,
        locals: impl Into<Locals>,
    ) -> BoxFuture<'static, Result<String>> {
        let mut locals = locals.into();
        locals.is_async = true;

        let scope = self.async_helpers.scope();
        let template = match src.into() {
            Source::Compiled(template) => template,
            Source::Text(text) => match self.compile_text(&text, locals.clone(), Some(&scope)) {
                Ok(template) => template,
                Err(err) => return future::ready(Err(err)).boxed(),
            },
            Source::Invalid(value) => {
                return future::ready(Err(RenderError::invalid_source("render", &value))).boxed()
            }
        };

        template.render_in(locals, scope)
    }

    /// Renders `src` synchronously. Async helpers are not available.
    pub fn render_sync(&self, src: impl Into<Source>, locals: impl Into<Locals>) -> Result<String> {
        let mut locals = locals.into();
        locals.is_async = false;

        match src.into() {
            Source::Compiled(template) => template.render(locals),
            Source::Text(text) => self.compile_text(&text, locals.clone(), None)?.render(locals),
            Source::Invalid(value) => Err(RenderError::invalid_source("render_sync", &value)),
        }
    }

    /// Renders the template file at `path`.
    ///
    /// Engines with their own `render_file` (or `express`) capability get
    /// the path directly. Otherwise the file is read and rendered with
    /// [`render`](Self::render).
    pub fn render_file(
        &self,
        path: impl AsRef<Path>,
        locals: impl Into<Locals>,
    ) -> BoxFuture<'static, Result<String>> {
        let path = path.as_ref().to_path_buf();
        let mut locals = locals.into();
        locals.is_async = true;

        if let Some(render_file) = &self.caps.render_file {
            let scope = self.async_helpers.scope();
            let rendered = render_file(path, prepare(locals, &self.helpers, Some(&scope)));
            return async move {
                let output = rendered.await?;
                resolve_placeholders(scope.store(), Some(&scope), output).await
            }
            .boxed();
        }

        debug!("reading {} for engine \"{}\"", path.display(), self.name);
        match std::fs::read_to_string(&path) {
            Ok(text) => self.render(text, locals),
            Err(source) => future::ready(Err(RenderError::Io { path, source })).boxed(),
        }
    }

    /// Replaces async helper placeholders in already rendered `content`.
    ///
    /// Any pending call of this engine found in `content` is resolved, which
    /// covers tokens made by helpers wrapped directly on
    /// [`async_helpers`](Self::async_helpers).
    pub fn resolve(&self, content: impl Into<String>) -> BoxFuture<'static, Result<String>> {
        let store = self.async_helpers.clone();
        let content = content.into();
        async move { resolve_placeholders(&store, None, content).await }.boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::EngineSpec;
    use crate::engine::normalize;
    use engine_cache_helpers::{value_to_string, HelperFn};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replaces `{name}` with the variable or with the result of the helper
    /// of the same name called without arguments.
    fn braces(src: &str, locals: &Locals) -> Result<String> {
        let mut out = src.to_string();
        for (key, value) in &locals.data {
            out = out.replace(&format!("{{{}}}", key), &value_to_string(value));
        }
        for (name, helper) in locals.helpers.helpers() {
            if let HelperFn::Sync(helper) = helper {
                let needle = format!("{{{}()}}", name);
                if out.contains(&needle) {
                    let value = helper.call(&[]).map_err(RenderError::engine)?;
                    out = out.replace(&needle, &value_to_string(&value));
                }
            }
        }
        Ok(out)
    }

    fn engine(spec: EngineSpec) -> Engine {
        decorate(normalize("tmpl", spec, None).unwrap())
    }

    #[test]
    fn test_render_sync_text() {
        let engine = engine(EngineSpec::new().render_sync(braces));
        let out = engine
            .render_sync("Hi {name}", Locals::new().with("name", "Ada"))
            .unwrap();
        assert_eq!(out, "Hi Ada");
    }

    #[test]
    fn test_render_sync_invalid_source() {
        let engine = engine(EngineSpec::new().render_sync(braces));
        let err = engine.render_sync(Value::Null, Locals::new()).unwrap_err();
        assert!(matches!(err, RenderError::Usage { method: "render_sync", .. }));
    }

    #[test]
    fn test_render_sync_without_sync_capability() {
        let engine = engine(
            EngineSpec::new().render(|src: String, _locals: Locals| async move { Ok(src) }),
        );
        let err = engine.render_sync("x", Locals::new()).unwrap_err();
        assert!(matches!(err, RenderError::Usage { .. }));
    }

    #[test]
    fn test_compile_is_idempotent() {
        let engine = engine(EngineSpec::new().render_sync(braces));
        let first = engine.compile("{a}", Locals::new()).unwrap();
        let second = engine.compile(&first, Locals::new()).unwrap();
        let third = engine.compile(second.clone(), Locals::new()).unwrap();
        assert!(first.ptr_eq(&second));
        assert!(second.ptr_eq(&third));
    }

    #[test]
    fn test_compile_uses_library_compile() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let engine = engine(EngineSpec::new().render_sync(braces).compile(move |src, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            let src = src.to_string();
            Ok(Compiled::template(move |locals| braces(&src, locals)))
        }));

        let template = engine.compile("{a}-{a}", Locals::new()).unwrap();
        assert!(template.compiled().is_callable());
        assert_eq!(template.render(Locals::new().with("a", 1)).unwrap(), "1-1");
        assert_eq!(template.render(Locals::new().with("a", 2)).unwrap(), "2-2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_compile_invalid_source() {
        let engine = engine(EngineSpec::new().render_sync(braces));
        let err = engine.compile(json!(42), Locals::new()).unwrap_err();
        assert!(matches!(err, RenderError::Usage { method: "compile", .. }));
    }

    #[test]
    fn test_engine_helpers_reach_library() {
        let engine = engine(
            EngineSpec::new()
                .render_sync(braces)
                .helper("site", |_| Ok(json!("example.org"))),
        );
        assert_eq!(
            engine.render_sync("{site()}", Locals::new()).unwrap(),
            "example.org"
        );
    }

    #[test]
    fn test_compile_time_and_call_time_helpers() {
        let engine = engine(EngineSpec::new().render_sync(braces));
        let template = engine
            .compile(
                "{who()}",
                Locals::new().with_helper("who", |_| Ok(json!("compile"))),
            )
            .unwrap();

        assert_eq!(template.render(Locals::new()).unwrap(), "compile");
        assert_eq!(
            template
                .render(Locals::new().with_helper("who", |_| Ok(json!("call"))))
                .unwrap(),
            "call"
        );
    }

    #[tokio::test]
    async fn test_render_async_helper() {
        let engine = engine(EngineSpec::new().render_sync(braces));
        let locals = Locals::new().with_async_helper("later", |_| async { Ok(json!("done")) });

        let out = engine.render("status: {later()}", locals).await.unwrap();
        assert_eq!(out, "status: done");
        assert_eq!(engine.async_helpers().stash_len(), 0);
    }

    #[tokio::test]
    async fn test_failed_renders_leave_no_pending_calls() {
        let engine = engine(EngineSpec::new().render_sync(|src: &str, locals: &Locals| {
            braces(src, locals)?;
            Err(RenderError::engine("template broke after calling helpers"))
        }));

        for _ in 0..20 {
            let locals = Locals::new().with_async_helper("later", |_| async { Ok(json!("x")) });
            let err = engine.render("{later()}", locals).await.unwrap_err();
            assert!(matches!(err, RenderError::Engine(_)));
        }
        assert_eq!(engine.async_helpers().stash_len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_render_future_leaves_no_pending_calls() {
        let engine = engine(
            EngineSpec::new().render(|src: String, locals: Locals| async move {
                let out = braces(&src, &locals);
                futures::future::pending::<()>().await;
                out
            }),
        );
        let locals = Locals::new().with_async_helper("later", |_| async { Ok(json!("x")) });
        let mut render = engine.render("{later()}", locals);

        assert!(futures::poll!(&mut render).is_pending());
        assert_eq!(engine.async_helpers().stash_len(), 1);
        drop(render);
        assert_eq!(engine.async_helpers().stash_len(), 0);
    }

    #[tokio::test]
    async fn test_render_does_not_mutate_locals() {
        let engine = engine(EngineSpec::new().render_sync(braces));
        let locals = Locals::new().with("name", "Ada");
        engine.render("{name}", &locals).await.unwrap();
        assert!(!locals.is_async);
        assert!(locals.helpers.is_empty());
    }

    #[tokio::test]
    async fn test_render_prefers_async_capability() {
        let engine = engine(
            EngineSpec::new()
                .render(|src: String, _locals: Locals| async move { Ok(format!("async {}", src)) })
                .render_sync(|src: &str, _: &Locals| Ok(format!("sync {}", src))),
        );
        assert_eq!(engine.render("x", Locals::new()).await.unwrap(), "async x");
        assert_eq!(engine.render_sync("x", Locals::new()).unwrap(), "sync x");
    }

    #[tokio::test]
    async fn test_render_invalid_source() {
        let engine = engine(EngineSpec::new().render_sync(braces));
        let err = engine.render(json!({}), Locals::new()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "engine-cache \"render\" expected \"str\" to be a string or compiled function, got an object."
        );
    }

    #[tokio::test]
    async fn test_render_file_capability() {
        let engine = engine(EngineSpec::new().render_sync(braces).render_file(
            |path: std::path::PathBuf, locals: Locals| async move {
                Ok(format!("{}:{}", path.display(), locals.data.len()))
            },
        ));
        let out = engine
            .render_file("views/home.tmpl", Locals::new().with("a", 1))
            .await
            .unwrap();
        assert_eq!(out, "views/home.tmpl:1");
    }

    #[tokio::test]
    async fn test_render_file_missing() {
        let engine = engine(EngineSpec::new().render_sync(braces));
        let err = engine
            .render_file("/definitely/not/here.tmpl", Locals::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Io { .. }));
    }

    #[tokio::test]
    async fn test_resolve_plain_content() {
        let engine = engine(EngineSpec::new().render_sync(braces));
        assert_eq!(engine.resolve("nothing here").await.unwrap(), "nothing here");
    }
}
