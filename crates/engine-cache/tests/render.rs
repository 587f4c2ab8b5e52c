use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use engine_cache::{
    defaults, Compiled, EngineRegistry, EngineSpec, Locals, RenderError, Source,
};
use proptest::prelude::*;
use serde_json::{json, Value};

fn registry() -> EngineRegistry {
    let mut registry = EngineRegistry::with_defaults().unwrap();
    registry.register("tmpl", defaults::base()).unwrap();
    registry
}

#[test]
fn tmpl_interpolates_variables() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();

    let out = engine
        .render_sync("<%= name %>", Locals::from(json!({"name": "Ada"})))
        .unwrap();
    assert_eq!(out, "Ada");
}

#[test]
fn tmpl_reports_the_undefined_variable() {
    let registry = registry();
    let err = registry
        .get("tmpl")
        .unwrap()
        .render_sync("<%= name %>", Locals::from(json!({})))
        .unwrap_err();

    assert!(matches!(err, RenderError::Engine(_)));
    assert_eq!(err.to_string(), "name is not defined");
}

#[test]
fn compiling_a_compiled_template_is_a_no_op() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();

    let compiled = engine.compile("<%= a %>", Locals::new()).unwrap();
    let mut current = compiled.clone();
    for _ in 0..5 {
        current = engine.compile(current, Locals::new()).unwrap();
        assert!(current.ptr_eq(&compiled));
    }
}

#[test]
fn engines_without_compile_keep_the_source() {
    let mut registry = EngineRegistry::new();
    registry
        .register(
            "txt",
            EngineSpec::new().render_sync(|src: &str, _: &Locals| Ok(src.to_uppercase())),
        )
        .unwrap();
    let engine = registry.get("txt").unwrap();

    let compiled = engine.compile("hello", Locals::new()).unwrap();
    assert_eq!(compiled.source(), Some("hello"));
    assert!(!compiled.compiled().is_callable());
    assert_eq!(engine.render_sync(&compiled, Locals::new()).unwrap(), "HELLO");
}

#[test]
fn compile_runs_once_for_many_renders() {
    let compiles = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&compiles);

    let mut registry = EngineRegistry::new();
    registry
        .register(
            "count",
            EngineSpec::new()
                .render_sync(|src: &str, _: &Locals| Ok(src.to_string()))
                .compile(move |src: &str, _: &Locals| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Compiled::Source(src.to_string()))
                }),
        )
        .unwrap();
    let engine = registry.get("count").unwrap();

    let compiled = engine.compile("x", Locals::new()).unwrap();
    for _ in 0..3 {
        engine.render_sync(&compiled, Locals::new()).unwrap();
    }
    assert_eq!(compiles.load(Ordering::SeqCst), 1);
}

#[test]
fn invalid_sources_are_usage_errors() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();

    for src in [json!(null), json!(1), json!(true), json!([]), json!({})] {
        let err = engine.render_sync(src.clone(), Locals::new()).unwrap_err();
        assert!(matches!(err, RenderError::Usage { .. }), "{:?}", src);
        assert!(err
            .to_string()
            .contains("expected \"str\" to be a string or compiled function"));
        assert!(engine.compile(src, Locals::new()).is_err());
    }
}

#[tokio::test]
async fn render_delivers_usage_errors_through_the_future() {
    let registry = registry();
    let future = registry
        .get("tmpl")
        .unwrap()
        .render(Source::Invalid(json!(42)), Locals::new());

    let err = future.await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "engine-cache \"render\" expected \"str\" to be a string or compiled function, got a number."
    );
}

#[tokio::test]
async fn render_accepts_compiled_templates() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();
    let compiled = engine.compile("Hi <%= who %>", Locals::new()).unwrap();

    let a = engine.render(&compiled, Locals::new().with("who", "A")).await.unwrap();
    let b = engine.render(compiled, Locals::new().with("who", "B")).await.unwrap();
    assert_eq!((a.as_str(), b.as_str()), ("Hi A", "Hi B"));
}

#[tokio::test]
async fn engine_errors_pass_through_render_unchanged() {
    let mut registry = EngineRegistry::new();
    registry
        .register(
            "fail",
            EngineSpec::new().render(|_src: String, _: Locals| async {
                Err(RenderError::engine("Parse error on line 1"))
            }),
        )
        .unwrap();

    let err = registry
        .get("fail")
        .unwrap()
        .render("{{", Locals::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Parse error on line 1");
}

#[tokio::test]
async fn locals_are_never_mutated() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();
    let locals = Locals::new()
        .with("name", "Ada")
        .with_async_helper("later", |_| async { Ok(Value::Null) });

    engine.render("<%= name %>", &locals).await.unwrap();
    engine.render_sync("<%= name %>", &locals).unwrap();

    assert!(!locals.is_async);
    assert_eq!(locals.data.len(), 1);
    assert!(locals.helpers.is_async("later"));
}

#[test]
fn call_site_helpers_win_over_engine_helpers() {
    let mut registry = EngineRegistry::new();
    registry
        .register(
            "tmpl",
            defaults::base().helper("greet", |_| Ok(json!("engine"))),
        )
        .unwrap();
    let engine = registry.get("tmpl").unwrap();

    assert_eq!(engine.render_sync("<%= greet() %>", Locals::new()).unwrap(), "engine");
    let locals = Locals::new().with_helper("greet", |_| Ok(json!("call site")));
    assert_eq!(engine.render_sync("<%= greet() %>", locals).unwrap(), "call site");
}

#[test]
fn async_helpers_are_hidden_from_sync_renders() {
    let registry = registry();
    let locals = Locals::new()
        .with("jon", "foo")
        .with_async_helper("upper", |_| async { Ok(json!("never")) });

    let err = registry
        .get("tmpl")
        .unwrap()
        .render_sync("<%= upper(jon) %>", locals)
        .unwrap_err();
    assert_eq!(err.to_string(), "upper is not defined");
}

#[cfg(feature = "minijinja")]
#[tokio::test]
async fn minijinja_engine_renders_through_the_registry() {
    let mut registry = EngineRegistry::new();
    registry.register("j2", defaults::minijinja()).unwrap();
    let engine = registry.get("j2").unwrap();

    let locals = Locals::new().with("items", json!(["a", "b"]));
    let src = "{% for i in items %}{{ i }};{% endfor %}";
    assert_eq!(engine.render_sync(src, &locals).unwrap(), "a;b;");
    assert_eq!(engine.render(src, &locals).await.unwrap(), "a;b;");

    let compiled = engine.compile(src, Locals::new()).unwrap();
    assert!(compiled.compiled().is_callable());
    assert_eq!(engine.render_sync(&compiled, &locals).unwrap(), "a;b;");
}

proptest! {
    #[test]
    fn compiled_and_direct_renders_agree(
        name in "[a-zA-Z0-9 ]{0,16}",
        prefix in "[a-zA-Z0-9 .,!]{0,16}",
    ) {
        let registry = registry();
        let engine = registry.get("tmpl").unwrap();
        let src = format!("{}<%= name %>|<%- name %>", prefix);
        let ctx = Locals::new().with("name", name);

        let compiled = engine.compile(src.as_str(), &ctx).unwrap();
        prop_assert_eq!(
            engine.render_sync(&compiled, &ctx).unwrap(),
            engine.render_sync(src.as_str(), &ctx).unwrap()
        );
    }
}
