use engine_cache::{defaults, EngineRegistry, EngineSpec, HelperError, Locals, RenderError};
use engine_cache_helpers::value_to_string;
use serde_json::{json, Value};

fn upper(args: Vec<Value>) -> impl std::future::Future<Output = Result<Value, HelperError>> {
    async move {
        let text = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| HelperError::invalid_argument("upper", "expected a string"))?;
        Ok(json!(text.to_uppercase()))
    }
}

fn registry() -> EngineRegistry {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut registry = EngineRegistry::new();
    registry.register("tmpl", defaults::base()).unwrap();
    registry
}

#[tokio::test]
async fn async_helper_output_is_fully_substituted() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();
    let locals = Locals::from(json!({"jon": "foo"})).with_async_helper("upper", upper);

    let out = engine.render("Jon: <%= upper(jon) %>", locals).await.unwrap();

    assert_eq!(out, "Jon: FOO");
    assert!(!out.contains("__async_"));
    assert_eq!(engine.async_helpers().stash_len(), 0);
}

#[tokio::test]
async fn engine_level_async_helpers() {
    let mut registry = EngineRegistry::new();
    registry
        .register("tmpl", defaults::base().async_helper("upper", upper))
        .unwrap();
    let engine = registry.get("tmpl").unwrap();

    let out = engine
        .render("<%= upper(a) %> and <%= upper(b) %>", Locals::from(json!({"a": "x", "b": "y"})))
        .await
        .unwrap();
    assert_eq!(out, "X and Y");
}

#[tokio::test]
async fn escaped_output_keeps_tokens_intact() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();
    let locals = Locals::from(json!({"jon": "foo"})).with_async_helper("upper", upper);

    let out = engine.render("[<%- upper(jon) %>]", locals).await.unwrap();
    assert_eq!(out, "[FOO]");
}

#[tokio::test]
async fn nested_async_helpers_resolve_inner_first() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();
    let locals = Locals::from(json!({"name": "ada"}))
        .with_async_helper("upper", upper)
        .with_async_helper("exclaim", |args: Vec<Value>| async move {
            Ok(json!(format!("{}!", value_to_string(&args[0]))))
        });

    let out = engine
        .render("<%= exclaim(upper(name)) %>", locals)
        .await
        .unwrap();
    assert_eq!(out, "ADA!");
    assert_eq!(engine.async_helpers().stash_len(), 0);
}

#[tokio::test]
async fn async_helper_fed_through_a_sync_helper() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();
    let locals = Locals::from(json!({"name": "ada"}))
        .with_async_helper("upper", upper)
        .with_async_helper("exclaim", |args: Vec<Value>| async move {
            Ok(json!(format!("{}!", value_to_string(&args[0]))))
        })
        .with_helper("wrap", |args: &[Value]| {
            Ok(json!(format!("<{}>", value_to_string(&args[0]))))
        });

    let out = engine
        .render("<%= exclaim(wrap(upper(name))) %> <%= upper(name) %>", locals)
        .await
        .unwrap();
    assert_eq!(out, "<ADA>! ADA");
    assert!(!out.contains("__async_"));
    assert_eq!(engine.async_helpers().stash_len(), 0);
}

#[tokio::test]
async fn token_repeated_inside_an_argument() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();
    let locals = Locals::from(json!({"name": "ada"}))
        .with_async_helper("upper", upper)
        .with_async_helper("exclaim", |args: Vec<Value>| async move {
            Ok(json!(format!("{}!", value_to_string(&args[0]))))
        })
        .with_helper("both", |args: &[Value]| {
            let inner = value_to_string(&args[0]);
            Ok(json!(format!("{} / {}", inner, inner)))
        });

    // exclaim() receives the same upper() token twice in one string
    let out = engine
        .render("<%= both(upper(name)) %> <%= exclaim(both(upper(name))) %>", locals)
        .await
        .unwrap();
    assert_eq!(out, "ADA / ADA ADA / ADA!");
    assert_eq!(engine.async_helpers().stash_len(), 0);
}

#[tokio::test]
async fn engine_errors_leave_no_pending_calls() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();

    for _ in 0..100 {
        let locals = Locals::from(json!({"name": "ada"})).with_async_helper("upper", upper);
        let err = engine
            .render("<%= upper(name) %><%= missing %>", locals)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "missing is not defined");
    }
    assert_eq!(engine.async_helpers().stash_len(), 0);
}

#[tokio::test]
async fn sync_and_async_helpers_mix() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();
    let locals = Locals::from(json!({"name": "ada"}))
        .with_async_helper("upper", upper)
        .with_helper("wrap", |args: &[Value]| {
            Ok(json!(format!("<{}>", value_to_string(&args[0]))))
        });

    let out = engine
        .render("<%= wrap(name) %> <%= upper(name) %>", locals)
        .await
        .unwrap();
    assert_eq!(out, "<ada> ADA");
}

#[tokio::test]
async fn first_failing_helper_aborts_the_render() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();
    let locals = Locals::from(json!({"n": 1})).with_async_helper("upper", upper);

    let err = engine.render("<%= upper(n) %>", locals).await.unwrap_err();
    match err {
        RenderError::Resolution { token, source } => {
            assert!(token.starts_with("__async_"));
            assert!(matches!(source, HelperError::InvalidArgument { .. }));
        }
        other => panic!("expected a resolution error, got {:?}", other),
    }
}

#[tokio::test]
async fn failed_resolution_leaves_no_pending_calls() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();

    for _ in 0..10 {
        let locals = Locals::from(json!({"name": "ada"}))
            .with_async_helper("upper", upper)
            .with_async_helper("boom", |_| async { Err(HelperError::failed("boom")) });
        let err = engine
            .render("<%= boom() %><%= upper(name) %>", locals)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Resolution { .. }));
    }
    assert_eq!(engine.async_helpers().stash_len(), 0);
}

#[tokio::test]
async fn async_helpers_work_with_async_only_engines() {
    let mut registry = EngineRegistry::new();
    registry
        .register(
            "echo",
            EngineSpec::new().render(|_src: String, locals: Locals| async move {
                let helper = match locals.helpers.get_helper("upper") {
                    Some(engine_cache::HelperFn::Sync(helper)) => helper.clone(),
                    _ => return Err(RenderError::engine("upper is not defined")),
                };
                let token = helper.call(&[json!("deferred")]).map_err(RenderError::engine)?;
                Ok(format!("value={}", value_to_string(&token)))
            }),
        )
        .unwrap();

    let locals = Locals::new().with_async_helper("upper", upper);
    let out = registry
        .get("echo")
        .unwrap()
        .render("ignored", locals)
        .await
        .unwrap();
    assert_eq!(out, "value=DEFERRED");
}

#[tokio::test]
async fn resolve_substitutes_tokens_in_arbitrary_content() {
    let registry = registry();
    let engine = registry.get("tmpl").unwrap();
    let wrapped = engine
        .async_helpers()
        .wrap_helper("upper", engine_cache::AsyncHelper::new(upper));
    let token = wrapped.call(&[json!("late")]).unwrap();

    let content = format!("before {} after", value_to_string(&token));
    assert_eq!(engine.resolve(content).await.unwrap(), "before LATE after");
}
