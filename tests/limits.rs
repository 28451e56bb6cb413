//! Resource limits: context depth, loop iterations, local namespace
//! size, output stream size.

use brine::{DictLoader, Environment, Error};
use serde_json::json;

#[test]
fn context_depth_limit_is_configurable() {
    let env = Environment::new()
        .with_loader(DictLoader::new([("rec", "{% include 'rec' %}")]))
        .with_context_depth_limit(5);
    let template = env.from_string("{% include 'rec' %}").unwrap();
    let err = template.render_json(json!({})).unwrap_err();
    assert!(
        matches!(err, Error::Partial { ref source, .. } if matches!(**source, Error::ContextDepth { .. })),
        "expected a context depth error, found {err:?}"
    );
}

#[test]
fn loop_iteration_limit() {
    let env = Environment::new().with_loop_iteration_limit(Some(5));
    let template = env
        .from_string("{% for i in (1..10) %}{{ i }}{% endfor %}")
        .unwrap();
    assert!(matches!(
        template.render_json(json!({})),
        Err(Error::LoopIterationLimit { .. })
    ));

    let template = env
        .from_string("{% for i in (1..5) %}{{ i }}{% endfor %}")
        .unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "12345");
}

#[test]
fn loop_iteration_limit_multiplies_across_nesting() {
    let env = Environment::new().with_loop_iteration_limit(Some(100));
    let template = env
        .from_string("{% for i in (1..10) %}{% for j in (1..10) %}x{% endfor %}{% endfor %}")
        .unwrap();
    // 10 * 10 == 100 is exactly at the limit.
    assert!(template.render_json(json!({})).is_ok());

    let env = Environment::new().with_loop_iteration_limit(Some(99));
    let template = env
        .from_string("{% for i in (1..10) %}{% for j in (1..10) %}x{% endfor %}{% endfor %}")
        .unwrap();
    assert!(matches!(
        template.render_json(json!({})),
        Err(Error::LoopIterationLimit { .. })
    ));
}

#[test]
fn loop_iterations_carry_into_rendered_partials() {
    let env = Environment::new()
        .with_loader(DictLoader::new([(
            "partial",
            "{% for j in (1..10) %}x{% endfor %}",
        )]))
        .with_loop_iteration_limit(Some(50));
    let template = env
        .from_string("{% for i in (1..10) %}{% render 'partial' %}{% endfor %}")
        .unwrap();
    let err = template.render_json(json!({})).unwrap_err();
    assert!(
        matches!(err, Error::Partial { ref source, .. } if matches!(**source, Error::LoopIterationLimit { .. })),
        "expected a loop iteration limit error, found {err:?}"
    );
}

#[test]
fn local_namespace_limit() {
    let env = Environment::new().with_local_namespace_limit(Some(5));
    let template = env
        .from_string("{% assign x = 'aaaaaaaaaa' %}")
        .unwrap();
    assert!(matches!(
        template.render_json(json!({})),
        Err(Error::LocalNamespaceLimit { .. })
    ));

    let env = Environment::new().with_local_namespace_limit(Some(100));
    let template = env.from_string("{% assign x = 'short' %}ok").unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "ok");
}

#[test]
fn output_stream_limit() {
    let env = Environment::new().with_output_stream_limit(Some(5));
    let template = env.from_string("hello world").unwrap();
    assert!(matches!(
        template.render_json(json!({})),
        Err(Error::OutputStreamLimit)
    ));

    let template = env.from_string("hi").unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "hi");
}

#[test]
fn filter_validation_timing() {
    // With validation on, an unknown filter is a parse error.
    let env = Environment::new().with_validate_filter_arguments(true);
    assert!(matches!(
        env.from_string("{{ x | nosuchfilter }}"),
        Err(Error::UnknownFilter { .. })
    ));

    // With it off, the same template parses and fails at render time.
    let env = Environment::new();
    let template = env.from_string("{{ x | nosuchfilter }}").unwrap();
    assert!(matches!(
        template.render_json(json!({})),
        Err(Error::UnknownFilter { .. })
    ));
}
