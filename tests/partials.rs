//! Partial templates: `include`, `render`, inheritance, macros.

use brine::{DictLoader, Environment, Error};
use serde_json::json;

fn env_with(templates: &[(&str, &str)]) -> Environment {
    Environment::new().with_loader(DictLoader::new(templates.iter().copied()))
}

#[test]
fn include_shares_scope() {
    let env = env_with(&[("partial", "{% assign x = 'yes' %}")]);
    let template = env.from_string("{% include 'partial' %}{{ x }}").unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "yes");
}

#[test]
fn include_sees_caller_variables() {
    let env = env_with(&[("partial", "Hello, {{ you }}!")]);
    let template = env.from_string("{% include 'partial' %}").unwrap();
    assert_eq!(
        template.render_json(json!({"you": "World"})).unwrap(),
        "Hello, World!"
    );
}

#[test]
fn include_with_keyword_arguments() {
    let env = env_with(&[("partial", "{{ a }}-{{ b }}")]);
    let template = env
        .from_string("{% include 'partial', a: 1, b: x %}")
        .unwrap();
    assert_eq!(template.render_json(json!({"x": 2})).unwrap(), "1-2");
}

#[test]
fn include_with_bound_variable() {
    let env = env_with(&[("product", "{{ product.title }};")]);
    let template = env
        .from_string("{% include 'product' with item %}")
        .unwrap();
    assert_eq!(
        template
            .render_json(json!({"item": {"title": "Hat"}}))
            .unwrap(),
        "Hat;"
    );

    // `for` iterates a sequence; `as` renames the binding.
    let env = env_with(&[("row", "{{ r.n }};")]);
    let template = env
        .from_string("{% include 'row' for items as r %}")
        .unwrap();
    assert_eq!(
        template
            .render_json(json!({"items": [{"n": 1}, {"n": 2}]}))
            .unwrap(),
        "1;2;"
    );
}

#[test]
fn render_isolates_scope() {
    let env = env_with(&[("partial", "{% assign x = 'yes' %}")]);
    let template = env.from_string("{% render 'partial' %}{{ x }}").unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "");
}

#[test]
fn render_does_not_see_caller_locals() {
    let env = env_with(&[("partial", "[{{ x }}]")]);
    let template = env
        .from_string("{% assign x = 'secret' %}{% render 'partial' %}")
        .unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "[]");
}

#[test]
fn render_sees_render_globals() {
    let env = env_with(&[("partial", "{{ you }}")]);
    let template = env.from_string("{% render 'partial' %}").unwrap();
    assert_eq!(
        template.render_json(json!({"you": "World"})).unwrap(),
        "World"
    );
}

#[test]
fn render_with_bound_variable_and_loop() {
    let env = env_with(&[("item", "{{ item.n }}:{{ forloop.index }};")]);
    let template = env.from_string("{% render 'item' for items %}").unwrap();
    assert_eq!(
        template
            .render_json(json!({"items": [{"n": "a"}, {"n": "b"}]}))
            .unwrap(),
        "a:1;b:2;"
    );
}

#[test]
fn include_is_disabled_inside_render() {
    let env = env_with(&[
        ("outer", "{% include 'inner' %}"),
        ("inner", "nope"),
    ]);
    let template = env.from_string("{% render 'outer' %}").unwrap();
    let err = template.render_json(json!({})).unwrap_err();
    assert!(
        matches!(err, Error::Partial { ref source, .. } if matches!(**source, Error::DisabledTag { .. })),
        "expected a disabled tag error, found {err:?}"
    );
}

#[test]
fn recursive_include_hits_the_depth_limit() {
    let env = env_with(&[("rec", "{% include 'rec' %}")]);
    let template = env.from_string("{% include 'rec' %}").unwrap();
    let err = template.render_json(json!({})).unwrap_err();
    assert!(
        matches!(err, Error::Partial { ref source, .. } if matches!(**source, Error::ContextDepth { .. })),
        "expected a context depth error, found {err:?}"
    );
}

#[test]
fn recursive_render_hits_the_depth_limit() {
    let env = env_with(&[("rec", "{% render 'rec' %}")]);
    let template = env.from_string("{% render 'rec' %}").unwrap();
    let err = template.render_json(json!({})).unwrap_err();
    assert!(
        matches!(err, Error::Partial { ref source, .. } if matches!(**source, Error::ContextDepth { .. })),
        "expected a context depth error, found {err:?}"
    );
}

#[test]
fn break_crosses_include_but_not_render() {
    let env = env_with(&[("stop", "{% break %}")]);
    let template = env
        .from_string("{% for i in (1..4) %}{{ i }}{% include 'stop' %}{% endfor %}")
        .unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "1");

    let template = env
        .from_string("{% for i in (1..3) %}{{ i }}{% render 'stop' %}{% endfor %}")
        .unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "123");
}

#[test]
fn missing_partial_is_not_found() {
    let env = env_with(&[]);
    let template = env.from_string("{% include 'ghost' %}").unwrap();
    assert!(matches!(
        template.render_json(json!({})),
        Err(Error::TemplateNotFound { .. })
    ));
}

#[test]
fn template_inheritance() {
    let env = env_with(&[(
        "base",
        "Hello, {% block content %}base{% endblock %}!",
    )]);
    let template = env
        .from_string("{% extends 'base' %}{% block content %}child{% endblock %}")
        .unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "Hello, child!");
}

#[test]
fn inheritance_without_an_override_keeps_the_base_block() {
    let env = env_with(&[("base", "[{% block content %}base{% endblock %}]")]);
    let template = env.from_string("{% extends 'base' %}").unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "[base]");
}

#[test]
fn block_super_renders_the_parent_block() {
    let env = env_with(&[("base", "{% block greeting %}Hello{% endblock %}")]);
    let template = env
        .from_string("{% extends 'base' %}{% block greeting %}{{ block.super }}, World{% endblock %}")
        .unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "Hello, World");
}

#[test]
fn three_level_inheritance() {
    let env = env_with(&[
        ("grand", "({% block x %}g{% endblock %})"),
        ("parent", "{% extends 'grand' %}{% block x %}p{{ block.super }}{% endblock %}"),
    ]);
    let template = env
        .from_string("{% extends 'parent' %}{% block x %}c{{ block.super }}{% endblock %}")
        .unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "(cpg)");
}

#[test]
fn required_blocks_must_be_overridden() {
    let env = env_with(&[("base", "{% block content required %}{% endblock %}")]);

    let template = env
        .from_string("{% extends 'base' %}{% block content %}ok{% endblock %}")
        .unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "ok");

    let template = env.from_string("{% extends 'base' %}").unwrap();
    let err = template.render_json(json!({})).unwrap_err();
    assert!(
        matches!(err, Error::Partial { ref source, .. } if matches!(**source, Error::TemplateInheritance { .. }))
            || matches!(err, Error::TemplateInheritance { .. }),
        "expected an inheritance error, found {err:?}"
    );
}

#[test]
fn circular_extends_is_an_error() {
    let env = env_with(&[("a", "{% extends 'a' %}")]);
    let template = env.from_string("{% extends 'a' %}").unwrap();
    let err = template.render_json(json!({})).unwrap_err();
    assert!(
        matches!(err, Error::Partial { ref source, .. } if matches!(**source, Error::TemplateInheritance { .. }))
            || matches!(err, Error::TemplateInheritance { .. }),
        "expected an inheritance error, found {err:?}"
    );
}

#[test]
fn macros_and_calls() {
    let source = "\
{% macro 'greet' you: 'World' %}Hello, {{ you }}!{% endmacro %}\
{% call 'greet' %} {% call 'greet' you: 'you' %}";
    assert_eq!(
        brine::parse(source).unwrap().render_json(json!({})).unwrap(),
        "Hello, World! Hello, you!"
    );
}

#[test]
fn macro_positional_arguments() {
    let source = "\
{% macro 'pair' a, b %}({{ a }},{{ b }}){% endmacro %}\
{% call 'pair' 1, 2 %}";
    assert_eq!(
        brine::parse(source).unwrap().render_json(json!({})).unwrap(),
        "(1,2)"
    );
}

#[test]
fn macros_do_not_see_caller_locals() {
    let source = "\
{% assign secret = 'x' %}\
{% macro 'peek' %}[{{ secret }}]{% endmacro %}\
{% call 'peek' %}";
    assert_eq!(
        brine::parse(source).unwrap().render_json(json!({})).unwrap(),
        "[]"
    );
}

#[test]
fn undefined_macro_is_a_name_error() {
    assert!(matches!(
        brine::parse("{% call 'ghost' %}").unwrap().render_json(json!({})),
        Err(Error::Name { .. })
    ));
}

#[test]
fn with_tag_scopes_bindings() {
    assert_eq!(
        brine::parse("{% with a: 1, b: 2 %}{{ a }}{{ b }}{% endwith %}{{ a }}")
            .unwrap()
            .render_json(json!({}))
            .unwrap(),
        "12"
    );
}

#[test]
fn matter_sits_below_globals() {
    // A loader-supplied overlay is visible to the template, but render
    // globals win.
    #[derive(Debug)]
    struct MatterLoader;

    impl brine::Loader for MatterLoader {
        fn get_source(
            &self,
            _env: &Environment,
            name: &str,
            _context: Option<&brine::RenderContext<'_>>,
        ) -> Result<brine::TemplateSource, Error> {
            let mut source = brine::TemplateSource::new("{{ title }}|{{ tag }}", name);
            let mut matter = brine::ValueMap::new();
            matter.insert("title".to_string(), brine::Value::from("from matter"));
            matter.insert("tag".to_string(), brine::Value::from("m"));
            source.matter = Some(matter);
            Ok(source)
        }
    }

    let env = Environment::new().with_loader(MatterLoader);
    let template = env.get_template("page").unwrap();
    assert_eq!(
        template.render_json(json!({})).unwrap(),
        "from matter|m"
    );
    assert_eq!(
        template.render_json(json!({"title": "override"})).unwrap(),
        "override|m"
    );
}
