//! Lenient vs strict undefined behavior.

use brine::{Environment, Error, UndefinedPolicy};
use serde_json::json;

fn lenient(source: &str, data: serde_json::Value) -> String {
    brine::parse(source).unwrap().render_json(data).unwrap()
}

fn strict(source: &str, data: serde_json::Value) -> Result<String, Error> {
    Environment::new()
        .with_undefined(UndefinedPolicy::Strict)
        .from_string(source)
        .unwrap()
        .render_json(data)
}

#[test]
fn lenient_output_is_empty() {
    assert_eq!(lenient("{{ nosuchthing }}", json!({})), "");
    assert_eq!(lenient("{{ nosuchthing[0] }}", json!({})), "");
    assert_eq!(lenient("{{ nosuchthing.last }}", json!({})), "");
    assert_eq!(lenient("{{ nosuchthing.size }}", json!({})), "");
}

#[test]
fn lenient_iteration_yields_nothing() {
    assert_eq!(
        lenient("{% for t in nosuchthing %}{{ t }}{% endfor %}", json!({})),
        ""
    );
}

#[test]
fn lenient_truthiness_and_comparison() {
    assert_eq!(lenient("{% if nosuchthing %}hello{% endif %}", json!({})), "");
    assert_eq!(
        lenient("{% if nosuchthing == 'hello' %}hello{% endif %}", json!({})),
        ""
    );
    assert_eq!(
        lenient("{% if nosuchthing == noway %}hello{% endif %}", json!({})),
        "hello"
    );
    assert_eq!(
        lenient("{% if nosuchthing contains 'x' %}hello{% endif %}", json!({})),
        ""
    );
}

#[test]
fn lenient_filters_treat_undefined_as_empty() {
    assert_eq!(lenient("hello {{ nosuchthing | last }} there", json!({})), "hello  there");
    assert_eq!(lenient("hello {{ nosuchthing | abs }} there", json!({})), "hello 0 there");
    assert_eq!(
        lenient("hello {{ '1,2,3' | split: nosuchthing }} there", json!({})),
        "hello 1,2,3 there"
    );
    assert_eq!(lenient("{{ nosuchthing | size }}", json!({})), "0");
}

#[test]
fn out_of_range_indices_are_undefined() {
    let data = json!({"a": [1, 2, 3]});
    assert_eq!(lenient("{{ a[100] }}", data.clone()), "");
    assert_eq!(lenient("{{ a[-100] }}", data), "");
}

#[test]
fn strict_raises_on_any_miss() {
    for source in [
        "{{ nosuchthing }}",
        "{% for t in nosuchthing %}x{% endfor %}",
        "{{ nosuchthing[0] }}",
        "{% if nosuchthing %}x{% endif %}",
        "{% if nosuchthing == 'x' %}x{% endif %}",
        "{{ 'a,b' | split: nosuchthing }}",
    ] {
        assert!(
            matches!(strict(source, json!({})), Err(Error::Undefined { .. })),
            "expected an undefined error for {source}"
        );
    }
}

#[test]
fn strict_out_of_range_index_raises() {
    assert!(matches!(
        strict("{{ a[100] }}", json!({"a": [1]})),
        Err(Error::Undefined { .. })
    ));
}

#[test]
fn strict_passes_for_defined_paths() {
    assert_eq!(strict("{{ a.b }}", json!({"a": {"b": 1}})).unwrap(), "1");
}

#[test]
fn default_filter_replaces_undefined() {
    assert_eq!(lenient("{{ nosuchthing | default: 'x' }}", json!({})), "x");
    assert_eq!(lenient("{{ '' | default: 'x' }}", json!({})), "x");
    assert_eq!(lenient("{{ false | default: 'x' }}", json!({})), "x");
    assert_eq!(
        lenient("{{ false | default: 'x', allow_false: true }}", json!({})),
        "false"
    );
    assert_eq!(lenient("{{ 0 | default: 'x' }}", json!({})), "0");
}
