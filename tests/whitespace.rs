//! Whitespace control coverage: every trim marker, on both sides of
//! content, plus the environment's default policy.

use brine::{Environment, WhitespaceControl};
use serde_json::json;

fn render(source: &str) -> String {
    brine::parse(source).unwrap().render_json(json!({})).unwrap()
}

#[test]
fn no_markers_preserve_whitespace() {
    assert_eq!(render("a {{ 'b' }} c"), "a b c");
}

#[test]
fn minus_strips_all_whitespace() {
    assert_eq!(render("a \t\n{{- 'b' -}}\n\t c"), "abc");
    assert_eq!(render("a {%- assign x = 1 -%} c"), "ac");
}

#[test]
fn plus_preserves_whitespace() {
    assert_eq!(render("a {{+ 'b' +}} c"), "a b c");
}

#[test]
fn tilde_strips_newlines_only() {
    assert_eq!(render("a \n{{~ 'b' ~}}\n c"), "a b c");
    assert_eq!(render("a\n\r\n{{~ 'b' ~}}\r\nc"), "abc");
}

#[test]
fn markers_apply_per_side() {
    assert_eq!(render("a {{- 'b' }} c"), "ab c");
    assert_eq!(render("a {{ 'b' -}} c"), "a bc");
}

#[test]
fn trim_applies_between_adjacent_markup() {
    // The content between two tags is trimmed once, using the right
    // hint of the first and the left hint of the second.
    assert_eq!(
        render("{% assign a = 1 -%}   {%- assign b = 2 %}x"),
        "x"
    );
    assert_eq!(render("{% assign a = 1 %}   {% assign b = 2 %}x"), "   x");
}

#[test]
fn block_tags_carry_trim_into_and_out_of_blocks() {
    assert_eq!(render("{% if true -%}  a  {%- endif %}"), "a");
    assert_eq!(render("x  {%- if true %}a{% endif -%}  y"), "xay");
}

#[test]
fn leading_trim_only_keeps_right_whitespace() {
    assert_eq!(
        brine::parse("{%- assign x = 'a' +%}   {{ x }}")
            .unwrap()
            .render_json(json!({}))
            .unwrap(),
        "   a"
    );
}

#[test]
fn default_trim_policy_resolves_default_markers() {
    let env = Environment::new().with_default_trim(WhitespaceControl::Minus);
    let template = env.from_string("a {{ 'b' }} c").unwrap();
    // With a minus default, unmarked delimiters trim like `-`.
    assert_eq!(template.render_json(json!({})).unwrap(), "abc");

    // Explicit `+` still overrides the default.
    let template = env.from_string("a {{+ 'b' +}} c").unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "a b c");
}

#[test]
fn raw_blocks_trim_with_inner_markers() {
    assert_eq!(render("{% raw -%}  a  {%- endraw %}"), "a");
    assert_eq!(render("x {%- raw %}a{% endraw %}"), "xa");
}

#[test]
fn comments_participate_in_trim() {
    assert_eq!(render("a {#- note -#} b"), "ab");
}
