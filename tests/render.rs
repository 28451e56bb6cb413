//! End-to-end rendering tests for the core tag and expression set.

use brine::{Environment, UndefinedPolicy};
use serde_json::json;

fn render(source: &str, data: serde_json::Value) -> String {
    brine::parse(source)
        .expect("template should parse")
        .render_json(data)
        .expect("template should render")
}

#[test]
fn output_statement() {
    assert_eq!(
        render("Hello, {{ you }}!", json!({"you": "World"})),
        "Hello, World!"
    );
}

#[test]
fn literals() {
    assert_eq!(render("{{ 'a' }} {{ 1 }} {{ 1.5 }} {{ true }}", json!({})), "a 1 1.5 true");
    assert_eq!(render("{{ nil }}{{ null }}", json!({})), "");
    assert_eq!(render("{{ 1e2 }} {{ 1e-2 }}", json!({})), "100 0.01");
}

#[test]
fn float_output_keeps_a_fraction() {
    assert_eq!(render("{{ x }}", json!({"x": 2.0})), "2.0");
}

#[test]
fn paths() {
    let data = json!({"a": {"b": [1, 2, 3]}, "k": "b"});
    assert_eq!(render("{{ a.b[0] }}", data.clone()), "1");
    assert_eq!(render("{{ a.b[-1] }}", data.clone()), "3");
    assert_eq!(render("{{ a['b'][1] }}", data.clone()), "2");
    assert_eq!(render("{{ a[k][2] }}", data.clone()), "3");
    assert_eq!(render("{{ a.b.size }} {{ a.b.first }} {{ a.b.last }}", data), "3 1 3");
}

#[test]
fn data_beats_magic_properties() {
    let data = json!({"a": {"size": "XL", "first": "me"}});
    assert_eq!(render("{{ a.size }}-{{ a.first }}", data), "XL-me");
}

#[test]
fn filters() {
    assert_eq!(
        render("{{ 'hello' | upcase | append: '!' }}", json!({})),
        "HELLO!"
    );
    assert_eq!(render("{{ xs | join: ', ' }}", json!({"xs": [1, 2]})), "1, 2");
    assert_eq!(render("{{ '1,2,3' | split: ',' | last }}", json!({})), "3");
}

#[test]
fn lambda_filters() {
    assert_eq!(
        render(
            "{{ items | map: i => i.n | join: ',' }}",
            json!({"items": [{"n": 1}, {"n": 2}, {"n": 3}]})
        ),
        "1,2,3"
    );
    assert_eq!(
        render(
            "{{ items | where: i => i.n > 1 | map: 'n' | join: ',' }}",
            json!({"items": [{"n": 1}, {"n": 2}, {"n": 3}]})
        ),
        "2,3"
    );
    assert_eq!(
        render(
            "{{ items | map: (x, i) => i | join: ',' }}",
            json!({"items": ["a", "b", "c"]})
        ),
        "0,1,2"
    );
}

#[test]
fn ternary_expressions() {
    assert_eq!(render("{{ 'a' if x else 'b' }}", json!({"x": true})), "a");
    assert_eq!(render("{{ 'a' if x else 'b' }}", json!({"x": false})), "b");
    assert_eq!(
        render("{{ 'a' if x else 'b' | upcase }}", json!({"x": false})),
        "B"
    );
    assert_eq!(
        render("{{ 'a' if x else 'b' || upcase }}", json!({"x": true})),
        "A"
    );
    assert_eq!(render("{{ 'a' if x }}", json!({"x": false})), "");
}

#[test]
fn template_strings() {
    assert_eq!(
        render("{{ 'Hello, ${you}!' }}", json!({"you": "World"})),
        "Hello, World!"
    );
    assert_eq!(
        render("{{ \"${greeting | upcase}, ${you}\" }}", json!({"greeting": "hi", "you": "World"})),
        "HI, World"
    );
    assert_eq!(render(r"{{ '\$literal' }}", json!({})), "$literal");
}

#[test]
fn assign_and_capture() {
    assert_eq!(render("{% assign x = 'a' %}{{ x }}", json!({})), "a");
    assert_eq!(
        render("{% capture x %}a{{ 'b' }}{% endcapture %}{{ x }}", json!({})),
        "ab"
    );
    assert_eq!(
        render("{% assign n = xs | size %}{{ n }}", json!({"xs": [1, 2]})),
        "2"
    );
}

#[test]
fn counters() {
    assert_eq!(
        render(
            "{% increment c %}{% increment c %}{% increment c %}",
            json!({})
        ),
        "012"
    );
    assert_eq!(
        render("{% decrement c %}{% decrement c %}", json!({})),
        "-1-2"
    );
    // Counters are resolvable as variables.
    assert_eq!(render("{% increment c %}:{{ c }}", json!({})), "0:1");
}

#[test]
fn cycle_tag() {
    assert_eq!(
        render(
            "{% for i in (1..4) %}{% cycle 'a', 'b' %}{% endfor %}",
            json!({})
        ),
        "abab"
    );
    // Named cycle groups keep separate cursors from unnamed ones.
    assert_eq!(
        render(
            "{% cycle 'a', 'b' %}{% cycle g: 'a', 'b' %}{% cycle 'a', 'b' %}",
            json!({})
        ),
        "aab"
    );
}

#[test]
fn if_tag() {
    assert_eq!(
        render("{% if a %}1{% elsif b %}2{% else %}3{% endif %}", json!({"a": true})),
        "1"
    );
    assert_eq!(
        render(
            "{% if a %}1{% elsif b %}2{% else %}3{% endif %}",
            json!({"a": false, "b": true})
        ),
        "2"
    );
    assert_eq!(
        render("{% if a %}1{% elsif b %}2{% else %}3{% endif %}", json!({})),
        "3"
    );
}

#[test]
fn truthiness() {
    // Only false, null and undefined are falsy.
    assert_eq!(render("{% if 0 %}t{% endif %}", json!({})), "t");
    assert_eq!(render("{% if '' %}t{% endif %}", json!({})), "t");
    assert_eq!(render("{% if x %}t{% else %}f{% endif %}", json!({"x": false})), "f");
    assert_eq!(render("{% if x %}t{% else %}f{% endif %}", json!({"x": null})), "f");
}

#[test]
fn boolean_operators() {
    assert_eq!(
        render("{% if a and b %}y{% endif %}", json!({"a": 1, "b": 2})),
        "y"
    );
    assert_eq!(
        render("{% if a or b %}y{% endif %}", json!({"a": false, "b": 1})),
        "y"
    );
    assert_eq!(render("{% if not a %}y{% endif %}", json!({"a": false})), "y");
    assert_eq!(
        render("{% if 1 < 2 and 'b' > 'a' %}y{% endif %}", json!({})),
        "y"
    );
    assert_eq!(
        render("{% if xs contains 2 %}y{% endif %}", json!({"xs": [1, 2]})),
        "y"
    );
    assert_eq!(render("{% if 2 in (1..3) %}y{% endif %}", json!({})), "y");
    assert_eq!(
        render("{% if 'el' in 'hello' %}y{% endif %}", json!({})),
        "y"
    );
}

#[test]
fn empty_and_blank() {
    assert_eq!(render("{% if a == empty %}yes{% endif %}", json!({"a": []})), "yes");
    assert_eq!(render("{% if a == empty %}yes{% endif %}", json!({"a": ""})), "yes");
    assert_eq!(
        render("{% if a == blank %}yes{% endif %}", json!({"a": "  \n"})),
        "yes"
    );
    assert_eq!(render("{% if a == empty %}yes{% else %}no{% endif %}", json!({"a": [1]})), "no");
}

#[test]
fn permissive_equality() {
    // Booleans compare only with booleans.
    assert_eq!(render("{% if x == 1 %}y{% else %}n{% endif %}", json!({"x": true})), "n");
    assert_eq!(render("{% if 1 == 1.0 %}y{% endif %}", json!({})), "y");
    assert_eq!(render("{% if 'a' != 'b' %}y{% endif %}", json!({})), "y");
    assert_eq!(render("{% if 'a' <> 'b' %}y{% endif %}", json!({})), "y");
}

#[test]
fn unless_tag() {
    assert_eq!(render("{% unless x %}y{% endunless %}", json!({"x": false})), "y");
    assert_eq!(
        render("{% unless x %}y{% else %}n{% endunless %}", json!({"x": true})),
        "n"
    );
}

#[test]
fn case_tag() {
    let source = "{% case x %}{% when 1, 2 %}low{% when 3 %}high{% else %}none{% endcase %}";
    assert_eq!(render(source, json!({"x": 2})), "low");
    assert_eq!(render(source, json!({"x": 3})), "high");
    assert_eq!(render(source, json!({"x": 9})), "none");

    // `or` separates candidates too, and every matching arm renders.
    assert_eq!(
        render(
            "{% case x %}{% when 1 or 2 %}a{% when 2 %}b{% endcase %}",
            json!({"x": 2})
        ),
        "ab"
    );
}

#[test]
fn for_tag() {
    assert_eq!(
        render("{% for n in (1..3) %}{{ n }}{% endfor %}", json!({})),
        "123"
    );
    assert_eq!(
        render(
            "{% for n in nums %}{{ n }}{% endfor %}",
            json!({"nums": [4, 5, 6]})
        ),
        "456"
    );
    assert_eq!(
        render(
            "{% for n in nums limit: 2 offset: 1 %}{{ n }}{% endfor %}",
            json!({"nums": [1, 2, 3, 4]})
        ),
        "23"
    );
    assert_eq!(
        render(
            "{% for n in (1..3) reversed %}{{ n }}{% endfor %}",
            json!({})
        ),
        "321"
    );
    assert_eq!(
        render("{% for n in xs %}{{ n }}{% else %}none{% endfor %}", json!({"xs": []})),
        "none"
    );
}

#[test]
fn forloop_object() {
    assert_eq!(
        render(
            "{% for n in (1..3) %}{{ forloop.index }}:{{ forloop.rindex }}{% if forloop.last %}!{% endif %}{% endfor %}",
            json!({})
        ),
        "1:32:23:1!"
    );
    assert_eq!(
        render(
            "{% for a in (1..2) %}{% for b in (1..2) %}{{ forloop.parentloop.index }}{{ forloop.index }} {% endfor %}{% endfor %}",
            json!({})
        ),
        "11 12 21 22 "
    );
}

#[test]
fn offset_continue_resumes() {
    assert_eq!(
        render(
            "{% for n in nums limit: 2 %}{{ n }}{% endfor %}-{% for n in nums offset: continue %}{{ n }}{% endfor %}",
            json!({"nums": [1, 2, 3, 4]})
        ),
        "12-34"
    );
}

#[test]
fn iterating_a_mapping_yields_pairs() {
    assert_eq!(
        render(
            "{% for pair in m %}{{ pair[0] }}={{ pair[1] }};{% endfor %}",
            json!({"m": {"a": 1, "b": 2}})
        ),
        "a=1;b=2;"
    );
}

#[test]
fn break_and_continue() {
    assert_eq!(
        render(
            "{% for i in (1..5) %}{% if i == 3 %}{% break %}{% endif %}{{ i }}{% endfor %}",
            json!({})
        ),
        "12"
    );
    assert_eq!(
        render(
            "{% for i in (1..5) %}{% if i == 3 %}{% continue %}{% endif %}{{ i }}{% endfor %}",
            json!({})
        ),
        "1245"
    );
    // Break binds to the innermost loop.
    assert_eq!(
        render(
            "{% for a in (1..2) %}{% for b in (1..5) %}{% break %}{{ b }}{% endfor %}{{ a }}{% endfor %}",
            json!({})
        ),
        "12"
    );
}

#[test]
fn break_outside_a_loop_is_an_error() {
    let template = brine::parse("{% break %}").unwrap();
    assert!(matches!(
        template.render_json(json!({})),
        Err(brine::Error::Interrupt(brine::Interrupt::Break))
    ));
}

#[test]
fn tablerow_tag() {
    assert_eq!(
        render(
            "{% tablerow n in (1..3) cols: 2 %}{{ n }}{% endtablerow %}",
            json!({})
        ),
        "<tr class=\"row1\">\n<td class=\"col1\">1</td><td class=\"col2\">2</td></tr>\n<tr class=\"row2\"><td class=\"col1\">3</td></tr>\n"
    );
    assert_eq!(
        render(
            "{% tablerow n in (1..2) %}{{ n }}{% endtablerow %}",
            json!({})
        ),
        "<tr class=\"row1\">\n<td class=\"col1\">1</td><td class=\"col2\">2</td></tr>\n"
    );
}

#[test]
fn raw_tag() {
    assert_eq!(
        render("{% raw %}{{ not liquid }}{% endraw %}", json!({})),
        "{{ not liquid }}"
    );
}

#[test]
fn comments() {
    assert_eq!(render("a{# note #}b", json!({})), "ab");
    assert_eq!(render("a{## outer {# inner #} ##}b", json!({})), "ab");
}

#[test]
fn echo_tag() {
    assert_eq!(render("{% echo 'a' | upcase %}", json!({})), "A");
}

#[test]
fn liquid_lines() {
    assert_eq!(
        render(
            "{% liquid\nassign x = 'a'\n# just a note\necho x | upcase\n%}",
            json!({})
        ),
        "A"
    );
    assert_eq!(
        render(
            "{% liquid\nif x\necho 'yes'\nelse\necho 'no'\nendif\n%}",
            json!({"x": true})
        ),
        "yes"
    );
    assert_eq!(
        render(
            "{% liquid\nfor i in (1..3)\necho i\nendfor\n%}",
            json!({})
        ),
        "123"
    );
}

#[test]
fn auto_escape() {
    let env = Environment::new().with_auto_escape(true);
    let template = env.from_string("{{ '<b>' }}|{{ x }}").unwrap();
    assert_eq!(
        template.render_json(json!({"x": "<i>"})).unwrap(),
        "<b>|&lt;i&gt;"
    );
}

#[test]
fn escape_filter_output_is_safe() {
    let env = Environment::new().with_auto_escape(true);
    let template = env.from_string("{{ x | escape }}").unwrap();
    let out = template.render_json(json!({"x": "<i>"})).unwrap();
    assert_eq!(out, "&lt;i&gt;");
}

#[test]
fn suppress_blank_control_flow_blocks() {
    let env = Environment::new().with_suppress_blank_control_flow_blocks(true);
    let template = env.from_string("{% if true %}\n\t {% endif %}hi").unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "hi");

    let template = env.from_string("{% if true %} x {% endif %}hi").unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), " x hi");
}

#[test]
fn strict_undefined_raises() {
    let env = Environment::new().with_undefined(UndefinedPolicy::Strict);
    let template = env.from_string("{{ nosuchthing }}").unwrap();
    assert!(matches!(
        template.render_json(json!({})),
        Err(brine::Error::Undefined { .. })
    ));
}

#[test]
fn environment_globals_merge() {
    let mut globals = brine::ValueMap::new();
    globals.insert("you".to_string(), brine::Value::from("World"));
    let env = Environment::new().with_globals(globals);
    let template = env.from_string("Hello, {{ you }}{{ mark }}").unwrap();
    // Render-call globals take priority over environment globals.
    assert_eq!(
        template.render_json(json!({"mark": "!"})).unwrap(),
        "Hello, World!"
    );
    assert_eq!(
        template.render_json(json!({"you": "there", "mark": "."})).unwrap(),
        "Hello, there."
    );
}

#[test]
fn translate_tag() {
    assert_eq!(
        render(
            "{% translate you: 'World' %}Hello, {{ you }}!{% endtranslate %}",
            json!({})
        ),
        "Hello, World!"
    );
    assert_eq!(
        render(
            "{% translate count: 2 %}one item{% plural %}many items{% endtranslate %}",
            json!({})
        ),
        "many items"
    );
    assert_eq!(
        render(
            "{% translate count: 1 %}one item{% plural %}many items{% endtranslate %}",
            json!({})
        ),
        "one item"
    );
}

#[test]
fn translate_rejects_markup() {
    assert!(matches!(
        brine::parse("{% translate %}{% if x %}no{% endif %}{% endtranslate %}"),
        Err(brine::Error::TranslationSyntax { .. })
    ));
    assert!(matches!(
        brine::parse("{% translate %}{{ a | upcase }}{% endtranslate %}"),
        Err(brine::Error::TranslationSyntax { .. })
    ));
}

#[test]
fn unknown_tag_is_a_syntax_error() {
    assert!(matches!(
        brine::parse("{% nosuchtag %}"),
        Err(brine::Error::Syntax { .. })
    ));
    assert!(matches!(
        brine::parse("{% endif %}"),
        Err(brine::Error::Syntax { .. })
    ));
}

#[test]
fn round_trip_markup_display() {
    let source = "Hello, {{ you }}!{%- assign x = 'y' -%}{% if x %}a{% endif %}";
    let markup = brine::tokenize(source).unwrap();
    let rebuilt: String = markup.iter().map(ToString::to_string).collect();
    assert_eq!(rebuilt, source);
}

#[test]
fn every_markup_token_owns_its_span() {
    let source = "a {{ b }} c {% assign d = 1 %} {# e #} {% raw %}f{% endraw %}";
    let markup = brine::tokenize(source).unwrap();
    let mut last_stop = 0;
    for token in &markup {
        let span = token.span();
        assert!(span.start >= last_stop, "tokens must not overlap");
        assert!(span.stop <= source.len());
        last_stop = span.stop;
    }
    assert_eq!(last_stop, source.len());
}
