//! Static analysis output: variables, globals, locals, filters, tags.

use brine::{DictLoader, Environment};

#[test]
fn variables_globals_and_locals() {
    let source = "\
{% assign a = 'x' %}{{ a }}{{ b.c }}\
{% for i in items %}{{ i }}{{ forloop.index }}{% endfor %}\
{{ x | upcase }}";
    let template = brine::parse(source).unwrap();
    let analysis = template.analyze(false).unwrap();

    let mut variables: Vec<&str> = analysis.variables.keys().map(String::as_str).collect();
    variables.sort_unstable();
    assert_eq!(variables, ["a", "b", "forloop", "i", "items", "x"]);

    let mut globals: Vec<&str> = analysis.globals.keys().map(String::as_str).collect();
    globals.sort_unstable();
    // `a` is assigned, `i` and `forloop` are loop-scoped.
    assert_eq!(globals, ["b", "items", "x"]);

    let locals: Vec<&str> = analysis.locals.keys().map(String::as_str).collect();
    assert_eq!(locals, ["a"]);

    let filters: Vec<&str> = analysis.filters.keys().map(String::as_str).collect();
    assert_eq!(filters, ["upcase"]);

    let mut tags: Vec<&str> = analysis.tags.keys().map(String::as_str).collect();
    tags.sort_unstable();
    assert_eq!(tags, ["assign", "for"]);
}

#[test]
fn variable_paths_keep_their_segments() {
    let template = brine::parse("{{ a.b[0]['c d'] }}").unwrap();
    let analysis = template.analyze(false).unwrap();

    let refs = &analysis.variables["a"];
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].to_string(), "a.b[0]['c d']");
}

#[test]
fn spans_carry_the_template_name() {
    let env = Environment::new();
    let template = env.from_string_named("{{ thing }}", "page.liquid").unwrap();
    let analysis = template.analyze(false).unwrap();

    let refs = &analysis.globals["thing"];
    assert_eq!(&*refs[0].location.template_name, "page.liquid");
    assert_eq!(refs[0].location.start, 3);
    assert_eq!(refs[0].location.stop, 8);
}

#[test]
fn assigned_names_are_not_globals_after_assignment() {
    let template = brine::parse("{{ a }}{% assign a = 1 %}{{ a }}").unwrap();
    let analysis = template.analyze(false).unwrap();

    // The first reference is out of scope, the second is not.
    assert_eq!(analysis.variables["a"].len(), 2);
    assert_eq!(analysis.globals["a"].len(), 1);
}

#[test]
fn partials_are_followed_through_the_loader() {
    let env = Environment::new().with_loader(DictLoader::new([
        ("header", "{{ site_name }}{{ local_arg }}"),
    ]));
    let template = env
        .from_string("{% include 'header', local_arg: 1 %}")
        .unwrap();

    let analysis = template.analyze(true).unwrap();
    assert!(analysis.variables.contains_key("site_name"));
    assert!(analysis.globals.contains_key("site_name"));
    // Names bound by the include are in scope inside the partial.
    assert!(!analysis.globals.contains_key("local_arg"));

    // Without partials, the partial's variables are invisible.
    let analysis = template.analyze(false).unwrap();
    assert!(!analysis.variables.contains_key("site_name"));
}

#[test]
fn recursive_partials_are_visited_once() {
    let env = Environment::new().with_loader(DictLoader::new([
        ("rec", "{{ x }}{% include 'rec' %}"),
    ]));
    let template = env.from_string("{% include 'rec' %}").unwrap();

    let analysis = template.analyze(true).unwrap();
    assert_eq!(analysis.variables["x"].len(), 1);
}

#[test]
fn unloadable_partials_are_recorded() {
    let env = Environment::new();
    let template = env.from_string("{% include 'ghost' %}").unwrap();
    let analysis = template.analyze(true).unwrap();
    assert!(analysis.unloadable.contains_key("ghost"));
}

#[test]
fn render_partials_are_isolated_in_analysis() {
    let env = Environment::new().with_loader(DictLoader::new([("p", "{{ inner }}")]));
    let template = env
        .from_string("{% assign outer = 1 %}{% render 'p' %}")
        .unwrap();
    let analysis = template.analyze(true).unwrap();

    // `outer` is local to the root template; `inner` is global even
    // though `outer` is in the caller's scope.
    assert!(analysis.globals.contains_key("inner"));
    assert!(!analysis.globals.contains_key("outer"));
}
