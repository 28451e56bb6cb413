//! Loader behavior: dictionaries, the filesystem, choice fallback and
//! the caching wrapper.

use brine::{
    CachingLoader, ChoiceLoader, DictLoader, Environment, Error, FileSystemLoader, Loader,
    RenderContext, TemplateSource,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn dict_loader() {
    init_logging();
    let env = Environment::new()
        .with_loader(DictLoader::new([("index", "Hello, {{ you }}!")]));
    let template = env.get_template("index").unwrap();
    assert_eq!(
        template.render_json(json!({"you": "World"})).unwrap(),
        "Hello, World!"
    );
    assert!(matches!(
        env.get_template("ghost"),
        Err(Error::TemplateNotFound { .. })
    ));
}

#[test]
fn filesystem_loader() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.liquid"), "Hello, {{ you }}!").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("sub/page.liquid"), "sub").unwrap();

    let env = Environment::new()
        .with_loader(FileSystemLoader::new([dir.path()]).with_extension(".liquid"));

    let template = env.get_template("index").unwrap();
    assert_eq!(
        template.render_json(json!({"you": "World"})).unwrap(),
        "Hello, World!"
    );
    assert!(template.is_up_to_date());

    // Subdirectories resolve; missing names do not.
    assert_eq!(
        env.get_template("sub/page")
            .unwrap()
            .render_json(json!({}))
            .unwrap(),
        "sub"
    );
    assert!(matches!(
        env.get_template("ghost"),
        Err(Error::TemplateNotFound { .. })
    ));
}

#[test]
fn filesystem_loader_refuses_escapes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.liquid"), "x").unwrap();

    let env = Environment::new()
        .with_loader(FileSystemLoader::new([dir.path()]).with_extension(".liquid"));
    assert!(matches!(
        env.get_template("../secrets"),
        Err(Error::TemplateNotFound { .. })
    ));
    assert!(matches!(
        env.get_template("sub/../../secrets"),
        Err(Error::TemplateNotFound { .. })
    ));
}

#[test]
fn choice_loader_tries_in_order() {
    let env = Environment::new().with_loader(ChoiceLoader::new(vec![
        Box::new(DictLoader::new([("a", "first")])),
        Box::new(DictLoader::new([("a", "second"), ("b", "fallback")])),
    ]));

    assert_eq!(
        env.get_template("a").unwrap().render_json(json!({})).unwrap(),
        "first"
    );
    assert_eq!(
        env.get_template("b").unwrap().render_json(json!({})).unwrap(),
        "fallback"
    );
    assert!(matches!(
        env.get_template("c"),
        Err(Error::TemplateNotFound { .. })
    ));
}

/// A loader that counts how many times a source is fetched.
#[derive(Debug)]
struct CountingLoader {
    inner: DictLoader,
    fetches: AtomicUsize,
}

impl Loader for CountingLoader {
    fn get_source(
        &self,
        env: &Environment,
        name: &str,
        context: Option<&RenderContext<'_>>,
    ) -> Result<TemplateSource, Error> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.get_source(env, name, context)
    }
}

#[test]
fn caching_loader_memoizes_parses() {
    static FETCHES: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct Probe;
    impl Loader for Probe {
        fn get_source(
            &self,
            _env: &Environment,
            name: &str,
            _context: Option<&RenderContext<'_>>,
        ) -> Result<TemplateSource, Error> {
            FETCHES.fetch_add(1, Ordering::SeqCst);
            Ok(TemplateSource::new("cached {{ x }}", name))
        }
    }

    let env = Environment::new().with_loader(CachingLoader::new(Probe));

    let first = env.get_template("page").unwrap();
    let second = env.get_template("page").unwrap();
    assert_eq!(FETCHES.load(Ordering::SeqCst), 1);

    assert_eq!(first.render_json(json!({"x": 1})).unwrap(), "cached 1");
    assert_eq!(second.render_json(json!({"x": 2})).unwrap(), "cached 2");
}

#[test]
fn caching_loader_reloads_stale_templates() {
    static FETCHES: AtomicUsize = AtomicUsize::new(0);

    // Sources are never up to date, so auto-reload fetches every time.
    #[derive(Debug)]
    struct AlwaysStale;
    impl Loader for AlwaysStale {
        fn get_source(
            &self,
            _env: &Environment,
            name: &str,
            _context: Option<&RenderContext<'_>>,
        ) -> Result<TemplateSource, Error> {
            FETCHES.fetch_add(1, Ordering::SeqCst);
            let mut source = TemplateSource::new("x", name);
            source.up_to_date = Some(std::sync::Arc::new(|| false));
            Ok(source)
        }
    }

    let env = Environment::new().with_loader(CachingLoader::new(AlwaysStale));
    env.get_template("page").unwrap();
    env.get_template("page").unwrap();
    assert_eq!(FETCHES.load(Ordering::SeqCst), 2);

    // With auto-reload disabled the cache entry sticks.
    FETCHES.store(0, Ordering::SeqCst);
    let env = Environment::new()
        .with_loader(CachingLoader::new(AlwaysStale).with_auto_reload(false));
    env.get_template("page").unwrap();
    env.get_template("page").unwrap();
    assert_eq!(FETCHES.load(Ordering::SeqCst), 1);
}

#[test]
fn caching_loader_counts_through_counting_loader() {
    let loader = CountingLoader {
        inner: DictLoader::new([("partial", "p")]),
        fetches: AtomicUsize::new(0),
    };
    let env = Environment::new().with_loader(CachingLoader::new(loader));

    // Rendering the same partial repeatedly parses it once.
    let template = env
        .from_string("{% for i in (1..3) %}{% include 'partial' %}{% endfor %}")
        .unwrap();
    assert_eq!(template.render_json(json!({})).unwrap(), "ppp");
}
