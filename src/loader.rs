//! Template loaders: the front door that turns names into parsed
//! templates, optionally memoized in an LRU cache.

use crate::{
    context::RenderContext,
    environment::Environment,
    error::{Error, Result},
    template::{Template, TemplateBody, UpToDateFn},
    value::{to_liquid_string, ValueMap},
};
use core::fmt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use schnellru::{ByLength, LruMap};
use std::{
    collections::HashMap,
    fs,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

/// Source text and metadata returned by a loader.
pub struct TemplateSource {
    /// The template source text.
    pub source: String,
    /// The template's name, as the loader understands it.
    pub name: String,
    /// The path the source came from, if any.
    pub path: Option<PathBuf>,
    /// An optional callback reporting whether the source is still
    /// current. `None` disables reload checks.
    pub up_to_date: Option<UpToDateFn>,
    /// Optional overlay data attached to the template, layered below
    /// globals.
    pub matter: Option<ValueMap>,
}

impl TemplateSource {
    /// Creates a plain source with no reload callback or matter.
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            path: None,
            up_to_date: None,
            matter: None,
        }
    }
}

impl fmt::Debug for TemplateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateSource")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("matter", &self.matter)
            .finish_non_exhaustive()
    }
}

/// Supplies template sources by name.
pub trait Loader: Send + Sync + fmt::Debug {
    /// Returns the source and metadata for a template.
    ///
    /// `context` is the render context of the template doing the
    /// loading, if any; loaders may use it to narrow the search space.
    fn get_source(
        &self,
        env: &Environment,
        name: &str,
        context: Option<&RenderContext<'_>>,
    ) -> Result<TemplateSource>;

    /// An async version of [`Loader::get_source`].
    fn get_source_async<'a>(
        &'a self,
        env: &'a Environment,
        name: &'a str,
        context: Option<&'a RenderContext<'_>>,
    ) -> BoxFuture<'a, Result<TemplateSource>> {
        Box::pin(core::future::ready(self.get_source(env, name, context)))
    }

    /// Loads and parses a template, attaching its reload callback and
    /// matter.
    fn load<'env>(
        &self,
        env: &'env Environment,
        name: &str,
        globals: Option<ValueMap>,
        context: Option<&RenderContext<'_>>,
    ) -> Result<Template<'env>> {
        let source = self.get_source(env, name, context)?;
        source_to_template(env, source, globals)
    }

    /// An async version of [`Loader::load`].
    fn load_async<'a, 'env: 'a>(
        &'a self,
        env: &'env Environment,
        name: &'a str,
        globals: Option<ValueMap>,
        context: Option<&'a RenderContext<'_>>,
    ) -> BoxFuture<'a, Result<Template<'env>>> {
        Box::pin(async move {
            let source = self.get_source_async(env, name, context).await?;
            source_to_template(env, source, globals)
        })
    }
}

/// Parses a loader-supplied source into a template.
fn source_to_template<'env>(
    env: &'env Environment,
    source: TemplateSource,
    globals: Option<ValueMap>,
) -> Result<Template<'env>> {
    let nodes = env.parse(&source.source)?;
    let body = Arc::new(TemplateBody {
        name: Arc::from(source.name.as_str()),
        path: source.path,
        nodes,
    });

    let mut template = Template::from_body(env, body);
    template.globals = globals.unwrap_or_default();
    template.matter = source.matter.unwrap_or_default();
    template.up_to_date = source.up_to_date;
    Ok(template)
}

/// A loader backed by an in-memory map of template names to sources.
#[derive(Debug, Default)]
pub struct DictLoader {
    templates: HashMap<String, String>,
}

impl DictLoader {
    /// Creates a loader over the given name/source pairs.
    pub fn new<K, V>(templates: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            templates: templates
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Adds or replaces a template source.
    pub fn insert(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.templates.insert(name.into(), source.into());
    }
}

impl Loader for DictLoader {
    fn get_source(
        &self,
        _env: &Environment,
        name: &str,
        _context: Option<&RenderContext<'_>>,
    ) -> Result<TemplateSource> {
        match self.templates.get(name) {
            Some(source) => Ok(TemplateSource::new(source.clone(), name)),
            None => Err(Error::TemplateNotFound {
                name: name.to_string(),
            }),
        }
    }
}

/// A loader reading template files from one or more search roots.
///
/// Names that resolve outside every search root are refused.
#[derive(Debug)]
pub struct FileSystemLoader {
    roots: Vec<PathBuf>,
    extension: Option<String>,
}

impl FileSystemLoader {
    /// Creates a loader over the given search roots, tried in order.
    pub fn new<P: Into<PathBuf>>(roots: impl IntoIterator<Item = P>) -> Self {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            extension: None,
        }
    }

    /// Appends `extension` (including its dot) to names that do not
    /// already carry it.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }

    fn file_name(&self, name: &str) -> String {
        match &self.extension {
            Some(extension) if !name.ends_with(extension.as_str()) => {
                format!("{name}{extension}")
            }
            _ => name.to_string(),
        }
    }
}

/// Lexically normalizes a path, resolving `.` and `..` components
/// without touching the filesystem.
fn normalized(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

impl Loader for FileSystemLoader {
    fn get_source(
        &self,
        _env: &Environment,
        name: &str,
        _context: Option<&RenderContext<'_>>,
    ) -> Result<TemplateSource> {
        let file_name = self.file_name(name);

        for root in &self.roots {
            let candidate = root.join(&file_name);

            // Refuse names that walk out of the search root.
            if !normalized(&candidate).starts_with(normalized(root)) {
                return Err(Error::TemplateNotFound {
                    name: name.to_string(),
                });
            }

            let source = match fs::read_to_string(&candidate) {
                Ok(source) => source,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            log::debug!("loaded template '{name}' from {}", candidate.display());

            let mtime = fs::metadata(&candidate)
                .and_then(|meta| meta.modified())
                .ok();
            let watched = candidate.clone();
            let up_to_date: UpToDateFn = Arc::new(move || {
                fs::metadata(&watched)
                    .and_then(|meta| meta.modified())
                    .ok()
                    == mtime
            });

            return Ok(TemplateSource {
                source,
                name: name.to_string(),
                path: Some(candidate),
                up_to_date: Some(up_to_date),
                matter: None,
            });
        }

        Err(Error::TemplateNotFound {
            name: name.to_string(),
        })
    }
}

/// A loader that tries a list of inner loaders in order.
#[derive(Debug)]
pub struct ChoiceLoader {
    loaders: Vec<Box<dyn Loader>>,
}

impl ChoiceLoader {
    /// Creates a loader over the given delegates.
    pub fn new(loaders: Vec<Box<dyn Loader>>) -> Self {
        Self { loaders }
    }
}

impl Loader for ChoiceLoader {
    fn get_source(
        &self,
        env: &Environment,
        name: &str,
        context: Option<&RenderContext<'_>>,
    ) -> Result<TemplateSource> {
        for loader in &self.loaders {
            match loader.get_source(env, name, context) {
                Ok(source) => return Ok(source),
                Err(Error::TemplateNotFound { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(Error::TemplateNotFound {
            name: name.to_string(),
        })
    }
}

/// A parsed template held by a [`CachingLoader`].
#[derive(Clone)]
struct CachedTemplate {
    body: Arc<TemplateBody>,
    matter: ValueMap,
    up_to_date: Option<UpToDateFn>,
}

/// Wraps any loader with a least-recently-used cache of parsed
/// templates.
///
/// The cache key is the template name, optionally prefixed by the value
/// of a namespace variable resolved from the loading render context. On
/// a hit with auto-reload enabled, the cached template's `up_to_date`
/// callback decides whether to re-load. The cache is guarded by a lock
/// and safe for concurrent use.
pub struct CachingLoader {
    inner: Box<dyn Loader>,
    cache: Mutex<LruMap<String, CachedTemplate>>,
    auto_reload: bool,
    namespace_key: String,
}

impl CachingLoader {
    /// The default cache capacity, in templates.
    pub const DEFAULT_CAPACITY: u32 = 300;

    /// Wraps `inner` with a cache of the default capacity.
    pub fn new(inner: impl Loader + 'static) -> Self {
        Self::with_capacity(inner, Self::DEFAULT_CAPACITY)
    }

    /// Wraps `inner` with a cache holding at most `capacity` templates.
    pub fn with_capacity(inner: impl Loader + 'static, capacity: u32) -> Self {
        Self {
            inner: Box::new(inner),
            cache: Mutex::new(LruMap::new(ByLength::new(capacity))),
            auto_reload: true,
            namespace_key: String::new(),
        }
    }

    /// Enables or disables `up_to_date` checks on cache hits.
    pub fn with_auto_reload(mut self, auto_reload: bool) -> Self {
        self.auto_reload = auto_reload;
        self
    }

    /// Prefixes cache keys with the value of this render context
    /// variable, partitioning the cache by namespace.
    pub fn with_namespace_key(mut self, key: impl Into<String>) -> Self {
        self.namespace_key = key.into();
        self
    }

    fn cache_key(&self, name: &str, context: Option<&RenderContext<'_>>) -> String {
        if self.namespace_key.is_empty() {
            return name.to_string();
        }
        match context.and_then(|ctx| ctx.resolve_name(&self.namespace_key)) {
            Some(value) => format!("{}/{name}", to_liquid_string(&value, false)),
            None => name.to_string(),
        }
    }

    /// Returns a cached template, or `None` on a miss or when the cached
    /// entry is stale.
    fn check_cache<'env>(&self, env: &'env Environment, key: &String) -> Option<Template<'env>> {
        let mut cache = self.cache.lock();

        let stale = self.auto_reload
            && cache.get(key).is_some_and(|entry| {
                entry
                    .up_to_date
                    .as_ref()
                    .is_some_and(|up_to_date| !up_to_date())
            });
        if stale {
            log::debug!("cached template '{key}' is out of date, reloading");
            cache.remove(key);
            return None;
        }

        let entry = cache.get(key)?;
        let mut template = Template::from_body(env, Arc::clone(&entry.body));
        template.matter = entry.matter.clone();
        template.up_to_date = entry.up_to_date.clone();
        Some(template)
    }

    fn store(&self, key: String, template: &Template<'_>) {
        self.cache.lock().insert(
            key,
            CachedTemplate {
                body: Arc::clone(&template.body),
                matter: template.matter.clone(),
                up_to_date: template.up_to_date.clone(),
            },
        );
    }
}

impl fmt::Debug for CachingLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingLoader")
            .field("inner", &self.inner)
            .field("auto_reload", &self.auto_reload)
            .field("namespace_key", &self.namespace_key)
            .finish_non_exhaustive()
    }
}

impl Loader for CachingLoader {
    fn get_source(
        &self,
        env: &Environment,
        name: &str,
        context: Option<&RenderContext<'_>>,
    ) -> Result<TemplateSource> {
        self.inner.get_source(env, name, context)
    }

    fn load<'env>(
        &self,
        env: &'env Environment,
        name: &str,
        globals: Option<ValueMap>,
        context: Option<&RenderContext<'_>>,
    ) -> Result<Template<'env>> {
        let key = self.cache_key(name, context);

        if let Some(mut template) = self.check_cache(env, &key) {
            template.globals = globals.unwrap_or_default();
            return Ok(template);
        }

        let template = self.inner.load(env, name, globals, context)?;
        self.store(key, &template);
        Ok(template)
    }

    fn load_async<'a, 'env: 'a>(
        &'a self,
        env: &'env Environment,
        name: &'a str,
        globals: Option<ValueMap>,
        context: Option<&'a RenderContext<'_>>,
    ) -> BoxFuture<'a, Result<Template<'env>>> {
        Box::pin(async move {
            let key = self.cache_key(name, context);

            if let Some(mut template) = self.check_cache(env, &key) {
                template.globals = globals.unwrap_or_default();
                return Ok(template);
            }

            let template = self.inner.load_async(env, name, globals, context).await?;
            self.store(key, &template);
            Ok(template)
        })
    }
}
