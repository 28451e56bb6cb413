//! Template parsing and rendering configuration.

use crate::{
    ast::Node,
    error::Result,
    filters::{self, Filter},
    lexer,
    loader::{DictLoader, Loader},
    parser::Parser,
    tags::{
        self,
        translate::{NullTranslations, Translations},
        Tag,
    },
    template::Template,
    token::WhitespaceControl,
    value::ValueMap,
};
use indexmap::IndexMap;
use std::sync::Arc;

/// What happens when a variable path fails to resolve.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum UndefinedPolicy {
    /// Produce an `Undefined` value that behaves like an empty, null-ish
    /// sentinel.
    #[default]
    Lenient,
    /// Raise an `UndefinedError` immediately.
    Strict,
}

/// Shared parsing and rendering configuration.
///
/// An environment is configured once, then shared by any number of
/// templates. Registered tags and filters, the loader, globals and the
/// resource limits all live here.
#[derive(Debug)]
pub struct Environment {
    pub(crate) loader: Box<dyn Loader>,
    pub(crate) globals: ValueMap,
    pub(crate) auto_escape: bool,
    pub(crate) undefined: UndefinedPolicy,
    pub(crate) default_trim: WhitespaceControl,
    pub(crate) context_depth_limit: usize,
    pub(crate) loop_iteration_limit: Option<u64>,
    pub(crate) local_namespace_limit: Option<u64>,
    pub(crate) output_stream_limit: Option<usize>,
    pub(crate) suppress_blank_control_flow_blocks: bool,
    pub(crate) validate_filter_arguments: bool,
    pub(crate) translations: Arc<dyn Translations>,
    pub(crate) tags: IndexMap<String, Arc<dyn Tag>>,
    pub(crate) filters: IndexMap<String, Arc<dyn Filter>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Creates an environment with the standard tags and filters, an
    /// empty in-memory loader, and default limits.
    pub fn new() -> Self {
        let mut env = Self {
            loader: Box::new(DictLoader::new(std::iter::empty::<(String, String)>())),
            globals: ValueMap::new(),
            auto_escape: false,
            undefined: UndefinedPolicy::Lenient,
            default_trim: WhitespaceControl::Plus,
            context_depth_limit: 30,
            loop_iteration_limit: None,
            local_namespace_limit: None,
            output_stream_limit: None,
            suppress_blank_control_flow_blocks: false,
            validate_filter_arguments: false,
            translations: Arc::new(NullTranslations),
            tags: IndexMap::new(),
            filters: IndexMap::new(),
        };
        tags::register_standard_tags(&mut env);
        filters::register_standard_filters(&mut env);
        env
    }

    /// Replaces the template loader.
    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Sets globals merged into every render's scope.
    pub fn with_globals(mut self, globals: ValueMap) -> Self {
        self.globals = globals;
        self
    }

    /// Enables or disables HTML auto-escaping.
    pub fn with_auto_escape(mut self, auto_escape: bool) -> Self {
        self.auto_escape = auto_escape;
        self
    }

    /// Sets the undefined-variable policy.
    pub fn with_undefined(mut self, policy: UndefinedPolicy) -> Self {
        self.undefined = policy;
        self
    }

    /// Sets the trim applied where markup carries no explicit
    /// whitespace-control hint. `Default` is not a valid policy here and
    /// falls back to `Plus`.
    pub fn with_default_trim(mut self, trim: WhitespaceControl) -> Self {
        self.default_trim = match trim {
            WhitespaceControl::Default => WhitespaceControl::Plus,
            other => other,
        };
        self
    }

    /// Sets the maximum nesting depth of render frames.
    pub fn with_context_depth_limit(mut self, limit: usize) -> Self {
        self.context_depth_limit = limit;
        self
    }

    /// Caps cumulative loop iterations across nested loops and partials.
    pub fn with_loop_iteration_limit(mut self, limit: Option<u64>) -> Self {
        self.loop_iteration_limit = limit;
        self
    }

    /// Caps the approximate byte size of a template's local namespace.
    pub fn with_local_namespace_limit(mut self, limit: Option<u64>) -> Self {
        self.local_namespace_limit = limit;
        self
    }

    /// Caps the number of bytes a render may write.
    pub fn with_output_stream_limit(mut self, limit: Option<usize>) -> Self {
        self.output_stream_limit = limit;
        self
    }

    /// Drops whitespace-only output of control-flow blocks.
    pub fn with_suppress_blank_control_flow_blocks(mut self, suppress: bool) -> Self {
        self.suppress_blank_control_flow_blocks = suppress;
        self
    }

    /// Validates filter names and arguments at parse time instead of at
    /// first use.
    pub fn with_validate_filter_arguments(mut self, validate: bool) -> Self {
        self.validate_filter_arguments = validate;
        self
    }

    /// Sets the message catalog consulted by the `translate` tag.
    pub fn with_translations(mut self, translations: impl Translations + 'static) -> Self {
        self.translations = Arc::new(translations);
        self
    }

    /// The message catalog consulted by the `translate` tag.
    pub fn translations(&self) -> Arc<dyn Translations> {
        Arc::clone(&self.translations)
    }

    /// Registers a tag parser.
    pub fn add_tag(&mut self, name: impl Into<String>, tag: Arc<dyn Tag>) {
        self.tags.insert(name.into(), tag);
    }

    /// Registers a filter.
    pub fn add_filter(&mut self, name: impl Into<String>, filter: Arc<dyn Filter>) {
        self.filters.insert(name.into(), filter);
    }

    /// Compiles template source text into an abstract syntax tree.
    pub fn parse(&self, source: &str) -> Result<Vec<Box<dyn Node>>> {
        Parser::new(self).parse(lexer::tokenize(source)?)
    }

    /// Creates a template from a string.
    pub fn from_string(&self, source: &str) -> Result<Template<'_>> {
        self.from_string_named(source, "<string>")
    }

    /// Creates a named template from a string. The name shows up in
    /// analysis spans and partial-boundary errors.
    pub fn from_string_named(&self, source: &str, name: &str) -> Result<Template<'_>> {
        Ok(Template::new(self, Arc::from(name), self.parse(source)?))
    }

    /// Loads and parses a template using the configured loader.
    pub fn get_template(&self, name: &str) -> Result<Template<'_>> {
        self.loader.load(self, name, None, None)
    }

    /// Loads a template with template-level globals attached.
    pub fn get_template_with_globals(
        &self,
        name: &str,
        globals: ValueMap,
    ) -> Result<Template<'_>> {
        self.loader.load(self, name, Some(globals), None)
    }

    /// An async version of [`Environment::get_template`].
    pub async fn get_template_async(&self, name: &str) -> Result<Template<'_>> {
        self.loader.load_async(self, name, None, None).await
    }

    /// Loads a template on behalf of a rendering template, giving the
    /// loader access to the live render context.
    pub(crate) fn get_template_from(
        &self,
        name: &str,
        context: Option<&crate::context::RenderContext<'_>>,
    ) -> Result<Template<'_>> {
        self.loader.load(self, name, None, context)
    }

    /// An async version of [`Environment::get_template_from`].
    pub(crate) async fn get_template_from_async(
        &self,
        name: &str,
        context: Option<&crate::context::RenderContext<'_>>,
    ) -> Result<Template<'_>> {
        self.loader.load_async(self, name, None, context).await
    }

    /// Combines environment globals with template globals. Template
    /// globals take priority.
    pub fn make_globals(&self, overrides: Option<&ValueMap>) -> ValueMap {
        let mut globals = self.globals.clone();
        if let Some(overrides) = overrides {
            for (key, value) in overrides {
                globals.insert(key.clone(), value.clone());
            }
        }
        globals
    }

    /// Applies whitespace control to `text`, resolving `Default` hints
    /// to the configured policy.
    pub fn trim<'t>(
        &self,
        text: &'t str,
        left_trim: WhitespaceControl,
        right_trim: WhitespaceControl,
    ) -> &'t str {
        let resolve = |trim| match trim {
            WhitespaceControl::Default => self.default_trim,
            other => other,
        };

        let mut text = text;
        match resolve(left_trim) {
            WhitespaceControl::Minus => text = text.trim_start(),
            WhitespaceControl::Tilde => text = text.trim_start_matches(['\r', '\n']),
            _ => {}
        }
        match resolve(right_trim) {
            WhitespaceControl::Minus => text = text.trim_end(),
            WhitespaceControl::Tilde => text = text.trim_end_matches(['\r', '\n']),
            _ => {}
        }
        text
    }
}
