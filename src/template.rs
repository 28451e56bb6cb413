//! A parsed template bound to its environment.

use crate::{
    analysis::{self, TemplateAnalysis},
    ast::Node,
    context::RenderContext,
    environment::Environment,
    error::Result,
    output::Output,
    value::{globals_from_json, ValueMap},
};
use std::{path::PathBuf, sync::Arc};

/// A callback reporting whether a loaded template's source is still
/// current.
pub type UpToDateFn = Arc<dyn Fn() -> bool + Send + Sync>;

/// The environment-independent part of a parsed template: its syntax
/// tree and identity. Shared between a loader cache and any number of
/// template handles.
pub struct TemplateBody {
    /// The template's name.
    pub(crate) name: Arc<str>,
    /// The path the source was loaded from, if any.
    pub(crate) path: Option<PathBuf>,
    /// The parsed syntax tree.
    pub(crate) nodes: Vec<Box<dyn Node>>,
}

impl core::fmt::Debug for TemplateBody {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TemplateBody")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

/// A parsed template, ready to render.
#[derive(Clone)]
pub struct Template<'env> {
    env: &'env Environment,
    pub(crate) body: Arc<TemplateBody>,
    /// Template-level globals, merged under render-call globals.
    pub(crate) globals: ValueMap,
    /// Loader-supplied overlay data.
    pub(crate) matter: ValueMap,
    pub(crate) up_to_date: Option<UpToDateFn>,
}

impl core::fmt::Debug for Template<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Template")
            .field("body", &self.body)
            .field("globals", &self.globals)
            .field("matter", &self.matter)
            .finish_non_exhaustive()
    }
}

impl<'env> Template<'env> {
    /// Creates a template from parsed nodes.
    pub(crate) fn new(env: &'env Environment, name: Arc<str>, nodes: Vec<Box<dyn Node>>) -> Self {
        Self {
            env,
            body: Arc::new(TemplateBody {
                name,
                path: None,
                nodes,
            }),
            globals: ValueMap::new(),
            matter: ValueMap::new(),
            up_to_date: None,
        }
    }

    /// Creates a template around a shared body, as loaders do.
    pub(crate) fn from_body(env: &'env Environment, body: Arc<TemplateBody>) -> Self {
        Self {
            env,
            body,
            globals: ValueMap::new(),
            matter: ValueMap::new(),
            up_to_date: None,
        }
    }

    /// The template's name.
    pub fn name(&self) -> &str {
        &self.body.name
    }

    /// The path the template was loaded from, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        self.body.path.as_ref()
    }

    /// The environment this template is bound to.
    pub fn env(&self) -> &'env Environment {
        self.env
    }

    /// The template's top-level nodes.
    pub fn nodes(&self) -> &[Box<dyn Node>] {
        &self.body.nodes
    }

    /// Attaches template-level globals.
    pub fn with_globals(mut self, globals: ValueMap) -> Self {
        self.globals = globals;
        self
    }

    /// Attaches overlay data, layered below globals.
    pub fn with_matter(mut self, matter: ValueMap) -> Self {
        self.matter = matter;
        self
    }

    /// Renders the template with the given render-call globals.
    pub fn render(&self, globals: ValueMap) -> Result<String> {
        let mut ctx = self.make_context(globals);
        let mut out = Output::new(self.env.output_stream_limit);
        self.render_with_context(&mut ctx, &mut out)?;
        Ok(out.into_string())
    }

    /// Renders with globals given as a JSON object.
    pub fn render_json(&self, globals: serde_json::Value) -> Result<String> {
        self.render(globals_from_json(globals))
    }

    /// An async version of [`Template::render`].
    pub async fn render_async(&self, globals: ValueMap) -> Result<String> {
        let mut ctx = self.make_context(globals);
        let mut out = Output::new(self.env.output_stream_limit);
        self.render_with_context_async(&mut ctx, &mut out).await?;
        Ok(out.into_string())
    }

    /// An async version of [`Template::render_json`].
    pub async fn render_json_async(&self, globals: serde_json::Value) -> Result<String> {
        self.render_async(globals_from_json(globals)).await
    }

    /// Renders this template's nodes into an existing context and
    /// buffer. Partial-rendering tags use this to nest templates.
    pub fn render_with_context(
        &self,
        ctx: &mut RenderContext<'_>,
        out: &mut Output,
    ) -> Result<usize> {
        let mut count = 0;
        for node in &self.body.nodes {
            count += node.render(ctx, out)?;
        }
        Ok(count)
    }

    /// An async version of [`Template::render_with_context`].
    pub async fn render_with_context_async(
        &self,
        ctx: &mut RenderContext<'_>,
        out: &mut Output,
    ) -> Result<usize> {
        let mut count = 0;
        for node in &self.body.nodes {
            count += node.render_async(ctx, out).await?;
        }
        Ok(count)
    }

    /// Statically analyzes variable, filter and tag usage.
    ///
    /// With `include_partials`, templates loaded by `include`, `render`
    /// and `extends` are resolved through the loader and analyzed too.
    pub fn analyze(&self, include_partials: bool) -> Result<TemplateAnalysis> {
        analysis::analyze(self, include_partials)
    }

    /// An async version of [`Template::analyze`]. Analysis itself never
    /// suspends; partial sources load through the loader's sync path.
    pub async fn analyze_async(&self, include_partials: bool) -> Result<TemplateAnalysis> {
        analysis::analyze(self, include_partials)
    }

    /// Asks the loader-supplied callback whether the source this
    /// template was built from is still current.
    pub fn is_up_to_date(&self) -> bool {
        self.up_to_date.as_ref().map_or(true, |check| check())
    }

    fn make_context(&self, globals: ValueMap) -> RenderContext<'env> {
        let mut merged = self.env.make_globals(Some(&self.globals));
        for (key, value) in globals {
            merged.insert(key, value);
        }
        RenderContext::new(
            self.env,
            Arc::clone(&self.body.name),
            merged,
            self.matter.clone(),
        )
    }
}
