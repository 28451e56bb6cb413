//! Static analysis: variable, filter and tag usage from a parsed
//! template, with partials followed through the loader.

use crate::{
    ast::{Node, PartialScope},
    context::RenderContext,
    error::Result,
    expression::{Expression, FilterCall},
    template::Template,
    token::{PathSegment, PathToken, Span},
    value::{to_liquid_string, ValueMap},
};
use core::fmt;
use indexmap::IndexMap;
use regex::Regex;
use std::{
    collections::HashSet,
    sync::{Arc, LazyLock},
};

/// The location of a variable, filter or tag in a template.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Location {
    /// The name of the template the item appears in.
    pub template_name: Arc<str>,
    /// The start byte offset.
    pub start: usize,
    /// The stop byte offset.
    pub stop: usize,
}

impl Location {
    fn new(template_name: &Arc<str>, span: Span) -> Self {
        Self {
            template_name: Arc::clone(template_name),
            start: span.start,
            stop: span.stop,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}:{}]", self.template_name, self.start, self.stop)
    }
}

/// One segment of an analyzed variable.
#[derive(Clone, Debug, PartialEq)]
pub enum VarSegment {
    /// A property name.
    Name(String),
    /// A sequence index.
    Index(i64),
    /// A nested, computed segment.
    Nested(Variable),
}

/// A variable reference: its segments and where it appears.
#[derive(Clone, Debug, PartialEq)]
pub struct Variable {
    /// The path segments; the first is the head name.
    pub segments: Vec<VarSegment>,
    /// Where the reference appears.
    pub location: Location,
}

impl Variable {
    /// The head name of the variable.
    pub fn head(&self) -> &str {
        match self.segments.first() {
            Some(VarSegment::Name(name)) => name,
            _ => "",
        }
    }
}

static PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\u{80}-\u{10FFFF}a-zA-Z_][\u{80}-\u{10FFFF}a-zA-Z0-9_-]*$").unwrap()
});

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut it = self.segments.iter();
        if let Some(VarSegment::Name(head)) = it.next() {
            f.write_str(head)?;
        }
        for segment in it {
            match segment {
                VarSegment::Name(name) if PROPERTY.is_match(name) => write!(f, ".{name}")?,
                VarSegment::Name(name) => write!(f, "['{name}']")?,
                VarSegment::Index(index) => write!(f, "[{index}]")?,
                VarSegment::Nested(variable) => write!(f, "[{variable}]")?,
            }
        }
        Ok(())
    }
}

/// The result of analyzing a template.
#[derive(Debug, Default)]
pub struct TemplateAnalysis {
    /// Every referenced variable, in scope or not.
    pub variables: IndexMap<String, Vec<Variable>>,
    /// Variables that are out of scope where they appear: expected to be
    /// supplied by the application.
    pub globals: IndexMap<String, Vec<Variable>>,
    /// Names added to the template's local scope, used or not.
    pub locals: IndexMap<String, Vec<Variable>>,
    /// Partial templates the loader could not resolve.
    pub unloadable: IndexMap<String, Vec<Location>>,
    /// Every filter reference.
    pub filters: IndexMap<String, Vec<Location>>,
    /// Every tag reference.
    pub tags: IndexMap<String, Vec<Location>>,
}

/// A lexical scope stack used during the walk.
struct StaticScope {
    stack: Vec<HashSet<String>>,
}

impl StaticScope {
    fn new(globals: HashSet<String>) -> Self {
        Self {
            stack: vec![globals],
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.stack.iter().any(|scope| scope.contains(name))
    }

    fn push(&mut self, scope: HashSet<String>) {
        self.stack.push(scope);
    }

    fn pop(&mut self) {
        self.stack.pop();
    }

    /// Adds a name to the template's root scope.
    fn add_to_template_scope(&mut self, name: String) {
        self.stack[0].insert(name);
    }
}

/// Analyzes `template`, optionally following partials.
pub(crate) fn analyze(template: &Template<'_>, include_partials: bool) -> Result<TemplateAnalysis> {
    let mut analyzer = Analyzer {
        template,
        include_partials,
        analysis: TemplateAnalysis::default(),
        seen: HashSet::new(),
    };

    let template_name: Arc<str> = Arc::from(template.name());
    let mut scope = StaticScope::new(HashSet::new());
    for node in template.nodes() {
        analyzer.visit(node.as_ref(), &template_name, &mut scope)?;
    }

    Ok(analyzer.analysis)
}

struct Analyzer<'t, 'env> {
    template: &'t Template<'env>,
    include_partials: bool,
    analysis: TemplateAnalysis,
    /// Names of partials already analyzed, guarding recursion.
    seen: HashSet<String>,
}

impl Analyzer<'_, '_> {
    fn visit(
        &mut self,
        node: &dyn Node,
        template_name: &Arc<str>,
        scope: &mut StaticScope,
    ) -> Result<()> {
        if let Some(tag) = node.tag_name() {
            self.analysis
                .tags
                .entry(tag.to_string())
                .or_default()
                .push(Location::new(template_name, node.span()));
        }

        for expr in node.expressions() {
            self.visit_expression(expr, template_name, scope);
        }

        for ident in node.template_scope() {
            scope.add_to_template_scope(ident.name.clone());
            self.analysis
                .locals
                .entry(ident.name.clone())
                .or_default()
                .push(Variable {
                    segments: vec![VarSegment::Name(ident.name)],
                    location: Location::new(template_name, ident.span),
                });
        }

        match node.partial_scope() {
            Some(partial) if self.include_partials => {
                // The node's own children first; `extends` owns the rest
                // of its source template.
                let block_scope: HashSet<String> = node
                    .block_scope()
                    .into_iter()
                    .map(|ident| ident.name)
                    .collect();
                scope.push(block_scope);
                for child in node.children() {
                    self.visit(child, template_name, scope)?;
                }
                scope.pop();

                self.visit_partial(
                    node,
                    partial.name,
                    partial.scope,
                    partial
                        .in_scope
                        .into_iter()
                        .map(|ident| ident.name)
                        .collect(),
                    template_name,
                    scope,
                )
            }
            _ => {
                let block_scope: HashSet<String> = node
                    .block_scope()
                    .into_iter()
                    .map(|ident| ident.name)
                    .collect();
                scope.push(block_scope);
                for child in node.children() {
                    self.visit(child, template_name, scope)?;
                }
                scope.pop();
                Ok(())
            }
        }
    }

    fn visit_partial(
        &mut self,
        node: &dyn Node,
        name_expr: &Expression,
        partial_scope: PartialScope,
        in_scope: HashSet<String>,
        template_name: &Arc<str>,
        scope: &mut StaticScope,
    ) -> Result<()> {
        // Resolve the partial's name statically, with an empty context.
        let env = self.template.env();
        let mut static_ctx = RenderContext::new(
            env,
            Arc::clone(template_name),
            ValueMap::new(),
            ValueMap::new(),
        );
        let Ok(name_value) = name_expr.evaluate(&mut static_ctx) else {
            self.analysis
                .unloadable
                .entry(name_expr.to_string())
                .or_default()
                .push(Location::new(template_name, node.span()));
            return Ok(());
        };
        let name = to_liquid_string(&name_value, false);

        if self.seen.contains(&name) {
            return Ok(());
        }

        let Ok(partial) = env.get_template(&name) else {
            self.analysis
                .unloadable
                .entry(name.clone())
                .or_default()
                .push(Location::new(template_name, node.span()));
            return Ok(());
        };

        self.seen.insert(name.clone());
        let partial_name: Arc<str> = Arc::from(partial.name());

        match partial_scope {
            PartialScope::Isolated => {
                let mut isolated = StaticScope::new(in_scope);
                for child in partial.nodes() {
                    self.visit(child.as_ref(), &partial_name, &mut isolated)?;
                }
            }
            PartialScope::Shared | PartialScope::Inherited => {
                scope.push(in_scope);
                for child in partial.nodes() {
                    self.visit(child.as_ref(), &partial_name, scope)?;
                }
                scope.pop();
            }
        }

        Ok(())
    }

    fn visit_expression(
        &mut self,
        expr: &Expression,
        template_name: &Arc<str>,
        scope: &StaticScope,
    ) {
        if let Expression::Path(path) = expr {
            let variable = variable_from_path(path, template_name);
            let head = variable.head().to_string();
            let global = !scope.contains(&head);
            self.analysis
                .variables
                .entry(head.clone())
                .or_default()
                .push(variable.clone());
            if global {
                self.analysis.globals.entry(head).or_default().push(variable);
            }
        }

        match expr {
            Expression::Filtered(filtered) => {
                self.record_filters(&filtered.filters, template_name);
            }
            Expression::Ternary(ternary) => {
                self.record_filters(&ternary.left.filters, template_name);
                self.record_filters(&ternary.alt_filters, template_name);
                self.record_filters(&ternary.tail_filters, template_name);
            }
            _ => {}
        }

        for child in expr.children() {
            self.visit_expression(child, template_name, scope);
        }
    }

    fn record_filters(&mut self, filters: &[FilterCall], template_name: &Arc<str>) {
        for call in filters {
            self.analysis
                .filters
                .entry(call.name.clone())
                .or_default()
                .push(Location::new(template_name, call.span));
        }
    }
}

/// Converts a path token into an analysis variable.
fn variable_from_path(path: &PathToken, template_name: &Arc<str>) -> Variable {
    let segments = path
        .segments
        .iter()
        .map(|segment| match segment {
            PathSegment::Name(name) => VarSegment::Name(name.clone()),
            PathSegment::Index(index) => VarSegment::Index(*index),
            PathSegment::Sub(sub) => VarSegment::Nested(variable_from_path(sub, template_name)),
        })
        .collect();

    Variable {
        segments,
        location: Location::new(template_name, path.span),
    }
}
