//! A Liquid template engine.
//!
//! Given template source text and a variable context, `brine` produces
//! rendered text. It implements the core Liquid dialect plus the
//! extended dialect's inline conditionals, lambdas and template
//! strings.
//!
//! ```
//! let template = brine::parse("Hello, {{ you }}!")?;
//! let out = template.render_json(serde_json::json!({"you": "World"}))?;
//! assert_eq!(out, "Hello, World!");
//! # Ok::<(), brine::Error>(())
//! ```
//!
//! Shared configuration (the loader, globals, registered tags and
//! filters, resource limits) lives on an [`Environment`]:
//!
//! ```
//! use brine::{DictLoader, Environment};
//!
//! let env = Environment::new()
//!     .with_loader(DictLoader::new([("header", "Hi, {{ you }}.")]));
//! let template = env.from_string("{% include 'header' %}")?;
//! assert_eq!(
//!     template.render_json(serde_json::json!({"you": "World"}))?,
//!     "Hi, World."
//! );
//! # Ok::<(), brine::Error>(())
//! ```

use std::sync::LazyLock;

pub mod analysis;
pub mod ast;
pub mod context;
pub mod environment;
pub mod error;
pub mod filters;
pub mod lexer;
pub mod loader;
pub mod output;
pub mod parser;
mod path;
pub mod stream;
pub mod tags;
pub mod template;
pub mod token;
pub mod value;

mod expression;

pub use analysis::{Location, TemplateAnalysis, VarSegment, Variable};
pub use ast::{BlockNode, ConditionalBlockNode, Node, Partial, PartialScope};
pub use context::RenderContext;
pub use environment::{Environment, UndefinedPolicy};
pub use error::{Error, Interrupt, Result};
pub use expression::{
    parse_boolean, parse_filtered, parse_identifier, parse_keyword_arguments, parse_primary,
    parse_string_or_identifier, BinaryOperator, Expression, FilterArg, FilterCall,
    FilteredExpression, Identifier, Lambda, LoopExpression, LoopOffset, TemplatePart,
    TernaryExpression,
};
pub use filters::{Filter, FilterArgs};
pub use lexer::tokenize;
pub use loader::{
    CachingLoader, ChoiceLoader, DictLoader, FileSystemLoader, Loader, TemplateSource,
};
pub use output::Output;
pub use parser::Parser;
pub use stream::{ExprStream, MarkupStream};
pub use tags::{translate::Translations, Tag};
pub use template::{Template, UpToDateFn};
pub use token::{ExprToken, Markup, PathToken, Span, TokenKind, WhitespaceControl};
pub use value::{to_liquid_string, LiquidRepr, Value, ValueMap};

/// The environment used by the [`parse`] convenience function.
static DEFAULT_ENVIRONMENT: LazyLock<Environment> = LazyLock::new(Environment::new);

/// Parses template source text using a default environment.
pub fn parse(source: &str) -> Result<Template<'static>> {
    DEFAULT_ENVIRONMENT.from_string(source)
}
