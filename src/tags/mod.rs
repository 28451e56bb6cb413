//! Built-in tag parsers and their nodes.

use crate::{ast::Node, environment::Environment, error::Result, parser::Parser,
    stream::MarkupStream};
use core::fmt;
use std::sync::Arc;

pub mod assign;
pub mod capture;
pub mod case;
pub mod content;
pub mod counters;
pub mod cycle;
pub mod echo;
pub mod extends;
pub mod for_tag;
pub mod if_tag;
pub mod include;
pub mod liquid_tag;
pub mod macro_tag;
pub mod render;
pub mod tablerow;
pub mod translate;
pub mod unless;
pub mod with;

/// A tag parser: turns the markup at the head of the stream into a node.
pub trait Tag: Send + Sync + fmt::Debug {
    /// Whether this tag opens a block that runs to a closing tag.
    fn block(&self) -> bool {
        false
    }

    /// The tag names that may close or continue this tag's block.
    fn end_block(&self) -> &'static [&'static str] {
        &[]
    }

    /// Parses the tag at the head of `stream` into a node.
    ///
    /// Implementations leave the final markup of their construct as the
    /// stream's current token; the caller advances past it.
    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>>;
}

/// Registers the standard tag set with an environment.
pub fn register_standard_tags(env: &mut Environment) {
    env.add_tag("assign", Arc::new(assign::AssignTag));
    env.add_tag("capture", Arc::new(capture::CaptureTag));
    env.add_tag("case", Arc::new(case::CaseTag));
    env.add_tag("increment", Arc::new(counters::IncrementTag));
    env.add_tag("decrement", Arc::new(counters::DecrementTag));
    env.add_tag("cycle", Arc::new(cycle::CycleTag));
    env.add_tag("echo", Arc::new(echo::EchoTag));
    env.add_tag("extends", Arc::new(extends::ExtendsTag));
    env.add_tag("block", Arc::new(extends::BlockTag));
    env.add_tag("for", Arc::new(for_tag::ForTag));
    env.add_tag("break", Arc::new(for_tag::BreakTag));
    env.add_tag("continue", Arc::new(for_tag::ContinueTag));
    env.add_tag("if", Arc::new(if_tag::IfTag));
    env.add_tag("unless", Arc::new(unless::UnlessTag));
    env.add_tag("include", Arc::new(include::IncludeTag));
    env.add_tag("render", Arc::new(render::RenderTag));
    env.add_tag("macro", Arc::new(macro_tag::MacroTag));
    env.add_tag("call", Arc::new(macro_tag::CallTag));
    env.add_tag("tablerow", Arc::new(tablerow::TablerowTag));
    env.add_tag("translate", Arc::new(translate::TranslateTag));
    env.add_tag("with", Arc::new(with::WithTag));
}
