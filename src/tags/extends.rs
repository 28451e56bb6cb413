//! Template inheritance: the `extends` and `block` tags.
//!
//! `{% extends 'parent' %}` takes ownership of the rest of its template,
//! registers every `{% block %}` it contains as an override fragment,
//! then renders the parent in its place. When the base template's
//! `block` nodes finally render, they pick the most-derived fragment for
//! their name; `block.super` holds the next fragment in the chain.

use crate::{
    ast::{BlockNode, Node},
    context::RenderContext,
    error::{Error, Result},
    expression::{self, Expression, Identifier},
    output::Output,
    parser::Parser,
    stream::{ExprStream, MarkupStream},
    tags::Tag,
    token::{Markup, Span, TokenKind},
    value::{Value, ValueMap},
};
use futures::future::BoxFuture;
use std::sync::Arc;

/// One entry in a block override chain.
#[derive(Clone, Debug)]
pub struct BlockFragment {
    /// The overriding block body.
    pub block: Arc<BlockNode>,
    /// Whether the block demands an override of its own.
    pub required: bool,
    /// The template the fragment was defined in.
    pub template_name: Arc<str>,
}

/// An `{% extends 'name' %}` node. Owns the remainder of its template.
#[derive(Debug)]
pub struct ExtendsNode {
    /// The source range of the tag.
    pub span: Span,
    /// The parent template's name.
    pub name: Expression,
    /// Everything after the tag in the source template.
    pub nodes: Vec<Box<dyn Node>>,
}

/// Walks `nodes` collecting block fragments into the context's chains.
fn stack_blocks(nodes: &[&dyn Node], ctx: &mut RenderContext<'_>, template_name: &Arc<str>) {
    for node in nodes {
        if let Some((name, required, block)) = node.block_fragment() {
            ctx.block_chains
                .entry(name.name.clone())
                .or_default()
                .push(BlockFragment {
                    block,
                    required,
                    template_name: Arc::clone(template_name),
                });
        }
        stack_blocks(&node.children(), ctx, template_name);
    }
}

impl ExtendsNode {
    fn prepare<'env>(
        &self,
        ctx: &mut RenderContext<'env>,
    ) -> Result<crate::template::Template<'env>> {
        let name =
            crate::value::to_liquid_string(&self.name.evaluate(ctx)?, false);

        if !ctx.extended.insert(name.clone()) {
            return Err(Error::TemplateInheritance {
                message: format!("circular extends '{name}'"),
                span: self.span,
            });
        }

        let children: Vec<&dyn Node> = self.nodes.iter().map(AsRef::as_ref).collect();
        let template_name = ctx.template_name().clone();
        stack_blocks(&children, ctx, &template_name);

        ctx.env().get_template_from(&name, Some(&*ctx))
    }
}

impl Node for ExtendsNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("extends")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let template = self.prepare(ctx)?;
        let saved = ctx.enter_template(Arc::from(template.name()), template.matter.clone());
        let result = template.render_with_context(ctx, out);
        ctx.restore_template(saved);
        result.map_err(|err| err.in_partial(template.name()))
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let template = self.prepare(ctx)?;
            let saved = ctx.enter_template(Arc::from(template.name()), template.matter.clone());
            let result = template.render_with_context_async(ctx, out).await;
            ctx.restore_template(saved);
            result.map_err(|err| err.in_partial(template.name()))
        })
    }

    fn children(&self) -> Vec<&dyn Node> {
        self.nodes.iter().map(AsRef::as_ref).collect()
    }

    fn expressions(&self) -> Vec<&Expression> {
        vec![&self.name]
    }

    fn partial_scope(&self) -> Option<crate::ast::Partial<'_>> {
        Some(crate::ast::Partial {
            name: &self.name,
            scope: crate::ast::PartialScope::Inherited,
            in_scope: Vec::new(),
        })
    }
}

/// The standard `extends` tag.
#[derive(Debug)]
pub struct ExtendsTag;

impl Tag for ExtendsTag {
    fn block(&self) -> bool {
        true
    }

    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let Markup::Tag {
            span, expression, ..
        } = stream.next()
        else {
            return Err(Error::syntax("expected a tag", Span::default()));
        };

        let mut tokens = ExprStream::new(expression, span);
        let name = expression::parse_primary(&mut tokens)?;
        tokens.expect_eos()?;

        // The rest of the template belongs to the inheritance pass.
        let nodes = parser.parse_block(stream, &[])?;

        Ok(Box::new(ExtendsNode { span, name, nodes }))
    }
}

/// A `{% block name %}` node.
#[derive(Debug)]
pub struct InheritBlockNode {
    /// The source range of the opening tag.
    pub span: Span,
    /// The block's name.
    pub name: Identifier,
    /// Whether a more-derived template must override this block.
    pub required: bool,
    /// The block's own body, the end of every override chain.
    pub block: Arc<BlockNode>,
}

impl InheritBlockNode {
    /// Renders position `index` of the override chain, where the chain
    /// is the registered fragments followed by this node's own body.
    /// `block.super` is the eagerly rendered next position.
    fn render_chain(
        &self,
        fragments: &[BlockFragment],
        index: usize,
        ctx: &mut RenderContext<'_>,
        out: &mut Output,
    ) -> Result<usize> {
        let body: &BlockNode = fragments
            .get(index)
            .map(|fragment| fragment.block.as_ref())
            .unwrap_or(self.block.as_ref());

        let super_text = if index < fragments.len() {
            let mut buf = Output::new(out.limit().map(|limit| limit.saturating_sub(out.len())));
            self.render_chain(fragments, index + 1, ctx, &mut buf)?;
            buf.into_string()
        } else {
            String::new()
        };

        let mut block_object = ValueMap::new();
        block_object.insert("super".to_string(), Value::markup(super_text));
        block_object.insert("name".to_string(), Value::string(&self.name.name));
        let mut namespace = ValueMap::new();
        namespace.insert("block".to_string(), Value::object(block_object));

        ctx.push_scope(namespace, self.span)?;
        let result = body.render(ctx, out);
        ctx.pop_scope();
        result
    }
}

impl Node for InheritBlockNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("block")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let fragments = ctx
            .block_chains
            .get(&self.name.name)
            .cloned()
            .unwrap_or_default();

        match fragments.first() {
            None if self.required => Err(Error::TemplateInheritance {
                message: format!("block '{}' must be overridden", self.name.name),
                span: self.span,
            }),
            Some(fragment) if fragment.required => Err(Error::TemplateInheritance {
                message: format!("block '{}' must be overridden", self.name.name),
                span: self.span,
            }),
            _ => self.render_chain(&fragments, 0, ctx, out),
        }
    }

    fn children(&self) -> Vec<&dyn Node> {
        vec![self.block.as_ref()]
    }

    fn block_scope(&self) -> Vec<Identifier> {
        vec![Identifier {
            name: "block".to_string(),
            span: self.span,
        }]
    }

    fn block_fragment(&self) -> Option<(Identifier, bool, Arc<BlockNode>)> {
        Some((self.name.clone(), self.required, Arc::clone(&self.block)))
    }
}

/// The standard `block` tag.
#[derive(Debug)]
pub struct BlockTag;

impl Tag for BlockTag {
    fn block(&self) -> bool {
        true
    }

    fn end_block(&self) -> &'static [&'static str] {
        &["endblock"]
    }

    fn parse(&self, stream: &mut MarkupStream, parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let Markup::Tag {
            span, expression, ..
        } = stream.next()
        else {
            return Err(Error::syntax("expected a tag", Span::default()));
        };

        let mut tokens = ExprStream::new(expression, span);
        let name = expression::parse_string_or_identifier(tokens.next())?;

        let mut required = false;
        if tokens.is_kind(TokenKind::Required) {
            tokens.next();
            required = true;
        }
        tokens.expect_eos()?;

        let nodes = parser.parse_block(stream, self.end_block())?;

        // A trailing name on `endblock` must match the opening tag.
        if stream.current().is_tag("endblock") {
            if let Markup::Tag { expression, .. } = stream.current() {
                if let Some(token) = expression.first() {
                    if !token.is_word(&name.name) {
                        return Err(Error::TemplateInheritance {
                            message: format!(
                                "expected 'endblock {}', found 'endblock {token}'",
                                name.name
                            ),
                            span: token.span(),
                        });
                    }
                }
            }
        }

        Ok(Box::new(InheritBlockNode {
            span,
            name,
            required,
            block: Arc::new(BlockNode { span, nodes }),
        }))
    }
}
