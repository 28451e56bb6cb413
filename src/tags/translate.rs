//! The `translate` tag: message lookup with variable substitution.
//!
//! The singular block (and the optional `{% plural %}` block) may
//! contain only literal text and simple variable placeholders. The
//! blocks are captured as message source text at parse time; at render
//! time the looked-up message is parsed and rendered with the tag's
//! keyword arguments in scope.

use crate::{
    ast::Node,
    context::RenderContext,
    error::{Error, Result},
    expression::{self, Expression, Identifier},
    output::Output,
    parser::Parser,
    stream::{ExprStream, MarkupStream},
    tags::Tag,
    token::{ExprToken, Markup, Span},
    value::{to_liquid_string, Number, Value, ValueMap},
};
use core::fmt;
use futures::future::BoxFuture;
use regex::Regex;
use std::sync::LazyLock;

/// A message catalog consulted by the `translate` tag.
///
/// The default implementations mirror a null catalog: message ids pass
/// through untranslated and the plural form is chosen by count.
pub trait Translations: Send + Sync + fmt::Debug {
    /// Looks up a singular message.
    fn gettext(&self, msgid: &str) -> String {
        msgid.to_string()
    }

    /// Looks up a message with plural forms.
    fn ngettext(&self, singular: &str, plural: &str, n: i64) -> String {
        if n == 1 {
            singular.to_string()
        } else {
            plural.to_string()
        }
    }

    /// Looks up a singular message within a message context.
    fn pgettext(&self, _context: &str, msgid: &str) -> String {
        self.gettext(msgid)
    }

    /// Looks up a message with plural forms within a message context.
    fn npgettext(&self, _context: &str, singular: &str, plural: &str, n: i64) -> String {
        self.ngettext(singular, plural, n)
    }
}

/// The catalog used when no translations are configured.
#[derive(Debug)]
pub struct NullTranslations;

impl Translations for NullTranslations {}

static MESSAGE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\n\s*").unwrap());

/// A `{% translate %}` node.
#[derive(Debug)]
pub struct TranslateNode {
    /// The source range of the opening tag.
    pub span: Span,
    /// Keyword arguments: substitution variables plus the reserved
    /// `count` and `context` keys.
    pub args: Vec<(Identifier, Expression)>,
    /// The singular message source.
    pub singular: String,
    /// The plural message source, if a `{% plural %}` block was given.
    pub plural: Option<String>,
}

impl TranslateNode {
    fn message_text(
        &self,
        ctx: &mut RenderContext<'_>,
        namespace: &mut ValueMap,
    ) -> Result<String> {
        let count = namespace
            .get("count")
            .and_then(Value::to_number)
            .map_or(1, |number| match number {
                Number::Int(value) => value,
                Number::Float(value) => value as i64,
            });

        // The message context is consumed, not exposed to substitution.
        let message_context = namespace
            .shift_remove("context")
            .map(|value| to_liquid_string(&value, false));

        let translations = ctx.env().translations();

        let text = match (&self.plural, message_context) {
            (Some(plural), Some(message_context)) => {
                translations.npgettext(&message_context, &self.singular, plural, count)
            }
            (Some(plural), None) => translations.ngettext(&self.singular, plural, count),
            (None, Some(message_context)) => {
                translations.pgettext(&message_context, &self.singular)
            }
            (None, None) => translations.gettext(&self.singular),
        };
        Ok(text)
    }

    fn evaluate_args(&self, ctx: &mut RenderContext<'_>) -> Result<ValueMap> {
        let mut namespace = ValueMap::new();
        for (name, value) in &self.args {
            namespace.insert(name.name.clone(), value.evaluate(ctx)?);
        }
        Ok(namespace)
    }
}

impl Node for TranslateNode {
    fn span(&self) -> Span {
        self.span
    }

    fn tag_name(&self) -> Option<&str> {
        Some("translate")
    }

    fn render_to_output(&self, ctx: &mut RenderContext<'_>, out: &mut Output) -> Result<usize> {
        let mut namespace = self.evaluate_args(ctx)?;
        let text = self.message_text(ctx, &mut namespace)?;

        let template_name = ctx.template_name().clone();
        let template = ctx.env().from_string_named(&text, &template_name)?;

        ctx.push_scope(namespace, self.span)?;
        let result = template.render_with_context(ctx, out);
        ctx.pop_scope();
        result
    }

    fn render_to_output_async<'a, 'env: 'a>(
        &'a self,
        ctx: &'a mut RenderContext<'env>,
        out: &'a mut Output,
    ) -> BoxFuture<'a, Result<usize>> {
        Box::pin(async move {
            let mut namespace = self.evaluate_args(ctx)?;
            let text = self.message_text(ctx, &mut namespace)?;

            let template_name = ctx.template_name().clone();
            let template = ctx.env().from_string_named(&text, &template_name)?;

            ctx.push_scope(namespace, self.span)?;
            let result = template.render_with_context_async(ctx, out).await;
            ctx.pop_scope();
            result
        })
    }

    fn expressions(&self) -> Vec<&Expression> {
        self.args.iter().map(|(_, value)| value).collect()
    }
}

/// The `translate` tag.
#[derive(Debug)]
pub struct TranslateTag;

impl Tag for TranslateTag {
    fn block(&self) -> bool {
        true
    }

    fn end_block(&self) -> &'static [&'static str] {
        &["endtranslate", "plural"]
    }

    fn parse(&self, stream: &mut MarkupStream, _parser: &Parser<'_>) -> Result<Box<dyn Node>> {
        let Markup::Tag {
            span, expression, ..
        } = stream.next()
        else {
            return Err(Error::syntax("expected a tag", Span::default()));
        };

        let args = if expression.is_empty() {
            Vec::new()
        } else {
            let mut tokens = ExprStream::new(expression, span);
            expression::parse_keyword_arguments(&mut tokens)?
        };

        let singular = collect_message(stream, &["endtranslate", "plural"])?;

        let plural = if stream.current().is_tag("plural") {
            stream.next();
            Some(collect_message(stream, &["endtranslate"])?)
        } else {
            None
        };

        stream.expect_tag("endtranslate")?;

        Ok(Box::new(TranslateNode {
            span,
            args,
            singular,
            plural,
        }))
    }
}

/// Collects a message block as source text, allowing only literal
/// content, comments and bare variable placeholders.
fn collect_message(stream: &mut MarkupStream, end: &[&str]) -> Result<String> {
    let mut message = String::new();

    loop {
        match stream.current() {
            Markup::Content { text, .. } => {
                message.push_str(text);
                stream.next();
            }
            Markup::Comment { .. } => {
                stream.next();
            }
            Markup::Output {
                expression, span, ..
            } => {
                match expression.as_slice() {
                    [token] if placeholder_name(token).is_some() => {
                        message.push_str("{{ ");
                        message.push_str(&placeholder_name(token).unwrap_or_default());
                        message.push_str(" }}");
                    }
                    _ => {
                        return Err(Error::TranslationSyntax {
                            message: "expected a translation variable".to_string(),
                            span: *span,
                        })
                    }
                }
                stream.next();
            }
            Markup::Tag { name, span, .. } => {
                if end.contains(&name.as_str()) {
                    break;
                }
                return Err(Error::TranslationSyntax {
                    message: format!("unexpected tag '{name}' in a translation message"),
                    span: *span,
                });
            }
            Markup::Eoi { span } => {
                return Err(Error::TranslationSyntax {
                    message: "missing '{% endtranslate %}'".to_string(),
                    span: *span,
                })
            }
            other => {
                return Err(Error::TranslationSyntax {
                    message: "unexpected markup in a translation message".to_string(),
                    span: other.span(),
                })
            }
        }
    }

    Ok(MESSAGE_WHITESPACE
        .replace_all(message.trim(), " ")
        .into_owned())
}

/// The substitution name of a bare variable placeholder, if the token
/// is one.
fn placeholder_name(token: &ExprToken) -> Option<String> {
    match token {
        ExprToken::Token(atom) if atom.kind == crate::token::TokenKind::Word => {
            Some(atom.value.clone())
        }
        ExprToken::Path(path) if path.segments.len() == 1 => Some(path.head().to_string()),
        _ => None,
    }
}
