//! Template engine error types.

use crate::token::Span;
use core::fmt;

/// A convenience alias for results produced by the engine.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A template parsing or rendering error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The template source is malformed.
    #[error("syntax error: {message}")]
    Syntax {
        /// A description of the problem.
        message: String,
        /// The offending source range.
        span: Span,
    },

    /// A filter name did not resolve to a registered filter.
    #[error("unknown filter '{name}'")]
    UnknownFilter {
        /// The unresolved filter name.
        name: String,
        /// The source range of the filter call.
        span: Span,
    },

    /// A variable path failed to resolve under the strict undefined policy.
    #[error("'{name}' is undefined")]
    Undefined {
        /// The head name of the unresolved path.
        name: String,
        /// The source range of the path.
        span: Span,
    },

    /// A loader could not supply a template source.
    #[error("template not found: '{name}'")]
    TemplateNotFound {
        /// The requested template name.
        name: String,
    },

    /// A tag in the active disabled set was about to render.
    #[error("'{name}' usage is not allowed in this context")]
    DisabledTag {
        /// The disabled tag name.
        name: String,
        /// The source range of the tag.
        span: Span,
    },

    /// Too many nested render frames.
    #[error("maximum context depth reached, possible recursive partial")]
    ContextDepth {
        /// The source range of the frame-opening construct.
        span: Span,
    },

    /// The cumulative loop iteration budget was exhausted.
    #[error("loop iteration limit reached")]
    LoopIterationLimit {
        /// The source range of the loop.
        span: Span,
    },

    /// The local namespace grew past its configured size budget.
    #[error("local namespace limit reached")]
    LocalNamespaceLimit {
        /// The source range of the assignment.
        span: Span,
    },

    /// More bytes were written than the output stream allows.
    #[error("output stream limit reached")]
    OutputStreamLimit,

    /// A `translate` block contains markup that can not be extracted as a
    /// message.
    #[error("translation syntax error: {message}")]
    TranslationSyntax {
        /// A description of the problem.
        message: String,
        /// The offending source range.
        span: Span,
    },

    /// A template inheritance chain is malformed.
    #[error("template inheritance error: {message}")]
    TemplateInheritance {
        /// A description of the problem.
        message: String,
        /// The offending source range.
        span: Span,
    },

    /// An operator or filter received a value of an unsupported type.
    #[error("type error: {message}")]
    Type {
        /// A description of the problem.
        message: String,
        /// The source range of the expression.
        span: Span,
    },

    /// A sequence index is out of range or not an integer.
    #[error("index error: {message}")]
    Index {
        /// A description of the problem.
        message: String,
        /// The source range of the expression.
        span: Span,
    },

    /// A name is not valid where it appears.
    #[error("name error: {message}")]
    Name {
        /// A description of the problem.
        message: String,
        /// The source range of the name.
        span: Span,
    },

    /// An error raised inside a partial template, tagged with the partial's
    /// name so the host can map the span to the right source.
    #[error("in partial '{name}': {source}")]
    Partial {
        /// The partial template's name.
        name: String,
        /// The underlying error, with its original span.
        source: Box<Error>,
    },

    /// A filesystem loader failed to read a source file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Loop control flow reached the top of a render without an enclosing
    /// loop to intercept it.
    #[error("unexpected '{0}' outside of a loop")]
    Interrupt(Interrupt),
}

impl Error {
    /// Creates a new syntax error.
    pub(crate) fn syntax(message: impl Into<String>, span: Span) -> Self {
        Error::Syntax {
            message: message.into(),
            span,
        }
    }

    /// Wraps an error that crossed a partial template boundary.
    ///
    /// Interrupts pass through untouched so `break` can cross an `include`
    /// boundary, and errors already tagged with a partial name keep the
    /// innermost tag.
    pub(crate) fn in_partial(self, name: &str) -> Self {
        match self {
            err @ (Error::Interrupt(_) | Error::Partial { .. }) => err,
            err => Error::Partial {
                name: name.to_string(),
                source: Box::new(err),
            },
        }
    }
}

/// Loop control flow signals raised by `break` and `continue`.
///
/// These are intercepted by the enclosing loop and never escape a
/// successful render.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Interrupt {
    /// Stop iterating the innermost loop.
    Break,
    /// Skip to the next iteration of the innermost loop.
    Continue,
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Interrupt::Break => "break",
            Interrupt::Continue => "continue",
        })
    }
}
