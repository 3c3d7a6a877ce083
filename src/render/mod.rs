//! Template rendering - expanding directives against a variable context.
//!
//! The directive language is the jinja-flavored subset infrastructure
//! templates actually use: `{{ expression }}` substitution, `{% if %}` /
//! `{% elif %}` / `{% else %}` conditionals, and `{% for x in xs %}` loops.
//! Templates are parsed into a tagged expression tree and evaluated against
//! the context; evaluation is pure (no I/O, the context is never mutated)
//! and strict - an unresolved variable reference is a hard error naming the
//! first offender in scan order, never a silent blank.

pub mod context;
pub mod eval;
pub mod parser;

use thiserror::Error;

use crate::core::{DocFormat, Mapping, RawTemplate, RenderedDocument};

/// Fully-resolved variable context supplied by the caller.
pub type RenderContext = Mapping;

/// Failure while parsing or evaluating a template.
#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("undefined variable `{name}`")]
    UndefinedVariable { name: String },

    #[error("template syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("cannot iterate over {type_name} in `{expr}`")]
    NotIterable { expr: String, type_name: String },

    #[error("cannot substitute {type_name} value of `{name}` into text")]
    NotScalar { name: String, type_name: String },
}

/// Render a fetched template against a context.
///
/// Deterministic: identical (content, context) always yields byte-identical
/// output. The format hint is inferred from the template path.
pub fn render(
    template: &RawTemplate,
    context: &RenderContext,
) -> Result<RenderedDocument, RenderError> {
    let text = std::str::from_utf8(template.content()).map_err(|e| RenderError::Syntax {
        line: 0,
        message: format!("template is not valid UTF-8: {}", e),
    })?;

    let rendered = render_str(text, context)?;
    let format = DocFormat::from_path(template.source().path());

    Ok(RenderedDocument::new(
        template.source().clone(),
        format,
        rendered,
    ))
}

/// Render template text against a context.
pub fn render_str(text: &str, context: &RenderContext) -> Result<String, RenderError> {
    let segments = parser::parse(text)?;
    eval::evaluate(&segments, context)
}
