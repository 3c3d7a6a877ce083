//! Format normalization - JSON/YAML to the document tree and back.
//!
//! Both formats pivot through `Node`, which preserves key order and scalar
//! typing, so one full round trip (`parse` then `serialize`) reproduces the
//! document structure exactly and converting twice between the same two
//! formats is stable after the first conversion.

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::core::{DocFormat, Node};

/// Malformed structured text, annotated with its location.
#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("malformed {format} at line {line}, column {column}: {message}")]
    #[diagnostic(code(stackform::normalize::parse))]
    Malformed {
        format: DocFormat,
        line: usize,
        column: usize,
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("parse error here")]
        span: Option<SourceSpan>,
    },

    #[error("document root must be a mapping, got {type_name}")]
    #[diagnostic(code(stackform::normalize::not_a_mapping))]
    NotAMapping { type_name: String },
}

impl ParseError {
    pub fn line(&self) -> usize {
        match self {
            ParseError::Malformed { line, .. } => *line,
            ParseError::NotAMapping { .. } => 0,
        }
    }
}

/// Parse structured text into a document tree.
///
/// With a `Json` or `Yaml` hint only that grammar is tried. Without a hint
/// (or with `Unknown`), strict JSON is attempted first - it is the cheaper
/// grammar to disambiguate - falling back to YAML.
pub fn parse(text: &str, hint: Option<DocFormat>) -> Result<Node, ParseError> {
    parse_with_format(text, hint).map(|(node, _)| node)
}

/// Like `parse`, also reporting which format actually parsed.
pub fn parse_with_format(
    text: &str,
    hint: Option<DocFormat>,
) -> Result<(Node, DocFormat), ParseError> {
    match hint {
        Some(DocFormat::Json) => parse_json(text).map(|n| (n, DocFormat::Json)),
        Some(DocFormat::Yaml) => parse_yaml(text).map(|n| (n, DocFormat::Yaml)),
        Some(DocFormat::Unknown) | None => {
            if let Ok(node) = parse_json(text) {
                return Ok((node, DocFormat::Json));
            }
            parse_yaml(text).map(|n| (n, DocFormat::Yaml))
        }
    }
}

/// Parse and require a mapping at the document root (the shape every
/// pipeline stage past the normalizer expects).
pub fn parse_document(text: &str, hint: Option<DocFormat>) -> Result<Node, ParseError> {
    let node = parse(text, hint)?;
    if node.as_mapping().is_none() {
        return Err(ParseError::NotAMapping {
            type_name: node.type_name().to_string(),
        });
    }
    Ok(node)
}

fn parse_json(text: &str) -> Result<Node, ParseError> {
    serde_json::from_str(text).map_err(|e| {
        let (line, column) = (e.line(), e.column());
        ParseError::Malformed {
            format: DocFormat::Json,
            line,
            column,
            message: e.to_string(),
            src: NamedSource::new("document.json", text.to_string()),
            span: offset_of(text, line, column).map(SourceSpan::from),
        }
    })
}

fn parse_yaml(text: &str) -> Result<Node, ParseError> {
    serde_yaml::from_str(text).map_err(|e| {
        let location = e.location();
        let line = location.as_ref().map(|l| l.line()).unwrap_or(0);
        let column = location.as_ref().map(|l| l.column()).unwrap_or(0);
        ParseError::Malformed {
            format: DocFormat::Yaml,
            line,
            column,
            message: e.to_string(),
            src: NamedSource::new("document.yaml", text.to_string()),
            span: location.map(|l| SourceSpan::from(l.index())),
        }
    })
}

/// Serialize a tree produced by `parse`. Closed world: this cannot fail for
/// such trees (string keys, finite depth), hence the infallible signature.
pub fn serialize(node: &Node, format: DocFormat) -> String {
    match format {
        DocFormat::Json => {
            let mut out = serde_json::to_string_pretty(node)
                .expect("JSON serialization of a parsed tree cannot fail");
            out.push('\n');
            out
        }
        DocFormat::Yaml | DocFormat::Unknown => serde_yaml::to_string(node)
            .expect("YAML serialization of a parsed tree cannot fail"),
    }
}

/// Byte offset of a 1-based (line, column) position.
fn offset_of(text: &str, line: usize, column: usize) -> Option<usize> {
    if line == 0 {
        return None;
    }
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line - 1)
        .map(str::len)
        .sum();
    Some((line_start + column.saturating_sub(1)).min(text.len()))
}
