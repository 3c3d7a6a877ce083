//! Building a render context from a vars file and CLI overrides.

use crate::core::{Mapping, Node};

use super::{RenderContext, RenderError};

/// Load a context from YAML text (a vars file). The document must be a
/// mapping; an empty document yields an empty context.
pub fn from_yaml(text: &str) -> Result<RenderContext, RenderError> {
    if text.trim().is_empty() {
        return Ok(Mapping::new());
    }

    let node: Node = serde_yaml::from_str(text).map_err(|e| RenderError::Syntax {
        line: e.location().map(|l| l.line()).unwrap_or(0),
        message: format!("invalid vars file: {}", e),
    })?;

    match node {
        Node::Mapping(map) => Ok(map),
        Node::Null => Ok(Mapping::new()),
        other => Err(RenderError::Syntax {
            line: 1,
            message: format!("vars file must be a mapping, got {}", other.type_name()),
        }),
    }
}

/// Apply a `key=value` override. The value is parsed with YAML scalar rules,
/// so `count=3` is a number and `name=web` is a string.
pub fn apply_override(context: &mut RenderContext, spec: &str) -> Result<(), RenderError> {
    let (key, value) = spec.split_once('=').ok_or_else(|| RenderError::Syntax {
        line: 0,
        message: format!("expected `key=value` override, got `{}`", spec),
    })?;

    let node: Node = serde_yaml::from_str(value).unwrap_or_else(|_| Node::String(value.to_string()));
    context.insert(key.to_string(), node);
    Ok(())
}
