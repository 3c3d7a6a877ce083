//! Fetched and rendered template documents.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::template_ref::TemplateRef;

/// Structured-text format of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    Json,
    Yaml,
    Unknown,
}

impl DocFormat {
    /// Guess the format from a template path extension.
    pub fn from_path(path: &str) -> Self {
        let lower = path.to_lowercase();
        if lower.ends_with(".json") {
            DocFormat::Json
        } else if lower.ends_with(".yaml") || lower.ends_with(".yml") {
            DocFormat::Yaml
        } else {
            DocFormat::Unknown
        }
    }
}

impl fmt::Display for DocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocFormat::Json => write!(f, "json"),
            DocFormat::Yaml => write!(f, "yaml"),
            DocFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// Template bytes as fetched from a repository, before rendering.
#[derive(Debug, Clone)]
pub struct RawTemplate {
    source: TemplateRef,
    content: Vec<u8>,
    fetched_at: SystemTime,
}

impl RawTemplate {
    pub fn new(source: TemplateRef, content: Vec<u8>) -> Self {
        RawTemplate {
            source,
            content,
            fetched_at: SystemTime::now(),
        }
    }

    pub fn source(&self) -> &TemplateRef {
        &self.source
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn fetched_at(&self) -> SystemTime {
        self.fetched_at
    }

    /// Template content as UTF-8 text.
    pub fn text(&self) -> anyhow::Result<&str> {
        std::str::from_utf8(&self.content)
            .map_err(|e| anyhow::anyhow!("template {} is not valid UTF-8: {}", self.source, e))
    }
}

/// The concrete document produced by rendering a template.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    source: TemplateRef,
    format: DocFormat,
    text: String,
}

impl RenderedDocument {
    pub fn new(source: TemplateRef, format: DocFormat, text: String) -> Self {
        RenderedDocument {
            source,
            format,
            text,
        }
    }

    pub fn source(&self) -> &TemplateRef {
        &self.source
    }

    pub fn format(&self) -> DocFormat {
        self.format
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}
