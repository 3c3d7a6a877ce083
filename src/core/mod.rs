//! Core data structures for Stackform.
//!
//! This module contains the foundational types used throughout the pipeline:
//! - Template identity (TemplateRef, RepoUrl, GitRef)
//! - Fetched and rendered documents (RawTemplate, RenderedDocument)
//! - The document tree used as the pivot for format conversion (Node)

pub mod document;
pub mod node;
pub mod template_ref;

pub use document::{DocFormat, RawTemplate, RenderedDocument};
pub use node::{Mapping, Node};
pub use template_ref::{GitRef, RepoUrl, TemplateRef};
