//! Stackform - a template resolution, normalization, and validation pipeline
//! for declarative infrastructure templates sourced from git.
//!
//! This crate provides the core library functionality for Stackform:
//! fetching templates from git repositories, rendering templating directives,
//! converting between JSON and YAML, schema/policy validation, and applying
//! templates to an in-process simulated backend for integration testing.

pub mod core;
pub mod harness;
pub mod normalize;
pub mod ops;
pub mod render;
pub mod sources;
pub mod util;
pub mod validate;

pub use crate::core::{
    document::{DocFormat, RawTemplate, RenderedDocument},
    node::{Mapping, Node},
    template_ref::{GitRef, RepoUrl, TemplateRef},
};

pub use harness::{ApplyError, SimulatedBackend, SimulatedResourceGraph};
pub use normalize::ParseError;
pub use render::{RenderContext, RenderError};
pub use sources::{FetchCache, SourceError};
pub use validate::{Finding, Severity, ValidationError};
