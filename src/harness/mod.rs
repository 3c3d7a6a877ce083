//! Simulated-backend test harness.
//!
//! Applies a rendered, validated template against an in-process stand-in for
//! the cloud provider, producing a resource graph or the first rejection a
//! real backend would report. No network, no real infrastructure, no state
//! shared between runs.

pub mod backend;
pub mod graph;

use miette::Diagnostic;
use thiserror::Error;

pub use backend::SimulatedBackend;
pub use graph::{GraphSummary, SimulatedResource, SimulatedResourceGraph};

/// Rejection from the simulated backend. Application is all-or-nothing: the
/// first failure aborts the run and no resources are created.
#[derive(Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum ApplyError {
    #[error("document root must be a mapping to apply")]
    #[diagnostic(code(stackform::harness::not_a_template))]
    NotATemplate,

    #[error("template declares no resources")]
    #[diagnostic(code(stackform::harness::no_resources))]
    NoResources,

    #[error("resource `{logical_id}` is malformed: {message}")]
    #[diagnostic(code(stackform::harness::malformed_resource))]
    MalformedResource { logical_id: String, message: String },

    #[error("resource type `{type_name}` on `{logical_id}` is not supported by the simulated backend")]
    #[diagnostic(code(stackform::harness::unsupported_type))]
    UnsupportedType {
        logical_id: String,
        type_name: String,
    },

    #[error("`{from}` references `{target}`, which is not declared in the template")]
    #[diagnostic(code(stackform::harness::dangling_reference))]
    DanglingReference { from: String, target: String },

    #[error("dependency cycle involving `{logical_id}`")]
    #[diagnostic(code(stackform::harness::cycle))]
    Cycle { logical_id: String },
}
