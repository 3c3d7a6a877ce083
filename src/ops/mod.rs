//! High-level operations.
//!
//! This module wires the pipeline stages together for the CLI. Each stage is
//! also independently invocable.

pub mod pipeline;

pub use pipeline::{
    fetch_template, load_local_template, normalize_document, render_template, run, run_many,
    test_template, PipelineOptions, PipelineOutcome,
};
