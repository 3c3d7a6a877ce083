//! Implementation of the template pipeline.
//!
//! Fetch, render, normalize, validate, and optionally apply to the simulated
//! backend. Stages fail fast: the first actionable error surfaces and nothing
//! downstream runs. Error-severity findings stop the pipeline before the
//! backend but never stop reporting.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::{DocFormat, GitRef, Node, RawTemplate, RenderedDocument, RepoUrl, TemplateRef};
use crate::harness::{ApplyError, GraphSummary, SimulatedBackend, SimulatedResourceGraph};
use crate::normalize;
use crate::render::{self, RenderContext, RenderError};
use crate::sources::{FetchCache, SourceError};
use crate::validate::{self, Finding, Severity};

/// Options for a full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Variables for the renderer.
    pub context: RenderContext,

    /// Skip rendering and treat the template as final text.
    pub skip_render: bool,

    /// Serialize the normalized document to this format (None = keep the
    /// format the document parsed as).
    pub target_format: Option<DocFormat>,

    /// Apply to the simulated backend after validation.
    pub run_harness: bool,

    /// Simulated account for harness runs.
    pub account_id: String,

    /// Simulated region for harness runs.
    pub region: String,

    /// Simulated stack name for harness runs.
    pub stack_name: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            context: RenderContext::new(),
            skip_render: false,
            target_format: None,
            run_harness: false,
            account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
            stack_name: "test-stack".to_string(),
        }
    }
}

/// What one pipeline run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Where the template came from.
    pub source: TemplateRef,

    /// The normalized document, serialized in the requested format.
    pub output: String,

    /// Every finding, sorted by document path.
    pub findings: Vec<Finding>,

    /// Present when the harness ran and the backend accepted the template.
    pub graph_summary: Option<GraphSummary>,
}

impl PipelineOutcome {
    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .count()
    }

    pub fn passed(&self) -> bool {
        self.error_count() == 0
    }
}

/// Resolve a template through the fetch cache.
pub fn fetch_template(
    cache: &FetchCache,
    template: &TemplateRef,
) -> Result<RawTemplate, SourceError> {
    cache.resolve(template)
}

/// Load a template from a local file, outside any repository.
pub fn load_local_template(path: &Path) -> Result<RawTemplate> {
    let content =
        fs::read(path).with_context(|| format!("failed to read template {}", path.display()))?;
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    let repo = RepoUrl::for_path(parent.unwrap_or_else(|| Path::new(".")))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let source = TemplateRef::new(repo, GitRef::DefaultBranch, name);
    Ok(RawTemplate::new(source, content))
}

/// Substitute directives against a context.
pub fn render_template(
    raw: &RawTemplate,
    context: &RenderContext,
) -> Result<RenderedDocument, RenderError> {
    render::render(raw, context)
}

/// Parse structured text into a document tree, reporting the format used.
pub fn normalize_document(
    text: &str,
    hint: Option<DocFormat>,
) -> Result<(Node, DocFormat), normalize::ParseError> {
    normalize::parse_with_format(text, hint)
}

/// Apply a validated tree to an isolated simulated backend.
pub fn test_template(
    tree: &Node,
    backend: &SimulatedBackend,
) -> Result<SimulatedResourceGraph, ApplyError> {
    backend.apply(tree)
}

/// Run the full pipeline over already-fetched template content.
pub fn run(raw: &RawTemplate, options: &PipelineOptions) -> Result<PipelineOutcome> {
    let source = raw.source().clone();
    debug!(template = %source.path(), "starting pipeline");

    let format_hint = DocFormat::from_path(source.path());
    let text = if options.skip_render {
        raw.text()?.to_string()
    } else {
        render_template(raw, &options.context)?.text().to_string()
    };

    let (tree, parsed_format) = normalize_document(&text, Some(format_hint))?;
    let findings = validate::validate(&tree);
    let error_count = findings
        .iter()
        .filter(|f| f.severity == Severity::Error)
        .count();

    let graph_summary = if options.run_harness && error_count == 0 {
        let backend = SimulatedBackend::new(&options.account_id, &options.region)
            .with_stack_name(&options.stack_name);
        let graph = test_template(&tree, &backend)?;
        info!(resources = graph.len(), "simulated apply succeeded");
        Some(graph.summary())
    } else {
        None
    };

    let output = normalize::serialize(&tree, options.target_format.unwrap_or(parsed_format));

    Ok(PipelineOutcome {
        source,
        output,
        findings,
        graph_summary,
    })
}

/// Fetch and run many templates. Stages are stateless, so templates process
/// in parallel; the fetch cache is the only shared state and it dedups
/// concurrent fetches itself.
pub fn run_many(
    cache: &FetchCache,
    templates: &[TemplateRef],
    options: &PipelineOptions,
) -> Vec<(TemplateRef, Result<PipelineOutcome>)> {
    templates
        .par_iter()
        .map(|template| {
            let outcome = fetch_template(cache, template)
                .map_err(anyhow::Error::from)
                .and_then(|raw| run(&raw, options));
            (template.clone(), outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Mapping;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_template(content: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const TEMPLATE: &str = concat!(
        "Description: {{ env }} network\n",
        "Resources:\n",
        "  Vpc:\n",
        "    Type: AWS::EC2::VPC\n",
        "    Properties:\n",
        "      CidrBlock: 10.0.0.0/16\n",
    );

    fn context() -> RenderContext {
        let mut context = Mapping::new();
        context.insert("env".to_string(), Node::String("prod".to_string()));
        context
    }

    #[test]
    fn test_run_renders_validates_and_serializes() {
        let file = write_template(TEMPLATE, ".yaml");
        let raw = load_local_template(file.path()).unwrap();

        let options = PipelineOptions {
            context: context(),
            ..Default::default()
        };
        let outcome = run(&raw, &options).unwrap();

        assert!(outcome.passed());
        assert!(outcome.output.contains("prod network"));
        assert!(outcome.graph_summary.is_none());
    }

    #[test]
    fn test_run_with_harness_reports_graph() {
        let file = write_template(TEMPLATE, ".yaml");
        let raw = load_local_template(file.path()).unwrap();

        let options = PipelineOptions {
            context: context(),
            run_harness: true,
            ..Default::default()
        };
        let outcome = run(&raw, &options).unwrap();

        let summary = outcome.graph_summary.unwrap();
        assert_eq!(summary.resource_count, 1);
    }

    #[test]
    fn test_error_findings_skip_the_harness() {
        let file = write_template("Description: no resources\n", ".yaml");
        let raw = load_local_template(file.path()).unwrap();

        let options = PipelineOptions {
            skip_render: true,
            run_harness: true,
            ..Default::default()
        };
        let outcome = run(&raw, &options).unwrap();

        assert!(!outcome.passed());
        assert!(outcome.graph_summary.is_none());
    }

    #[test]
    fn test_undefined_variable_fails_before_output() {
        let file = write_template("Description: {{ missing }}\nResources: {}\n", ".yaml");
        let raw = load_local_template(file.path()).unwrap();

        let err = run(&raw, &PipelineOptions::default()).unwrap_err();
        let render_err = err.downcast_ref::<RenderError>().unwrap();
        assert_eq!(
            *render_err,
            RenderError::UndefinedVariable {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn test_run_many_keeps_per_template_outcomes() {
        let upstream = tempfile::TempDir::new().unwrap();
        crate::sources::git::tests::fixture_repo(
            upstream.path(),
            &[
                (
                    "good.yaml",
                    "Description: a\nResources:\n  B:\n    Type: AWS::S3::Bucket\n",
                ),
                ("bad.yaml", "Description: b\n"),
            ],
        );
        let repo = RepoUrl::for_path(upstream.path()).unwrap();
        let cache = FetchCache::new().unwrap();
        let templates = vec![
            TemplateRef::new(repo.clone(), GitRef::DefaultBranch, "good.yaml"),
            TemplateRef::new(repo, GitRef::DefaultBranch, "bad.yaml"),
        ];

        let options = PipelineOptions {
            skip_render: true,
            ..Default::default()
        };
        let results = run_many(&cache, &templates, &options);
        assert_eq!(results.len(), 2);

        let outcome_for = |path: &str| {
            results
                .iter()
                .find(|(t, _)| t.path() == path)
                .map(|(_, r)| r.as_ref().unwrap())
                .unwrap()
        };
        assert!(outcome_for("good.yaml").passed());
        assert!(!outcome_for("bad.yaml").passed());
    }

    #[test]
    fn test_format_conversion_to_json() {
        let file = write_template(TEMPLATE, ".yaml");
        let raw = load_local_template(file.path()).unwrap();

        let options = PipelineOptions {
            context: context(),
            target_format: Some(DocFormat::Json),
            ..Default::default()
        };
        let outcome = run(&raw, &options).unwrap();
        assert!(outcome.output.trim_start().starts_with('{'));
        assert!(outcome.output.contains("\"AWS::EC2::VPC\""));
    }
}
