//! Command implementations.

pub mod convert;
pub mod render;
pub mod validate;

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use stackform::core::{DocFormat, GitRef, RawTemplate, RepoUrl, TemplateRef};
use stackform::ops::load_local_template;
use stackform::render::{context, RenderContext};
use stackform::sources::FetchCache;
use stackform::validate::Finding;

use crate::cli::{ContextArgs, SourceArgs};

/// Load the template from whichever source the user named.
pub(crate) fn load(source: &SourceArgs) -> Result<RawTemplate> {
    if let Some(file) = &source.file {
        return load_local_template(file);
    }

    let repo_spec = source
        .repo
        .as_deref()
        .context("provide a template file or --repo")?;
    let path = source
        .path
        .as_deref()
        .context("--path is required with --repo")?;

    let repo = RepoUrl::parse(repo_spec)?;
    let reference = source
        .git_ref
        .as_deref()
        .map(GitRef::parse)
        .unwrap_or(GitRef::DefaultBranch);
    let template = TemplateRef::new(repo, reference, path);

    let cache = match source.timeout {
        Some(seconds) => FetchCache::with_timeout(Duration::from_secs(seconds))?,
        None => FetchCache::new()?,
    };
    Ok(cache.resolve(&template)?)
}

/// Assemble the render context from the vars file and `--var` overrides,
/// overrides winning.
pub(crate) fn build_context(args: &ContextArgs) -> Result<RenderContext> {
    let mut ctx = match &args.vars_file {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read vars file {}", path.display()))?;
            context::from_yaml(&text)?
        }
        None => RenderContext::new(),
    };
    for var in &args.vars {
        context::apply_override(&mut ctx, var)?;
    }
    Ok(ctx)
}

pub(crate) fn parse_format(s: &str) -> Result<DocFormat> {
    match s.to_ascii_lowercase().as_str() {
        "json" => Ok(DocFormat::Json),
        "yaml" | "yml" => Ok(DocFormat::Yaml),
        other => bail!("unknown format `{}` (expected json or yaml)", other),
    }
}

pub(crate) fn write_output(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => print!("{}", text),
    }
    Ok(())
}

pub(crate) fn print_findings(findings: &[Finding]) {
    for finding in findings {
        eprintln!("{}", finding);
    }
}
