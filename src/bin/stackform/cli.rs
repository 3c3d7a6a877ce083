//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Stackform - render, convert, validate, and test infrastructure templates
#[derive(Parser)]
#[command(name = "stackform")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a template's directives against a variable context
    Render(RenderArgs),

    /// Convert a template between JSON and YAML
    Convert(ConvertArgs),

    /// Validate a template and report findings
    Validate(ValidateArgs),

    /// Apply a template to the simulated backend
    Test(TestArgs),
}

/// Where the template comes from: a local file, or a git repository.
#[derive(Args)]
pub struct SourceArgs {
    /// Local template file
    pub file: Option<PathBuf>,

    /// Git repository URL (HTTPS, SSH, or org/repo shorthand)
    #[arg(long, conflicts_with = "file")]
    pub repo: Option<String>,

    /// Git ref: branch name, `tag:NAME`, or a commit hash
    #[arg(long = "git-ref", requires = "repo")]
    pub git_ref: Option<String>,

    /// Template path within the repository
    #[arg(long, requires = "repo")]
    pub path: Option<String>,

    /// Fetch timeout in seconds
    #[arg(long, requires = "repo")]
    pub timeout: Option<u64>,
}

/// Variables for the renderer.
#[derive(Args)]
pub struct ContextArgs {
    /// YAML file providing template variables
    #[arg(long)]
    pub vars_file: Option<PathBuf>,

    /// Override a single variable (`key=value`, repeatable)
    #[arg(long = "var")]
    pub vars: Vec<String>,
}

#[derive(Args)]
pub struct RenderArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Output format (json or yaml; defaults to the template's format)
    #[arg(long)]
    pub format: Option<String>,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Target format (json or yaml)
    #[arg(long)]
    pub format: String,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Validate the raw text without rendering directives first
    #[arg(long)]
    pub no_render: bool,
}

#[derive(Args)]
pub struct TestArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub context: ContextArgs,

    /// Apply the raw text without rendering directives first
    #[arg(long)]
    pub no_render: bool,

    /// Simulated account id
    #[arg(long, default_value = "123456789012")]
    pub account_id: String,

    /// Simulated region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Simulated stack name
    #[arg(long, default_value = "test-stack")]
    pub stack_name: String,
}
