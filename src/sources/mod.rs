//! Template source resolution - fetching template bytes from git.
//!
//! A `TemplateRef` goes in, a `RawTemplate` comes out. All network work is
//! funneled through the `FetchCache`, which dedups concurrent fetches of the
//! same (repository, ref) pair and owns the process-scoped scratch directory.

pub mod cache;
pub mod git;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::{GitRef, RepoUrl};

pub use cache::FetchCache;
pub use git::GitFetcher;

/// Failure to resolve a template source. Every variant is a flavor of
/// "source not found" - unreachable repository, unresolvable ref, missing
/// path, or a fetch that ran past its deadline.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("repository unreachable: {repo}: {reason}")]
    Unreachable { repo: String, reason: String },

    #[error("cannot resolve {reference} in {repo}: {reason}")]
    RefNotFound {
        repo: String,
        reference: String,
        reason: String,
    },

    #[error("template path `{path}` not found in {repo} at {reference}")]
    PathNotFound {
        repo: String,
        reference: String,
        path: String,
    },

    #[error("fetch of {repo} timed out after {seconds}s")]
    Timeout { repo: String, seconds: u64 },
}

/// A repository checked out at a resolved commit.
#[derive(Debug, Clone)]
pub struct Checkout {
    /// Working tree location inside the scratch directory.
    pub path: PathBuf,
    /// Resolved commit hash.
    pub commit: String,
}

/// Abstraction over the transport that materializes a repository checkout.
///
/// The production implementation is `GitFetcher`; tests substitute counting
/// fetchers to observe cache behavior without touching git.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        repo: &RepoUrl,
        reference: &GitRef,
        dest: &Path,
    ) -> Result<Checkout, SourceError>;
}
