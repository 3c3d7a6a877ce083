//! Git transport - clone, fetch, and checkout by ref.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use git2::build::RepoBuilder;
use git2::{FetchOptions, RemoteCallbacks, Repository, ResetType};

use crate::core::{GitRef, RepoUrl};
use crate::sources::{Checkout, Fetcher, SourceError};

/// Fetches repositories with libgit2.
///
/// An optional deadline bounds the fetch; on expiry it is aborted from the
/// sideband- and transfer-progress callbacks and surfaced as
/// `SourceError::Timeout`. The deadline covers ref negotiation and object
/// transfer; a server that stalls before sending anything at all is only
/// caught by the transport's own connect timeout.
pub struct GitFetcher {
    timeout: Option<Duration>,
}

impl GitFetcher {
    pub fn new() -> Self {
        GitFetcher { timeout: None }
    }

    /// Bound every network operation by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        GitFetcher {
            timeout: Some(timeout),
        }
    }

    fn fetch_options(&self, expired: Arc<AtomicBool>) -> FetchOptions<'static> {
        let mut callbacks = RemoteCallbacks::new();
        if let Some(timeout) = self.timeout {
            let deadline = Instant::now() + timeout;
            let transfer_expired = expired.clone();
            callbacks.transfer_progress(move |_| {
                if Instant::now() >= deadline {
                    transfer_expired.store(true, Ordering::Relaxed);
                    false
                } else {
                    true
                }
            });
            // Sideband lines arrive during negotiation, before any transfer
            // progress fires, so check the deadline there as well.
            callbacks.sideband_progress(move |_| {
                if Instant::now() >= deadline {
                    expired.store(true, Ordering::Relaxed);
                    false
                } else {
                    true
                }
            });
        }
        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);
        options
    }

    fn clone_or_update(
        &self,
        repo_url: &RepoUrl,
        dest: &Path,
    ) -> Result<Repository, SourceError> {
        let expired = Arc::new(AtomicBool::new(false));

        let result = if dest.join(".git").exists() {
            tracing::info!("updating {}", repo_url);
            Repository::open(dest)
                .and_then(|repo| {
                    {
                        let mut remote = repo.find_remote("origin")?;
                        remote.fetch(
                            &["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"],
                            Some(&mut self.fetch_options(expired.clone())),
                            None,
                        )?;
                    }
                    Ok(repo)
                })
        } else {
            tracing::info!("cloning {}", repo_url);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| SourceError::Unreachable {
                    repo: repo_url.to_string(),
                    reason: e.to_string(),
                })?;
            }
            RepoBuilder::new()
                .fetch_options(self.fetch_options(expired.clone()))
                .clone(repo_url.fetch_url(), dest)
        };

        result.map_err(|e| {
            if expired.load(Ordering::Relaxed) {
                SourceError::Timeout {
                    repo: repo_url.to_string(),
                    seconds: self.timeout.map(|t| t.as_secs()).unwrap_or(0),
                }
            } else {
                SourceError::Unreachable {
                    repo: repo_url.to_string(),
                    reason: e.message().to_string(),
                }
            }
        })
    }

    fn resolve_commit<'r>(
        repo: &'r Repository,
        repo_url: &RepoUrl,
        reference: &GitRef,
    ) -> Result<git2::Commit<'r>, SourceError> {
        let not_found = |reason: String| SourceError::RefNotFound {
            repo: repo_url.to_string(),
            reference: reference.to_string(),
            reason,
        };

        match reference {
            GitRef::DefaultBranch => repo
                .head()
                .and_then(|head| head.peel_to_commit())
                .map_err(|e| not_found(e.message().to_string())),
            GitRef::Branch(branch) => repo
                .find_reference(&format!("refs/heads/{}", branch))
                .and_then(|r| r.peel_to_commit())
                .map_err(|e| not_found(e.message().to_string())),
            GitRef::Tag(tag) => repo
                .find_reference(&format!("refs/tags/{}", tag))
                .and_then(|r| r.peel_to_commit())
                .map_err(|e| not_found(e.message().to_string())),
            GitRef::Rev(rev) => git2::Oid::from_str(rev)
                .and_then(|oid| repo.find_commit(oid))
                .map_err(|e| not_found(e.message().to_string())),
        }
    }
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for GitFetcher {
    fn fetch(
        &self,
        repo_url: &RepoUrl,
        reference: &GitRef,
        dest: &Path,
    ) -> Result<Checkout, SourceError> {
        let repo = self.clone_or_update(repo_url, dest)?;

        let commit_id = {
            let commit = Self::resolve_commit(&repo, repo_url, reference)?;
            let id = commit.id().to_string();

            // Detach at the requested commit so the working tree matches it.
            repo.reset(commit.as_object(), ResetType::Hard, None)
                .map_err(|e| SourceError::RefNotFound {
                    repo: repo_url.to_string(),
                    reference: reference.to_string(),
                    reason: e.message().to_string(),
                })?;
            id
        };

        tracing::debug!("checked out {} at {}", repo_url, &commit_id[..8]);

        Ok(Checkout {
            path: dest.to_path_buf(),
            commit: commit_id,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Build a local repository with one committed file per (name, content).
    pub(crate) fn fixture_repo(dir: &Path, files: &[(&str, &str)]) -> String {
        let repo = Repository::init(dir).unwrap();
        for (name, content) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(&path, content).unwrap();
        }

        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("test", "test@example.com").unwrap();
        let commit = repo
            .commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
            .unwrap();
        commit.to_string()
    }

    #[test]
    fn test_fetch_local_repo_default_branch() {
        let upstream = TempDir::new().unwrap();
        let expected = fixture_repo(upstream.path(), &[("vpc.yaml", "Resources: {}\n")]);

        let scratch = TempDir::new().unwrap();
        let repo_url = RepoUrl::for_path(upstream.path()).unwrap();
        let fetcher = GitFetcher::new();

        let checkout = fetcher
            .fetch(&repo_url, &GitRef::DefaultBranch, &scratch.path().join("co"))
            .unwrap();
        assert_eq!(checkout.commit, expected);
        assert!(checkout.path.join("vpc.yaml").exists());
    }

    #[test]
    fn test_fetch_with_unexpired_deadline_succeeds() {
        let upstream = TempDir::new().unwrap();
        fixture_repo(upstream.path(), &[("vpc.yaml", "Resources: {}\n")]);

        let scratch = TempDir::new().unwrap();
        let repo_url = RepoUrl::for_path(upstream.path()).unwrap();
        let fetcher = GitFetcher::with_timeout(Duration::from_secs(60));

        let checkout = fetcher
            .fetch(&repo_url, &GitRef::DefaultBranch, &scratch.path().join("co"))
            .unwrap();
        assert!(checkout.path.join("vpc.yaml").exists());
    }

    #[test]
    fn test_fetch_unknown_ref_fails() {
        let upstream = TempDir::new().unwrap();
        fixture_repo(upstream.path(), &[("a.yaml", "{}\n")]);

        let scratch = TempDir::new().unwrap();
        let repo_url = RepoUrl::for_path(upstream.path()).unwrap();
        let fetcher = GitFetcher::new();

        let err = fetcher
            .fetch(
                &repo_url,
                &GitRef::Tag("v9.9".into()),
                &scratch.path().join("co"),
            )
            .unwrap_err();
        assert!(matches!(err, SourceError::RefNotFound { .. }));
    }

    #[test]
    fn test_fetch_unreachable_repo_fails() {
        let scratch = TempDir::new().unwrap();
        let repo_url = RepoUrl::parse("file:///nonexistent/definitely/missing").unwrap();
        let fetcher = GitFetcher::new();

        let err = fetcher
            .fetch(&repo_url, &GitRef::DefaultBranch, &scratch.path().join("co"))
            .unwrap_err();
        assert!(matches!(err, SourceError::Unreachable { .. }));
    }
}
