//! Process-scoped fetch cache.
//!
//! The cache is an explicit object owned by the caller (never a hidden
//! global): empty at construction, discarded at process exit along with its
//! scratch directory. Entries are keyed by (canonical repository, ref), so
//! differently spelled URLs for the same repository share a slot.
//!
//! Concurrency contract: a cache miss that triggers a fetch must not
//! duplicate network work. Each key has its own in-flight slot mutex; the
//! second concurrent requester blocks on the slot until the first fetch
//! completes, then reads the cached checkout.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use crate::core::{GitRef, RawTemplate, RepoUrl, TemplateRef};
use crate::sources::{Checkout, Fetcher, GitFetcher, SourceError};
use crate::util::hash::sha256_str;

type CacheKey = (RepoUrl, GitRef);
type Slot = Arc<Mutex<Option<Arc<Checkout>>>>;

/// Cache of fetched repository checkouts for the duration of a process run.
pub struct FetchCache {
    fetcher: Box<dyn Fetcher>,
    scratch: TempDir,
    entries: Mutex<HashMap<CacheKey, Slot>>,
}

impl FetchCache {
    /// Create an empty cache backed by git transport.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_fetcher(Box::new(GitFetcher::new()))
    }

    /// Create an empty cache with a fetch timeout.
    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        Self::with_fetcher(Box::new(GitFetcher::with_timeout(timeout)))
    }

    /// Create a cache over a custom fetcher (used by tests).
    pub fn with_fetcher(fetcher: Box<dyn Fetcher>) -> anyhow::Result<Self> {
        Ok(FetchCache {
            fetcher,
            scratch: TempDir::new()?,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Scratch directory holding all checkouts. Removed on drop.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Resolve a template reference to its raw bytes.
    pub fn resolve(&self, template: &TemplateRef) -> Result<RawTemplate, SourceError> {
        let checkout = self.checkout(template.repo(), template.reference())?;

        let file_path = checkout.path.join(template.path());
        let content = std::fs::read(&file_path).map_err(|_| SourceError::PathNotFound {
            repo: template.repo().to_string(),
            reference: template.reference().to_string(),
            path: template.path().to_string(),
        })?;

        Ok(RawTemplate::new(template.clone(), content))
    }

    /// Get the checkout for (repo, ref), fetching at most once per key.
    pub fn checkout(
        &self,
        repo: &RepoUrl,
        reference: &GitRef,
    ) -> Result<Arc<Checkout>, SourceError> {
        let slot = {
            let mut entries = self.entries.lock().unwrap();
            entries
                .entry((repo.clone(), reference.clone()))
                .or_default()
                .clone()
        };

        // Holding the slot lock across the fetch is what makes a concurrent
        // second requester wait instead of re-fetching.
        let mut cached = slot.lock().unwrap();
        if let Some(checkout) = cached.as_ref() {
            tracing::debug!("cache hit for {} at {}", repo, reference);
            return Ok(checkout.clone());
        }

        let dest = self.scratch.path().join(checkout_dir_name(repo, reference));
        let checkout = Arc::new(self.fetcher.fetch(repo, reference, &dest)?);
        *cached = Some(checkout.clone());
        Ok(checkout)
    }
}

/// Unique directory name for a (repo, ref) checkout.
fn checkout_dir_name(repo: &RepoUrl, reference: &GitRef) -> String {
    format!(
        "{}-{}",
        repo.dir_name(),
        &sha256_str(&format!("{:?}", reference))[..8]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    /// Fetcher that counts invocations and writes a fixed template file.
    struct CountingFetcher {
        calls: Arc<AtomicUsize>,
        delay: Option<Duration>,
    }

    impl CountingFetcher {
        fn new() -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                CountingFetcher {
                    calls: calls.clone(),
                    delay: None,
                },
                calls,
            )
        }
    }

    impl Fetcher for CountingFetcher {
        fn fetch(
            &self,
            _repo: &RepoUrl,
            _reference: &GitRef,
            dest: &Path,
        ) -> Result<Checkout, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            std::fs::create_dir_all(dest).unwrap();
            std::fs::write(dest.join("stack.yaml"), "Resources: {}\n").unwrap();
            Ok(Checkout {
                path: dest.to_path_buf(),
                commit: "0000000000000000000000000000000000000000".into(),
            })
        }
    }

    fn template_ref(path: &str) -> TemplateRef {
        TemplateRef::new(
            RepoUrl::parse("org/templates").unwrap(),
            GitRef::Branch("main".into()),
            path,
        )
    }

    #[test]
    fn test_cache_hit_skips_second_fetch() {
        let (fetcher, calls) = CountingFetcher::new();
        let cache = FetchCache::with_fetcher(Box::new(fetcher)).unwrap();
        let tref = template_ref("stack.yaml");

        let first = cache.resolve(&tref).unwrap();
        let second = cache.resolve(&tref).unwrap();

        assert_eq!(first.content(), second.content());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_equivalent_url_spellings_share_slot() {
        let (fetcher, calls) = CountingFetcher::new();
        let cache = FetchCache::with_fetcher(Box::new(fetcher)).unwrap();

        let short = TemplateRef::new(
            RepoUrl::parse("org/templates").unwrap(),
            GitRef::Branch("main".into()),
            "stack.yaml",
        );
        let https = TemplateRef::new(
            RepoUrl::parse("https://github.com/org/templates.git").unwrap(),
            GitRef::Branch("main".into()),
            "stack.yaml",
        );

        cache.resolve(&short).unwrap();
        cache.resolve(&https).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_resolutions_fetch_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = Box::new(CountingFetcher {
            calls: calls.clone(),
            delay: Some(Duration::from_millis(50)),
        });
        let cache = Arc::new(FetchCache::with_fetcher(fetcher).unwrap());

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.resolve(&template_ref("stack.yaml")).unwrap()
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_path_is_path_not_found() {
        let (fetcher, _calls) = CountingFetcher::new();
        let cache = FetchCache::with_fetcher(Box::new(fetcher)).unwrap();
        let err = cache.resolve(&template_ref("nope.yaml")).unwrap_err();
        assert!(matches!(err, SourceError::PathNotFound { path, .. } if path == "nope.yaml"));
    }
}
