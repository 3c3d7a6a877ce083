//! Template identity - WHERE templates come from.
//!
//! A `TemplateRef` names one template reproducibly: repository, git ref, and
//! path within the repository. Repository URLs may be spelled in several
//! conventional forms (HTTPS, SSH, scp-like, `file://`, `org/repo` shorthand);
//! `RepoUrl` reduces them all to a single canonical identity so differently
//! spelled URLs for the same repository share a cache slot.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Git reference specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitRef {
    /// Default branch (usually main/master)
    DefaultBranch,
    /// Specific branch
    Branch(String),
    /// Specific tag
    Tag(String),
    /// Specific revision (commit hash)
    Rev(String),
}

impl Default for GitRef {
    fn default() -> Self {
        GitRef::DefaultBranch
    }
}

impl GitRef {
    /// Parse a user-supplied ref string.
    ///
    /// Bare 40-char hex is treated as a commit, `tag:v1.0` / `branch:main` /
    /// `rev:abc123` force a kind, anything else is a branch name.
    pub fn parse(s: &str) -> Self {
        if let Some(tag) = s.strip_prefix("tag:") {
            return GitRef::Tag(tag.to_string());
        }
        if let Some(branch) = s.strip_prefix("branch:") {
            return GitRef::Branch(branch.to_string());
        }
        if let Some(rev) = s.strip_prefix("rev:") {
            return GitRef::Rev(rev.to_string());
        }
        if s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return GitRef::Rev(s.to_string());
        }
        GitRef::Branch(s.to_string())
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitRef::DefaultBranch => write!(f, "HEAD"),
            GitRef::Branch(b) => write!(f, "branch={}", b),
            GitRef::Tag(t) => write!(f, "tag={}", t),
            GitRef::Rev(r) => write!(f, "rev={}", &r[..8.min(r.len())]),
        }
    }
}

/// A repository URL reduced to a canonical identity.
///
/// Equality and hashing use the canonical form only, so
/// `git@github.com:org/repo.git` and `https://github.com/org/repo` compare
/// equal. The original spelling is kept as the fetch URL for git transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoUrl {
    /// Canonical identity: `host/path` with the host lowercased, any `.git`
    /// suffix or trailing slash stripped, and the path case-folded on hosts
    /// known to be case-insensitive. `file:///abs/path` for local
    /// repositories.
    canonical: String,

    /// URL usable by git transport (scp-like spellings are rewritten to
    /// `ssh://`).
    fetch_url: String,
}

impl RepoUrl {
    /// Parse a repository URL in any conventional form.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            bail!("empty repository URL");
        }

        // scp-like SSH: git@host:org/repo.git
        if let Some(rest) = spec.strip_prefix("git@") {
            if let Some((host, path)) = rest.split_once(':') {
                if !path.is_empty() && !path.contains("//") {
                    return Ok(RepoUrl {
                        canonical: canonical_host_path(host, path),
                        fetch_url: format!("ssh://git@{}/{}", host, path.trim_start_matches('/')),
                    });
                }
            }
            bail!("invalid scp-like git URL: {}", spec);
        }

        // Explicit scheme
        if spec.contains("://") {
            let url = Url::parse(spec)?;
            match url.scheme() {
                "http" | "https" | "ssh" | "git" => {
                    let host = url
                        .host_str()
                        .ok_or_else(|| anyhow::anyhow!("repository URL has no host: {}", spec))?;
                    return Ok(RepoUrl {
                        canonical: canonical_host_path(host, url.path()),
                        fetch_url: spec.to_string(),
                    });
                }
                "file" => {
                    return Ok(RepoUrl {
                        canonical: format!("file://{}", url.path().trim_end_matches('/')),
                        fetch_url: spec.to_string(),
                    });
                }
                other => bail!("unsupported URL scheme `{}` in {}", other, spec),
            }
        }

        // Local path
        if spec.starts_with('/') || spec.starts_with("./") || spec.starts_with("../") {
            return Self::for_path(Path::new(spec));
        }

        // Shorthand: org/repo (defaults to github.com)
        let segments: Vec<&str> = spec.split('/').collect();
        if segments.len() == 2 && segments.iter().all(|s| !s.is_empty()) {
            return Ok(RepoUrl {
                canonical: canonical_host_path("github.com", spec),
                fetch_url: format!("https://github.com/{}", spec),
            });
        }

        bail!("unrecognized repository URL: {}", spec)
    }

    /// Create a RepoUrl for a local repository path.
    pub fn for_path(path: &Path) -> Result<Self> {
        let abs = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let url = Url::from_file_path(&abs)
            .map_err(|_| anyhow::anyhow!("invalid repository path: {}", path.display()))?;
        Ok(RepoUrl {
            canonical: format!("file://{}", url.path().trim_end_matches('/')),
            fetch_url: url.to_string(),
        })
    }

    /// Canonical repository identity.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// URL to hand to git transport.
    pub fn fetch_url(&self) -> &str {
        &self.fetch_url
    }

    /// Short name usable as a directory component.
    pub fn dir_name(&self) -> String {
        self.canonical
            .trim_start_matches("file://")
            .trim_matches('/')
            .replace(['/', ':'], "-")
    }
}

/// Hosts that treat repository paths case-insensitively, so `Org/Repo` and
/// `org/repo` name the same repository. Paths on other hosts keep their case.
const CASE_INSENSITIVE_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

fn canonical_host_path(host: &str, path: &str) -> String {
    let host = host.to_lowercase();
    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    if CASE_INSENSITIVE_HOSTS.contains(&host.as_str()) {
        format!("{}/{}", host, path.to_lowercase())
    } else {
        format!("{}/{}", host, path)
    }
}

impl PartialEq for RepoUrl {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for RepoUrl {}

impl Hash for RepoUrl {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for RepoUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

/// A unique, reproducible identifier for one template file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateRef {
    repo: RepoUrl,
    reference: GitRef,
    path: String,
}

impl TemplateRef {
    /// Create a new template reference.
    pub fn new(repo: RepoUrl, reference: GitRef, path: impl Into<String>) -> Self {
        let path = path.into();
        let path = path.trim_start_matches('/').to_string();
        TemplateRef {
            repo,
            reference,
            path,
        }
    }

    /// Repository the template lives in.
    pub fn repo(&self) -> &RepoUrl {
        &self.repo
    }

    /// Git ref to resolve.
    pub fn reference(&self) -> &GitRef {
        &self.reference
    }

    /// Path of the template within the repository.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.repo, self.reference, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_https_and_ssh_spellings_are_equivalent() {
        let https = RepoUrl::parse("https://github.com/Org/Repo.git").unwrap();
        let scp = RepoUrl::parse("git@github.com:Org/Repo").unwrap();
        let ssh = RepoUrl::parse("ssh://git@github.com/Org/Repo.git").unwrap();

        assert_eq!(https, scp);
        assert_eq!(https, ssh);
        assert_eq!(https.canonical(), "github.com/org/repo");
    }

    #[test]
    fn test_path_case_folded_on_case_insensitive_hosts() {
        let upper = RepoUrl::parse("https://github.com/Org/Repo").unwrap();
        let lower = RepoUrl::parse("org/repo").unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_path_case_kept_on_other_hosts() {
        let upper = RepoUrl::parse("https://git.example.com/Team/Repo").unwrap();
        let lower = RepoUrl::parse("https://git.example.com/team/repo").unwrap();
        assert_ne!(upper, lower);
    }

    #[test]
    fn test_shorthand_defaults_to_github() {
        let short = RepoUrl::parse("org/repo").unwrap();
        let full = RepoUrl::parse("https://github.com/org/repo").unwrap();
        assert_eq!(short, full);
        assert_eq!(short.fetch_url(), "https://github.com/org/repo");
    }

    #[test]
    fn test_file_url_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let by_path = RepoUrl::for_path(tmp.path()).unwrap();
        let by_url = RepoUrl::parse(&format!("file://{}", tmp.path().canonicalize().unwrap().display())).unwrap();
        assert_eq!(by_path, by_url);
    }

    #[test]
    fn test_scp_fetch_url_is_ssh() {
        let repo = RepoUrl::parse("git@gitlab.com:group/project.git").unwrap();
        assert_eq!(repo.fetch_url(), "ssh://git@gitlab.com/group/project.git");
        assert_eq!(repo.canonical(), "gitlab.com/group/project");
    }

    #[test]
    fn test_bad_urls_rejected() {
        assert!(RepoUrl::parse("").is_err());
        assert!(RepoUrl::parse("ftp://example.com/repo").is_err());
        assert!(RepoUrl::parse("just-a-word").is_err());
    }

    #[test]
    fn test_git_ref_parse() {
        assert_eq!(GitRef::parse("main"), GitRef::Branch("main".into()));
        assert_eq!(GitRef::parse("tag:v1.0"), GitRef::Tag("v1.0".into()));
        assert_eq!(
            GitRef::parse("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef"),
            GitRef::Rev("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef".into())
        );
    }

    #[test]
    fn test_template_ref_display() {
        let repo = RepoUrl::parse("org/templates").unwrap();
        let tref = TemplateRef::new(repo, GitRef::Branch("main".into()), "/vpc.yaml");
        assert_eq!(tref.path(), "vpc.yaml");
        assert_eq!(
            tref.to_string(),
            "github.com/org/templates@branch=main:vpc.yaml"
        );
    }
}
