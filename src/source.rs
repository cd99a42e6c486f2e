//! Provider-agnostic view of source repositories
//!
//! Both provider adapters (GitHub and Gitea) normalize their listing
//! responses into [`SourceRepo`] so the sync engine never sees a
//! provider-specific shape. The adapter is chosen once at startup from
//! the configuration; there is no runtime type inspection.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::SourceConfig;
use crate::github::GitHubSource;
use crate::gitea::{GiteaClient, GiteaSource};

/// Snapshot of a source repository at scan time.
///
/// Constructed once per run by the selected provider adapter and never
/// mutated afterwards; all mutation happens on the destination side.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRepo {
    pub owner: String,
    pub name: String,
    pub fork: bool,
    /// Equivalent addresses for the repository. The first entry is the
    /// clone URL used for new migrations; the rest (e.g. the web URL)
    /// are accepted when verifying mirror ownership.
    pub clone_urls: Vec<String>,
    pub topics: Vec<String>,
    /// Empty string means "no description".
    pub description: String,
    pub private: bool,
    pub archived: bool,
    pub pushed_at: DateTime<Utc>,
}

impl SourceRepo {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Whether a skip-list entry refers to this repository.
    ///
    /// Matches case-insensitively against the bare name, the full
    /// `owner/name` path, or (when the entry contains a `/`) the part
    /// after the first `/` against the name. Bare-name entries are
    /// ambiguous across owners by design.
    pub fn matches(&self, entry: &str) -> bool {
        let entry = entry.to_lowercase();
        let name = self.name.to_lowercase();
        let full_name = self.full_name().to_lowercase();

        if entry == name || entry == full_name {
            return true;
        }

        match entry.split_once('/') {
            Some((_, after)) => after == name,
            None => false,
        }
    }
}

/// Check a repository against the configured skip list.
pub fn is_skipped(skip_repos: &[String], repo: &SourceRepo) -> bool {
    skip_repos.iter().any(|entry| repo.matches(entry))
}

/// The configured source backend, fixed for the lifetime of the process.
pub enum SourceHost {
    GitHub(GitHubSource),
    Gitea(GiteaSource),
}

impl SourceHost {
    /// Build the adapter named by the configuration.
    ///
    /// `fetch_topics` only matters for Gitea sources, where topics cost
    /// an extra request per repository.
    pub fn from_config(source: &SourceConfig, fetch_topics: bool) -> Result<Self> {
        match source {
            SourceConfig::Github { .. } => {
                let github = GitHubSource::new(
                    source.owner().map(String::from),
                    source.token(),
                )?;
                Ok(SourceHost::GitHub(github))
            }
            SourceConfig::Gitea { url, .. } => {
                let client = GiteaClient::new(url, source.token().as_deref().unwrap_or(""))?;
                let gitea = GiteaSource::new(
                    client,
                    source.owner().map(String::from),
                    fetch_topics,
                );
                Ok(SourceHost::Gitea(gitea))
            }
        }
    }

    /// List source repositories in the provider's listing order,
    /// dropping private repositories and forks when configured.
    pub async fn list_repos(
        &self,
        skip_private: bool,
        skip_forks: bool,
    ) -> Result<Vec<SourceRepo>> {
        let mut repos = match self {
            SourceHost::GitHub(github) => github.list_repos().await?,
            SourceHost::Gitea(gitea) => gitea.list_repos().await?,
        };

        if skip_private || skip_forks {
            repos.retain(|repo| {
                if skip_private && repo.private {
                    debug!("skipping private repository: {}", repo.full_name());
                    return false;
                }
                if skip_forks && repo.fork {
                    debug!("skipping fork repository: {}", repo.full_name());
                    return false;
                }
                true
            });
        }

        Ok(repos)
    }

    pub fn provider_name(&self) -> &'static str {
        match self {
            SourceHost::GitHub(_) => "github",
            SourceHost::Gitea(_) => "gitea",
        }
    }
}
