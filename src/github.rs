//! GitHub source adapter
//!
//! Lists repositories through the GitHub API and normalizes them into
//! [`SourceRepo`] values for the sync engine.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use octocrab::models::Repository;
use octocrab::{Octocrab, Page};
use tracing::{debug, info, warn};

use crate::source::SourceRepo;

/// GitHub client wrapper for repository listing.
pub struct GitHubSource {
    client: Octocrab,
    /// Owner to list; `None` lists the authenticated user's repositories.
    owner: Option<String>,
}

impl GitHubSource {
    /// Create a client. Without a token the client is anonymous, which
    /// is enough for listing public repositories of a named owner.
    pub fn new(owner: Option<String>, token: Option<String>) -> Result<Self> {
        if owner.is_none() && token.is_none() {
            return Err(anyhow!(
                "GitHub source needs an owner or a token to know whose repositories to list"
            ));
        }

        let mut builder = Octocrab::builder();
        if let Some(token) = token {
            builder = builder.personal_token(token);
        }
        let client = builder.build().context("Failed to create GitHub client")?;

        Ok(Self { client, owner })
    }

    /// Login of the authenticated user, for diagnostics.
    pub async fn current_login(&self) -> Result<String> {
        let user = self
            .client
            .current()
            .user()
            .await
            .context("Failed to get current GitHub user. Check your token.")?;
        Ok(user.login)
    }

    /// List all repositories for the configured owner, following the
    /// API's pagination links until exhausted.
    pub async fn list_repos(&self) -> Result<Vec<SourceRepo>> {
        let route = match &self.owner {
            Some(owner) => format!("/users/{}/repos", owner),
            None => "/user/repos".to_string(),
        };
        debug!("fetching repositories from GitHub route: {}", route);

        let mut page: Page<Repository> = self
            .client
            .get(&route, Some(&serde_json::json!({ "per_page": 100 })))
            .await
            .context("Failed to list GitHub repositories")?;

        let mut repos: Vec<Repository> = page.take_items();
        while let Some(mut next) = self
            .client
            .get_page::<Repository>(&page.next)
            .await
            .context("Failed to fetch next GitHub repository page")?
        {
            repos.extend(next.take_items());
            page = next;
        }

        info!("found {} repositories on GitHub", repos.len());
        Ok(repos.into_iter().filter_map(normalize).collect())
    }
}

/// Convert a GitHub API repository into the provider-agnostic model.
/// Repositories missing an owner login are dropped with a warning
/// rather than failing the whole listing.
fn normalize(repo: Repository) -> Option<SourceRepo> {
    let Some(owner) = repo.owner.as_ref().map(|o| o.login.clone()) else {
        warn!("skipping repository without owner: {}", repo.name);
        return None;
    };

    let mut clone_urls = Vec::new();
    if let Some(clone_url) = &repo.clone_url {
        clone_urls.push(clone_url.to_string());
    }
    if let Some(html_url) = &repo.html_url {
        clone_urls.push(html_url.to_string());
    }
    if clone_urls.is_empty() {
        warn!("skipping repository without any clone URL: {}", repo.name);
        return None;
    }

    Some(SourceRepo {
        owner,
        name: repo.name.clone(),
        fork: repo.fork.unwrap_or(false),
        clone_urls,
        topics: repo.topics.clone().unwrap_or_default(),
        description: repo.description.clone().unwrap_or_default(),
        private: repo.private.unwrap_or(false),
        archived: repo.archived.unwrap_or(false),
        pushed_at: repo
            .pushed_at
            .or(repo.updated_at)
            .unwrap_or(DateTime::<Utc>::MIN_UTC),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_from_json(json: serde_json::Value) -> Repository {
        serde_json::from_value(json).unwrap()
    }

    fn sample_repo() -> serde_json::Value {
        serde_json::json!({
            "id": 1,
            "name": "widget",
            "full_name": "acme/widget",
            "url": "https://api.github.com/repos/acme/widget",
            "owner": {
                "login": "acme",
                "id": 2,
                "node_id": "x",
                "avatar_url": "https://example.com/a.png",
                "gravatar_id": "",
                "url": "https://api.github.com/users/acme",
                "html_url": "https://github.com/acme",
                "followers_url": "https://api.github.com/users/acme/followers",
                "following_url": "https://api.github.com/users/acme/following{/other_user}",
                "gists_url": "https://api.github.com/users/acme/gists{/gist_id}",
                "starred_url": "https://api.github.com/users/acme/starred{/owner}{/repo}",
                "subscriptions_url": "https://api.github.com/users/acme/subscriptions",
                "organizations_url": "https://api.github.com/users/acme/orgs",
                "repos_url": "https://api.github.com/users/acme/repos",
                "events_url": "https://api.github.com/users/acme/events{/privacy}",
                "received_events_url": "https://api.github.com/users/acme/received_events",
                "type": "User",
                "site_admin": false
            },
            "clone_url": "https://github.com/acme/widget.git",
            "html_url": "https://github.com/acme/widget",
            "fork": false,
            "private": false,
            "archived": false,
            "description": "A widget",
            "topics": ["tools", "cli"],
            "pushed_at": "2026-01-02T03:04:05Z"
        })
    }

    #[test]
    fn test_normalize_maps_fields() {
        let repo = repo_from_json(sample_repo());
        let normalized = normalize(repo).expect("should normalize");

        assert_eq!(normalized.owner, "acme");
        assert_eq!(normalized.name, "widget");
        assert_eq!(normalized.description, "A widget");
        assert_eq!(
            normalized.topics,
            vec!["tools".to_string(), "cli".to_string()]
        );
        assert!(!normalized.private);
        assert!(!normalized.archived);
    }

    #[test]
    fn test_normalize_carries_clone_and_html_urls() {
        let repo = repo_from_json(sample_repo());
        let normalized = normalize(repo).unwrap();

        assert_eq!(normalized.clone_urls[0], "https://github.com/acme/widget.git");
        assert_eq!(normalized.clone_urls[1], "https://github.com/acme/widget");
    }

    #[test]
    fn test_normalize_drops_repo_without_owner() {
        let mut json = sample_repo();
        json.as_object_mut().unwrap().remove("owner");
        let repo = repo_from_json(json);
        assert!(normalize(repo).is_none());
    }

    // Building the octocrab client needs a tokio runtime.
    #[tokio::test]
    async fn test_source_requires_owner_or_token() {
        assert!(GitHubSource::new(None, None).is_err());
        assert!(GitHubSource::new(Some("acme".to_string()), None).is_ok());
    }
}
