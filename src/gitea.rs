//! Gitea API client
//!
//! Hand-rolled client over reqwest for the handful of endpoints the
//! sync engine needs. Compatible with Gitea, Forgejo and Codeberg.
//! The same client backs both roles: the destination instance that
//! hosts the mirrors, and (optionally) a second Gitea instance acting
//! as the repository source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::source::SourceRepo;
use crate::sync::Destination;

/// Page size for repository listings.
const PAGE_SIZE: u32 = 50;

/// Errors from the Gitea API client.
#[derive(Debug, Error)]
pub enum GiteaError {
    #[error("gitea request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gitea api error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Repository as returned by the Gitea API.
#[derive(Debug, Clone, Deserialize)]
pub struct GiteaRepo {
    pub name: String,
    pub full_name: String,
    pub owner: GiteaUser,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub mirror: bool,
    /// Upstream URL the mirror was migrated from. Only meaningful when
    /// `mirror` is true.
    #[serde(default)]
    pub original_url: String,
    /// Duration string, "0s" when periodic pulling is disabled.
    #[serde(default)]
    pub mirror_interval: String,
    /// Last time the mirror pulled from upstream.
    #[serde(default)]
    pub mirror_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clone_url: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GiteaUser {
    #[serde(alias = "username")]
    pub login: String,
}

/// Partial repository edit. `None` fields are left untouched by the
/// server, so one request carries every queued metadata change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RepoEdit {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_interval: Option<String>,
}

impl RepoEdit {
    pub fn is_empty(&self) -> bool {
        *self == RepoEdit::default()
    }
}

/// Request body for creating a new mirror migration.
#[derive(Debug, Clone, Serialize)]
pub struct MigrateRequest {
    pub clone_addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub mirror: bool,
    pub private: bool,
    pub repo_owner: String,
    pub repo_name: String,
    /// Git service of the upstream: "github" or "gitea".
    pub service: String,
    pub wiki: bool,
    pub lfs: bool,
}

#[derive(Debug, Deserialize)]
struct TopicList {
    topics: Vec<String>,
}

#[derive(Debug, Serialize)]
struct TopicReplace<'a> {
    topics: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct ServerVersion {
    pub version: String,
}

/// Gitea API client with token authentication.
#[derive(Clone)]
pub struct GiteaClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl GiteaClient {
    pub fn new(url: &str, token: &str) -> Result<Self, GiteaError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mirrorgate/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Anonymous clients (owner-only source listing) send no
    /// Authorization header at all.
    fn auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.token.is_empty() {
            return request;
        }
        request.header("Authorization", format!("token {}", self.token))
    }

    /// Turn a non-2xx response into an API error with the body text.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, GiteaError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(GiteaError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn server_version(&self) -> Result<ServerVersion, GiteaError> {
        let response = self.auth(self.http.get(self.api_url("/version"))).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn current_user(&self) -> Result<GiteaUser, GiteaError> {
        let response = self.auth(self.http.get(self.api_url("/user"))).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// List repositories of `owner`, or of the authenticated user when
    /// no owner is given. Pages until the server returns a short page.
    pub async fn list_repos(&self, owner: Option<&str>) -> Result<Vec<GiteaRepo>, GiteaError> {
        let path = match owner {
            Some(owner) => format!("/users/{}/repos", owner),
            None => "/user/repos".to_string(),
        };

        let mut repos = Vec::new();
        let mut page = 1u32;

        loop {
            let response = self
                .auth(self.http.get(self.api_url(&path)))
                .query(&[("page", page), ("limit", PAGE_SIZE)])
                .send()
                .await?;

            let batch: Vec<GiteaRepo> = Self::check(response).await?.json().await?;
            let len = batch.len();
            repos.extend(batch);

            if (len as u32) < PAGE_SIZE {
                break;
            }
            page += 1;
        }

        debug!("listed {} repositories from {}", repos.len(), self.base_url);
        Ok(repos)
    }

    /// Fetch a single repository. A 404 is an expected control-flow
    /// signal (the mirror does not exist yet) and maps to `None`;
    /// every other failure is surfaced.
    pub async fn get_repo(&self, owner: &str, name: &str) -> Result<Option<GiteaRepo>, GiteaError> {
        let path = format!("/repos/{}/{}", owner, name);
        let response = self.auth(self.http.get(self.api_url(&path))).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Some(Self::check(response).await?.json().await?))
    }

    pub async fn migrate_repo(&self, request: &MigrateRequest) -> Result<GiteaRepo, GiteaError> {
        let response = self
            .auth(self.http.post(self.api_url("/repos/migrate")))
            .json(request)
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn edit_repo(
        &self,
        owner: &str,
        name: &str,
        edit: &RepoEdit,
    ) -> Result<(), GiteaError> {
        let path = format!("/repos/{}/{}", owner, name);
        let response = self
            .auth(self.http.patch(self.api_url(&path)))
            .json(edit)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn list_topics(&self, owner: &str, name: &str) -> Result<Vec<String>, GiteaError> {
        let path = format!("/repos/{}/{}/topics", owner, name);
        let response = self.auth(self.http.get(self.api_url(&path))).send().await?;
        let list: TopicList = Self::check(response).await?.json().await?;
        Ok(list.topics)
    }

    pub async fn replace_topics(
        &self,
        owner: &str,
        name: &str,
        topics: &[String],
    ) -> Result<(), GiteaError> {
        let path = format!("/repos/{}/{}/topics", owner, name);
        let response = self
            .auth(self.http.put(self.api_url(&path)))
            .json(&TopicReplace { topics })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Ask the server to pull from upstream now instead of waiting for
    /// the next scheduled interval.
    pub async fn mirror_sync(&self, owner: &str, name: &str) -> Result<(), GiteaError> {
        let path = format!("/repos/{}/{}/mirror-sync", owner, name);
        let response = self.auth(self.http.post(self.api_url(&path))).send().await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Destination for GiteaClient {
    async fn find_repo(&self, owner: &str, name: &str) -> Result<Option<GiteaRepo>, GiteaError> {
        self.get_repo(owner, name).await
    }

    async fn migrate_repo(&self, request: &MigrateRequest) -> Result<GiteaRepo, GiteaError> {
        GiteaClient::migrate_repo(self, request).await
    }

    async fn edit_repo(&self, owner: &str, name: &str, edit: &RepoEdit) -> Result<(), GiteaError> {
        GiteaClient::edit_repo(self, owner, name, edit).await
    }

    async fn list_topics(&self, owner: &str, name: &str) -> Result<Vec<String>, GiteaError> {
        GiteaClient::list_topics(self, owner, name).await
    }

    async fn replace_topics(
        &self,
        owner: &str,
        name: &str,
        topics: &[String],
    ) -> Result<(), GiteaError> {
        GiteaClient::replace_topics(self, owner, name, topics).await
    }

    async fn trigger_mirror_sync(&self, owner: &str, name: &str) -> Result<(), GiteaError> {
        self.mirror_sync(owner, name).await
    }
}

/// Gitea acting as the repository source.
pub struct GiteaSource {
    client: GiteaClient,
    owner: Option<String>,
    /// Topic listings cost one extra request per repository, so they
    /// are only fetched when topic sync is enabled.
    fetch_topics: bool,
}

impl GiteaSource {
    pub fn new(client: GiteaClient, owner: Option<String>, fetch_topics: bool) -> Self {
        Self {
            client,
            owner,
            fetch_topics,
        }
    }

    pub async fn server_version(&self) -> Result<String, GiteaError> {
        Ok(self.client.server_version().await?.version)
    }

    pub async fn list_repos(&self) -> anyhow::Result<Vec<SourceRepo>> {
        let repos = self.client.list_repos(self.owner.as_deref()).await?;

        let mut normalized = Vec::with_capacity(repos.len());
        for repo in repos {
            let topics = if self.fetch_topics {
                self.client.list_topics(&repo.owner.login, &repo.name).await?
            } else {
                Vec::new()
            };
            normalized.push(normalize(repo, topics));
        }

        Ok(normalized)
    }
}

fn normalize(repo: GiteaRepo, topics: Vec<String>) -> SourceRepo {
    let mut clone_urls = vec![repo.clone_url];
    if !repo.html_url.is_empty() {
        clone_urls.push(repo.html_url);
    }

    SourceRepo {
        owner: repo.owner.login,
        name: repo.name,
        fork: repo.fork,
        clone_urls,
        topics,
        description: repo.description,
        private: repo.private,
        archived: repo.archived,
        // Gitea does not expose a pushed-at timestamp; updated_at is
        // the closest signal the API offers.
        pushed_at: repo.updated_at.unwrap_or(DateTime::<Utc>::MIN_UTC),
    }
}
