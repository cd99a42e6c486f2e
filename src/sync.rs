//! Sync Engine - Reconciles source repositories with their mirrors
//!
//! For each source repository the engine looks up the destination
//! mirror by owner and name: a missing mirror triggers a new
//! migration, an existing one is verified to actually be our mirror
//! and then reconciled field by field. Repositories are processed
//! sequentially in listing order; a failure on one repository never
//! stops the batch, and a failure in one mutation dimension never
//! blocks the others on the same repository.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::diff;
use crate::gitea::{GiteaError, GiteaRepo, MigrateRequest, RepoEdit};
use crate::source::{is_skipped, SourceRepo};

/// Destination service operations the engine needs. "Not found" is a
/// control-flow signal (`Ok(None)`), never conflated with a transport
/// failure.
#[async_trait]
pub trait Destination {
    async fn find_repo(&self, owner: &str, name: &str) -> Result<Option<GiteaRepo>, GiteaError>;
    async fn migrate_repo(&self, request: &MigrateRequest) -> Result<GiteaRepo, GiteaError>;
    async fn edit_repo(&self, owner: &str, name: &str, edit: &RepoEdit) -> Result<(), GiteaError>;
    async fn list_topics(&self, owner: &str, name: &str) -> Result<Vec<String>, GiteaError>;
    async fn replace_topics(
        &self,
        owner: &str,
        name: &str,
        topics: &[String],
    ) -> Result<(), GiteaError>;
    async fn trigger_mirror_sync(&self, owner: &str, name: &str) -> Result<(), GiteaError>;
}

/// Run-scoped reconciliation settings, built once from the validated
/// configuration.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub sync_description: bool,
    pub sync_visibility: bool,
    pub sync_topics: bool,
    pub sync_mirror_interval: bool,
    /// Interval written when an unarchived repository gets periodic
    /// pulling re-enabled.
    pub dest_mirror_interval: String,
    /// When set, every mirror lives under this owner instead of the
    /// source owner.
    pub dest_owner: Option<String>,
    pub migrate_wiki: bool,
    pub migrate_lfs: bool,
    /// Upstream service name passed to new migrations ("github" or
    /// "gitea").
    pub source_service: String,
    /// Token the destination uses to clone private upstreams.
    pub source_token: Option<String>,
    pub skip_repos: Vec<String>,
    /// Plan and report everything, issue no mutating calls.
    pub dry_run: bool,
}

/// Terminal outcome of reconciling one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Matched the skip list; nothing was looked up.
    Skipped,
    /// No mirror existed; a new migration was created.
    Migrated,
    /// A destination repository exists but is not our mirror. Left
    /// untouched.
    MirrorMismatch,
    /// Reconciled; any queued updates were applied.
    Synced,
    /// One or more calls failed. Partial updates may have succeeded.
    Failed,
}

/// Destination fields an engine pass changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatedField {
    Description,
    Visibility,
    MirrorInterval,
    Topics,
    MirrorPull,
}

/// One or more of the independent mutation dimensions failed. Causes
/// are kept as a list so callers can inspect them individually; the
/// dimensions that did succeed keep their updated-field entries.
#[derive(Debug)]
pub struct PartialSyncError {
    pub causes: Vec<GiteaError>,
}

impl std::fmt::Display for PartialSyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} sync call(s) failed", self.causes.len())?;
        for cause in &self.causes {
            write!(f, "; {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for PartialSyncError {}

/// Per-repository reconciliation error.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("destination request failed: {0}")]
    Transport(#[from] GiteaError),

    #[error("{repo} exists on the destination but is not a mirror of this source (original_url: {original_url:?})")]
    MirrorMismatch { repo: String, original_url: String },

    #[error("{0}")]
    Partial(PartialSyncError),
}

/// Result of reconciling a single repository.
#[derive(Debug)]
pub struct RepoOutcome {
    /// Source `owner/name`.
    pub repo: String,
    pub action: SyncAction,
    pub updated: Vec<UpdatedField>,
    pub error: Option<SyncError>,
}

/// Results from a complete sync pass.
#[derive(Debug, Default)]
pub struct SyncSummary {
    pub total: usize,
    pub migrated: usize,
    pub synced: usize,
    pub skipped: usize,
    pub mismatched: usize,
    pub failed: usize,
    pub duration: Duration,
    pub outcomes: Vec<RepoOutcome>,
}

/// The reconciliation engine. Holds no per-repository state; every
/// pass re-reads the destination, which is the sole source of truth.
pub struct SyncEngine<D: Destination> {
    dest: D,
    options: SyncOptions,
}

impl<D: Destination> SyncEngine<D> {
    pub fn new(dest: D, options: SyncOptions) -> Self {
        Self { dest, options }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Reconcile every repository, one at a time, in listing order.
    pub async fn run(&self, repos: &[SourceRepo]) -> SyncSummary {
        let start = Instant::now();
        let mut summary = SyncSummary {
            total: repos.len(),
            ..Default::default()
        };

        for repo in repos {
            let outcome = self.reconcile(repo).await;

            match outcome.action {
                SyncAction::Skipped => summary.skipped += 1,
                SyncAction::Migrated => summary.migrated += 1,
                SyncAction::MirrorMismatch => summary.mismatched += 1,
                SyncAction::Synced => summary.synced += 1,
                SyncAction::Failed => summary.failed += 1,
            }
            summary.outcomes.push(outcome);
        }

        summary.duration = start.elapsed();
        info!(
            "sync pass finished in {:.2}s: {} migrated, {} synced, {} skipped, {} mismatched, {} failed",
            summary.duration.as_secs_f64(),
            summary.migrated,
            summary.synced,
            summary.skipped,
            summary.mismatched,
            summary.failed
        );
        summary
    }

    /// Reconcile one repository through the per-repo state machine.
    pub async fn reconcile(&self, source: &SourceRepo) -> RepoOutcome {
        let full_name = source.full_name();

        if is_skipped(&self.options.skip_repos, source) {
            debug!("{}: on the skip list", full_name);
            return RepoOutcome {
                repo: full_name,
                action: SyncAction::Skipped,
                updated: Vec::new(),
                error: None,
            };
        }

        let dest_owner = self
            .options
            .dest_owner
            .as_deref()
            .unwrap_or(&source.owner)
            .to_string();

        let mirror = match self.dest.find_repo(&dest_owner, &source.name).await {
            Ok(Some(mirror)) => mirror,
            Ok(None) => return self.migrate(source, &dest_owner).await,
            Err(e) => {
                error!("{}: destination lookup failed: {}", full_name, e);
                return RepoOutcome {
                    repo: full_name,
                    action: SyncAction::Failed,
                    updated: Vec::new(),
                    error: Some(SyncError::Transport(e)),
                };
            }
        };

        if !diff::is_owned_mirror(&mirror, source) {
            warn!(
                "{}: destination repository is not a mirror of this source, leaving untouched",
                full_name
            );
            return RepoOutcome {
                repo: full_name,
                action: SyncAction::MirrorMismatch,
                updated: Vec::new(),
                error: Some(SyncError::MirrorMismatch {
                    repo: mirror.full_name.clone(),
                    original_url: mirror.original_url.clone(),
                }),
            };
        }

        let mut updated = Vec::new();
        let mut causes = Vec::new();

        self.sync_metadata(source, &mirror, &dest_owner, &mut updated, &mut causes)
            .await;
        self.sync_topics(source, &dest_owner, &mut updated, &mut causes)
            .await;
        self.sync_stale_mirror(source, &mirror, &dest_owner, &mut updated, &mut causes)
            .await;

        if causes.is_empty() {
            RepoOutcome {
                repo: full_name,
                action: SyncAction::Synced,
                updated,
                error: None,
            }
        } else {
            RepoOutcome {
                repo: full_name,
                action: SyncAction::Failed,
                updated,
                error: Some(SyncError::Partial(PartialSyncError { causes })),
            }
        }
    }

    /// Create a new mirror migration for a source repository that has
    /// no destination counterpart yet. Not retried within the run; the
    /// next pass picks it up again if it failed.
    async fn migrate(&self, source: &SourceRepo, dest_owner: &str) -> RepoOutcome {
        let full_name = source.full_name();
        info!("{}: no mirror found, migrating", full_name);

        let request = MigrateRequest {
            clone_addr: source.clone_urls[0].clone(),
            auth_token: self.options.source_token.clone(),
            mirror: true,
            private: source.private,
            repo_owner: dest_owner.to_string(),
            repo_name: source.name.clone(),
            service: self.options.source_service.clone(),
            wiki: self.options.migrate_wiki,
            lfs: self.options.migrate_lfs,
        };

        if self.options.dry_run {
            info!("{}: dry-run, would create migration", full_name);
            return RepoOutcome {
                repo: full_name,
                action: SyncAction::Migrated,
                updated: Vec::new(),
                error: None,
            };
        }

        match self.dest.migrate_repo(&request).await {
            Ok(_) => RepoOutcome {
                repo: full_name,
                action: SyncAction::Migrated,
                updated: Vec::new(),
                error: None,
            },
            Err(e) => {
                error!("{}: migration failed: {}", full_name, e);
                RepoOutcome {
                    repo: full_name,
                    action: SyncAction::Failed,
                    updated: Vec::new(),
                    error: Some(SyncError::Transport(e)),
                }
            }
        }
    }

    /// Apply the coalesced description/visibility/interval edit. On
    /// failure none of its fields get credit; the error is recorded and
    /// the remaining dimensions still run.
    async fn sync_metadata(
        &self,
        source: &SourceRepo,
        mirror: &GiteaRepo,
        dest_owner: &str,
        updated: &mut Vec<UpdatedField>,
        causes: &mut Vec<GiteaError>,
    ) {
        let (edit, fields) = diff::plan_metadata_edit(source, mirror, &self.options);
        if edit.is_empty() {
            debug!("{}: metadata already in sync", source.full_name());
            return;
        }

        info!("{}: updating {:?}", source.full_name(), fields);
        if self.options.dry_run {
            updated.extend(fields);
            return;
        }

        match self.dest.edit_repo(dest_owner, &source.name, &edit).await {
            Ok(()) => updated.extend(fields),
            Err(e) => {
                error!("{}: could not edit repo: {}", source.full_name(), e);
                causes.push(e);
            }
        }
    }

    /// Topic sync is its own endpoint and its own failure domain. The
    /// destination topic list is fetched lazily, only when enabled.
    async fn sync_topics(
        &self,
        source: &SourceRepo,
        dest_owner: &str,
        updated: &mut Vec<UpdatedField>,
        causes: &mut Vec<GiteaError>,
    ) {
        if !self.options.sync_topics {
            return;
        }

        let dest_topics = match self.dest.list_topics(dest_owner, &source.name).await {
            Ok(topics) => topics,
            Err(e) => {
                error!("{}: could not get repo topics: {}", source.full_name(), e);
                causes.push(e);
                return;
            }
        };

        if !diff::topics_differ(&source.topics, &dest_topics) {
            return;
        }

        info!("{}: replacing topics with {:?}", source.full_name(), source.topics);
        if self.options.dry_run {
            updated.push(UpdatedField::Topics);
            return;
        }

        match self
            .dest
            .replace_topics(dest_owner, &source.name, &source.topics)
            .await
        {
            Ok(()) => updated.push(UpdatedField::Topics),
            Err(e) => {
                error!("{}: could not set repo topics: {}", source.full_name(), e);
                causes.push(e);
            }
        }
    }

    /// Trigger a manual pull for a stale mirror. Always active,
    /// independent of the interval-sync flag; covers pushes that land
    /// before the next scheduled pull, including right after a
    /// repository was unarchived.
    async fn sync_stale_mirror(
        &self,
        source: &SourceRepo,
        mirror: &GiteaRepo,
        dest_owner: &str,
        updated: &mut Vec<UpdatedField>,
        causes: &mut Vec<GiteaError>,
    ) {
        if !diff::is_stale(source, mirror) {
            debug!("{}: mirror is up to date", source.full_name());
            return;
        }

        info!(
            "{}: mirror stale (pushed {:?}, last pull {:?}), triggering pull",
            source.full_name(),
            source.pushed_at,
            mirror.mirror_updated
        );
        if self.options.dry_run {
            updated.push(UpdatedField::MirrorPull);
            return;
        }

        match self.dest.trigger_mirror_sync(dest_owner, &source.name).await {
            Ok(()) => updated.push(UpdatedField::MirrorPull),
            Err(e) => {
                error!("{}: could not trigger mirror pull: {}", source.full_name(), e);
                causes.push(e);
            }
        }
    }
}
