//! mirrorgate - Gitea Mirror Synchronization Daemon
//!
//! mirrorgate keeps pull mirrors on a Gitea instance in sync with their
//! source repositories on GitHub or another Gitea instance: it migrates
//! missing mirrors, reconciles metadata drift, and nudges stale mirrors
//! to pull.
//!
//! ## Core Features
//!
//! - **Source Adapters**: GitHub (octocrab) and Gitea listing backends
//! - **Mirror Migration**: Missing repositories are created as pull mirrors
//! - **Metadata Sync**: Description, visibility, topics, mirror interval
//! - **Staleness Detection**: Triggers a pull when the source is ahead
//! - **Configuration Management**: YAML-based configuration with XDG compliance
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`source`]: Provider-agnostic source repository model
//! - [`github`]: GitHub listing adapter
//! - [`gitea`]: Gitea API client (destination and source)
//! - [`diff`]: Field-level drift predicates
//! - [`sync`]: The reconciliation engine

pub mod config;
pub mod daemon;
pub mod diff;
pub mod gitea;
pub mod github;
pub mod health;
pub mod source;
pub mod sync;

pub use config::Config;
pub use gitea::{GiteaClient, GiteaRepo, GiteaSource};
pub use github::GitHubSource;
pub use source::{SourceHost, SourceRepo};
pub use sync::{RepoOutcome, SyncAction, SyncEngine, SyncOptions, SyncSummary};
