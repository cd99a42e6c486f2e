//! Configuration management and parsing

use anyhow::{bail, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::sync::SyncOptions;

/// Default mirror interval written to unarchived repositories.
pub const DEFAULT_DEST_MIRROR_INTERVAL: &str = "8h0m0s";

/// Main configuration structure for mirrorgate.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Which service the originals live on.
    pub source: SourceConfig,

    /// The Gitea instance that hosts the mirrors.
    pub destination: DestinationConfig,

    /// Which repository fields to reconcile.
    #[serde(default)]
    pub sync: SyncFlags,

    /// Options passed through to new mirror migrations.
    #[serde(default)]
    pub migrate: MigrateConfig,

    /// Repositories to leave alone.
    #[serde(default)]
    pub skip: SkipConfig,

    /// Daemon configuration.
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Source service selection, tagged so exactly one backend is chosen
/// at startup.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum SourceConfig {
    Github {
        /// Owner whose repositories are mirrored. When omitted, the
        /// token's own repositories are listed.
        #[serde(default)]
        owner: Option<String>,
        /// Falls back to the GITHUB_TOKEN environment variable.
        #[serde(default)]
        token: Option<String>,
    },
    Gitea {
        url: String,
        #[serde(default)]
        owner: Option<String>,
        /// Falls back to the GITEA_TOKEN environment variable.
        #[serde(default)]
        token: Option<String>,
    },
}

impl SourceConfig {
    /// Service name the destination's migration endpoint expects.
    pub fn service_name(&self) -> &'static str {
        match self {
            SourceConfig::Github { .. } => "github",
            SourceConfig::Gitea { .. } => "gitea",
        }
    }

    /// Configured token, or the provider's environment variable.
    pub fn token(&self) -> Option<String> {
        let (configured, env_var) = match self {
            SourceConfig::Github { token, .. } => (token, "GITHUB_TOKEN"),
            SourceConfig::Gitea { token, .. } => (token, "GITEA_TOKEN"),
        };
        configured
            .clone()
            .or_else(|| env::var(env_var).ok())
            .filter(|t| !t.is_empty())
    }

    pub fn owner(&self) -> Option<&str> {
        match self {
            SourceConfig::Github { owner, .. } | SourceConfig::Gitea { owner, .. } => {
                owner.as_deref()
            }
        }
    }
}

/// Destination Gitea instance.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DestinationConfig {
    pub url: String,

    /// Falls back to the DEST_TOKEN environment variable.
    #[serde(default)]
    pub token: Option<String>,

    /// When set, all mirrors live under this owner instead of the
    /// source owner.
    #[serde(default)]
    pub owner: Option<String>,

    /// Mirror interval written to unarchived repositories.
    #[serde(default = "default_mirror_interval")]
    pub mirror_interval: String,
}

impl DestinationConfig {
    pub fn token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| env::var("DEST_TOKEN").ok())
            .filter(|t| !t.is_empty())
    }
}

/// Per-field sync toggles. `all` is a shorthand that enables the rest.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SyncFlags {
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub description: bool,
    #[serde(default)]
    pub visibility: bool,
    #[serde(default)]
    pub topics: bool,
    #[serde(default)]
    pub mirror_interval: bool,
}

impl SyncFlags {
    pub fn description(&self) -> bool {
        self.all || self.description
    }
    pub fn visibility(&self) -> bool {
        self.all || self.visibility
    }
    pub fn topics(&self) -> bool {
        self.all || self.topics
    }
    pub fn mirror_interval(&self) -> bool {
        self.all || self.mirror_interval
    }
}

/// Payloads to include in new migrations. `all` enables the rest.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct MigrateConfig {
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub wiki: bool,
    #[serde(default)]
    pub lfs: bool,
}

impl MigrateConfig {
    pub fn wiki(&self) -> bool {
        self.all || self.wiki
    }
    pub fn lfs(&self) -> bool {
        self.all || self.lfs
    }
}

/// Repositories excluded from the run.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SkipConfig {
    /// Entries match a bare name or an `owner/name` path,
    /// case-insensitively.
    #[serde(default)]
    pub repos: Vec<String>,
    #[serde(default)]
    pub forks: bool,
    #[serde(default)]
    pub private: bool,
}

/// Daemon configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DaemonConfig {
    /// Time between sync passes.
    #[serde(default = "default_interval")]
    pub interval: String, // "30m"

    /// Skip the immediate pass on startup.
    #[serde(default)]
    pub skip_first: bool,

    /// Treat a failed pass as fatal instead of waiting for the next
    /// tick.
    #[serde(default)]
    pub exit_on_error: bool,

    /// PID file location.
    #[serde(default = "default_pid_file")]
    pub pid_file: String,

    /// Log file location for background mode.
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    #[serde(default = "default_log_format")]
    pub format: String, // "compact"

    #[serde(default = "default_true")]
    pub color: bool,
}

// Default value functions
fn default_mirror_interval() -> String {
    DEFAULT_DEST_MIRROR_INTERVAL.to_string()
}
fn default_true() -> bool {
    true
}
fn default_interval() -> String {
    "30m".to_string()
}
fn default_pid_file() -> String {
    if let Ok(runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        format!("{}/mirrorgate.pid", runtime_dir)
    } else {
        "/tmp/mirrorgate.pid".to_string()
    }
}
fn default_log_file() -> String {
    if let Ok(data_home) = env::var("XDG_DATA_HOME") {
        format!("{}/mirrorgate/daemon.log", data_home)
    } else if let Ok(home) = env::var("HOME") {
        format!("{}/.local/share/mirrorgate/daemon.log", home)
    } else {
        "/tmp/mirrorgate-daemon.log".to_string()
    }
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            skip_first: false,
            exit_on_error: false,
            pid_file: default_pid_file(),
            log_file: default_log_file(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_true(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: SourceConfig::Github {
                owner: None,
                token: None,
            },
            destination: DestinationConfig::default(),
            sync: SyncFlags::default(),
            migrate: MigrateConfig::default(),
            skip: SkipConfig::default(),
            daemon: DaemonConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, writing a default
    /// template there when none exists yet.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load(&config_path)
        } else {
            let config = Self::default();

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }
            config.save(&config_path)?;

            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load configuration from a specific file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.expand_paths()?;

        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Get the default configuration file path (XDG compliant).
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("mirrorgate").join("config.yml"))
    }

    /// Expand environment variables in configuration paths.
    pub fn expand_paths(&mut self) -> Result<()> {
        self.daemon.pid_file = shellexpand::full(&self.daemon.pid_file)
            .context("Failed to expand pid_file path")?
            .into_owned();

        self.daemon.log_file = shellexpand::full(&self.daemon.log_file)
            .context("Failed to expand log_file path")?
            .into_owned();

        Ok(())
    }

    /// Reject configurations that cannot produce a working run.
    pub fn validate(&self) -> Result<()> {
        if self.destination.url.is_empty() {
            bail!("destination.url is not set");
        }
        if self.destination.token().is_none() {
            bail!("destination.token is not set (or set DEST_TOKEN)");
        }

        match &self.source {
            SourceConfig::Github { owner, .. } => {
                if owner.is_none() && self.source.token().is_none() {
                    bail!("source: set github owner or token (or GITHUB_TOKEN)");
                }
            }
            SourceConfig::Gitea { url, owner, .. } => {
                if url.is_empty() {
                    bail!("source.url is not set");
                }
                if owner.is_none() && self.source.token().is_none() {
                    bail!("source: set gitea owner or token (or GITEA_TOKEN)");
                }
            }
        }

        let interval = self.daemon_interval()?;
        if interval.as_secs() < 60 {
            bail!(
                "daemon.interval too quick: {} (minimum 60s)",
                self.daemon.interval
            );
        }

        Ok(())
    }

    /// Daemon interval as a duration.
    pub fn daemon_interval(&self) -> Result<std::time::Duration> {
        parse_duration(&self.daemon.interval)
            .context("Failed to parse daemon.interval")
            .map(std::time::Duration::from_secs)
    }

    /// Build the run-scoped engine options from this configuration.
    pub fn sync_options(&self, dry_run: bool) -> SyncOptions {
        SyncOptions {
            sync_description: self.sync.description(),
            sync_visibility: self.sync.visibility(),
            sync_topics: self.sync.topics(),
            sync_mirror_interval: self.sync.mirror_interval(),
            dest_mirror_interval: self.destination.mirror_interval.clone(),
            dest_owner: self.destination.owner.clone(),
            migrate_wiki: self.migrate.wiki(),
            migrate_lfs: self.migrate.lfs(),
            source_service: self.source.service_name().to_string(),
            source_token: self.source.token(),
            skip_repos: self.skip.repos.clone(),
            dry_run,
        }
    }
}

/// Parse duration strings like "30m", "1h", "2d" or raw seconds.
pub fn parse_duration(duration_str: &str) -> Result<u64> {
    let duration_str = duration_str.trim().to_lowercase();

    if let Some(value) = duration_str.strip_suffix('s') {
        value.parse::<u64>().context("Invalid seconds value")
    } else if let Some(value) = duration_str.strip_suffix('m') {
        value
            .parse::<u64>()
            .map(|v| v * 60)
            .context("Invalid minutes value")
    } else if let Some(value) = duration_str.strip_suffix('h') {
        value
            .parse::<u64>()
            .map(|v| v * 3600)
            .context("Invalid hours value")
    } else if let Some(value) = duration_str.strip_suffix('d') {
        value
            .parse::<u64>()
            .map(|v| v * 86400)
            .context("Invalid days value")
    } else {
        duration_str
            .parse::<u64>()
            .context("Invalid duration format. Use format like '30m', '1h', '2d'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid_config_yaml() -> &'static str {
        r#"
source:
  provider: github
  owner: "acme"
destination:
  url: "https://gitea.example.com"
  token: "secret"
sync:
  description: true
  topics: true
skip:
  repos: ["acme/legacy", "scratch"]
  forks: true
daemon:
  interval: "1h"
"#
    }

    #[test]
    fn test_yaml_parsing() {
        let config: Config = serde_yaml::from_str(valid_config_yaml()).expect("parse failed");

        assert!(matches!(
            config.source,
            SourceConfig::Github { ref owner, .. } if owner.as_deref() == Some("acme")
        ));
        assert_eq!(config.destination.url, "https://gitea.example.com");
        assert_eq!(config.destination.mirror_interval, "8h0m0s");
        assert!(config.sync.description());
        assert!(config.sync.topics());
        assert!(!config.sync.visibility());
        assert_eq!(config.skip.repos.len(), 2);
        assert!(config.skip.forks);
        assert!(!config.skip.private);
        assert_eq!(config.daemon.interval, "1h");
    }

    #[test]
    fn test_gitea_source_parsing() {
        let yaml = r#"
source:
  provider: gitea
  url: "https://other-gitea.example.com"
  owner: "acme"
destination:
  url: "https://gitea.example.com"
  token: "secret"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(config.source, SourceConfig::Gitea { .. }));
        assert_eq!(config.source.service_name(), "gitea");
        assert_eq!(config.source.owner(), Some("acme"));
    }

    #[test]
    fn test_sync_all_shorthand() {
        let flags = SyncFlags {
            all: true,
            ..Default::default()
        };
        assert!(flags.description());
        assert!(flags.visibility());
        assert!(flags.topics());
        assert!(flags.mirror_interval());

        let migrate = MigrateConfig {
            all: true,
            ..Default::default()
        };
        assert!(migrate.wiki());
        assert!(migrate.lfs());
    }

    #[test]
    fn test_validate_accepts_complete_config() {
        let config: Config = serde_yaml::from_str(valid_config_yaml()).unwrap();
        config.validate().expect("should validate");
    }

    #[test]
    fn test_validate_requires_destination() {
        let mut config: Config = serde_yaml::from_str(valid_config_yaml()).unwrap();
        config.destination.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_fast_interval() {
        let mut config: Config = serde_yaml::from_str(valid_config_yaml()).unwrap();
        config.daemon.interval = "30s".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s").unwrap(), 30);
        assert_eq!(parse_duration("30m").unwrap(), 1800);
        assert_eq!(parse_duration("1h").unwrap(), 3600);
        assert_eq!(parse_duration("2d").unwrap(), 172800);
        assert_eq!(parse_duration("90").unwrap(), 90);
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_sync_options_from_config() {
        let config: Config = serde_yaml::from_str(valid_config_yaml()).unwrap();
        let options = config.sync_options(false);

        assert!(options.sync_description);
        assert!(options.sync_topics);
        assert!(!options.sync_visibility);
        assert_eq!(options.dest_mirror_interval, "8h0m0s");
        assert_eq!(options.source_service, "github");
        assert_eq!(options.skip_repos.len(), 2);
        assert!(!options.dry_run);
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("config.yml");

        let mut config: Config = serde_yaml::from_str(valid_config_yaml()).unwrap();
        config.destination.owner = Some("mirrors".to_string());
        config.save(&config_path).expect("Failed to save config");

        let loaded = Config::load(&config_path).expect("Failed to load config");
        assert_eq!(loaded.destination.owner, Some("mirrors".to_string()));
        assert_eq!(loaded.destination.url, "https://gitea.example.com");
    }

    #[test]
    fn test_config_load_nonexistent_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.yml"));
        assert!(result.is_err());
    }
}
