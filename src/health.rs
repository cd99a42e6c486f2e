//! Preflight checks for mirrorgate
//!
//! Verifies configuration, source host access, and destination Gitea
//! access before running sync operations.

use crate::config::{Config, SourceConfig};
use crate::gitea::GiteaClient;
use crate::source::SourceHost;

/// Result of system health checks
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Configuration validity
    pub config: CheckResult,
    /// Source host authentication status
    pub source: CheckResult,
    /// Destination Gitea reachability and authentication
    pub destination: CheckResult,
    /// Source token presence (warning only, not required)
    pub source_token: CheckResult,
}

/// Result of an individual health check
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub passed: bool,
    pub message: String,
    pub details: Option<String>,
    pub is_warning: bool,
}

#[allow(dead_code)]
impl CheckResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn ok_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: None,
            is_warning: false,
        }
    }

    fn error_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            details: Some(details.into()),
            is_warning: false,
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: None,
            is_warning: true,
        }
    }

    fn warning_with_details(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            details: Some(details.into()),
            is_warning: true,
        }
    }
}

impl HealthCheck {
    /// Run all health checks
    pub async fn run(config: &Config) -> Self {
        Self {
            config: Self::check_config(config),
            source: Self::check_source(config).await,
            destination: Self::check_destination(config).await,
            source_token: Self::check_source_token(config),
        }
    }

    /// Check if all required checks passed (excludes warnings)
    pub fn all_passed(&self) -> bool {
        self.config.passed && self.source.passed && self.destination.passed
        // Source token is optional, not included in required checks
    }

    /// Get list of failed checks (errors only, not warnings)
    pub fn errors(&self) -> Vec<&CheckResult> {
        [
            &self.config,
            &self.source,
            &self.destination,
            &self.source_token,
        ]
        .into_iter()
        .filter(|r| !r.passed && !r.is_warning)
        .collect()
    }

    /// Get list of warnings
    pub fn warnings(&self) -> Vec<&CheckResult> {
        [
            &self.config,
            &self.source,
            &self.destination,
            &self.source_token,
        ]
        .into_iter()
        .filter(|r| r.is_warning)
        .collect()
    }

    /// Check configuration validity
    fn check_config(config: &Config) -> CheckResult {
        match config.validate() {
            Ok(()) => CheckResult::ok("Configuration valid"),
            Err(e) => CheckResult::error_with_details("Configuration invalid", e.to_string()),
        }
    }

    /// Check source host access by listing the authenticated identity
    async fn check_source(config: &Config) -> CheckResult {
        match SourceHost::from_config(&config.source, config.sync.topics()) {
            Ok(SourceHost::GitHub(github)) => match github.current_login().await {
                Ok(login) => CheckResult::ok_with_details(
                    "GitHub authentication successful",
                    format!("Username: {}", login),
                ),
                Err(e) => {
                    if config.source.owner().is_some() && config.source.token().is_none() {
                        // Unauthenticated access to a public owner still works.
                        CheckResult::warning_with_details(
                            "GitHub access is unauthenticated",
                            format!("{}\nOnly public repositories will be listed", e),
                        )
                    } else {
                        CheckResult::error_with_details(
                            "GitHub authentication failed",
                            format!("{}\nSet GITHUB_TOKEN or source.token", e),
                        )
                    }
                }
            },
            Ok(SourceHost::Gitea(gitea)) => match gitea.server_version().await {
                Ok(version) => CheckResult::ok_with_details(
                    "Source Gitea reachable",
                    format!("Server version: {}", version),
                ),
                Err(e) => CheckResult::error_with_details(
                    "Source Gitea unreachable",
                    e.to_string(),
                ),
            },
            Err(e) => CheckResult::error_with_details("Source host setup failed", e.to_string()),
        }
    }

    /// Check destination Gitea reachability and token validity
    async fn check_destination(config: &Config) -> CheckResult {
        let token = match config.destination.token() {
            Some(token) => token,
            None => {
                return CheckResult::error_with_details(
                    "Destination token missing",
                    "Set DEST_TOKEN or destination.token",
                )
            }
        };

        let client = match GiteaClient::new(&config.destination.url, &token) {
            Ok(client) => client,
            Err(e) => {
                return CheckResult::error_with_details(
                    "Destination client setup failed",
                    e.to_string(),
                )
            }
        };

        match client.current_user().await {
            Ok(user) => CheckResult::ok_with_details(
                "Destination Gitea authentication successful",
                format!("Username: {}", user.login),
            ),
            Err(e) => CheckResult::error_with_details(
                "Destination Gitea authentication failed",
                e.to_string(),
            ),
        }
    }

    /// Check source token presence (warning only)
    fn check_source_token(config: &Config) -> CheckResult {
        if config.source.token().is_some() {
            return CheckResult::ok("Source token configured");
        }

        let hint = match config.source {
            SourceConfig::Github { .. } => "Set GITHUB_TOKEN to mirror private repositories",
            SourceConfig::Gitea { .. } => "Set GITEA_TOKEN to mirror private repositories",
        };

        CheckResult::warning_with_details("No source token configured", hint)
    }

    /// Get all checks as a slice for iteration
    pub fn all_checks(&self) -> [(&'static str, &CheckResult); 4] {
        [
            ("Configuration", &self.config),
            ("Source Host", &self.source),
            ("Destination Gitea", &self.destination),
            ("Source Token", &self.source_token),
        ]
    }
}
