//! Daemon Infrastructure - Background service for periodic mirror sync
//!
//! Runs the sync engine on a configurable interval with PID file
//! management and graceful shutdown handling. Retrying a failed pass
//! happens here, on the next tick; the engine itself never retries.

use crate::config::Config;
use crate::gitea::GiteaClient;
use crate::source::SourceHost;
use crate::sync::SyncEngine;

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Daemon state and control.
pub struct Daemon {
    config: Arc<Config>,
    source: SourceHost,
    engine: SyncEngine<GiteaClient>,
    shutdown_sender: broadcast::Sender<()>,
    is_running: Arc<AtomicBool>,
    pid_file_path: Option<PathBuf>,
}

/// Daemon statistics and status.
#[derive(Debug, Clone)]
pub struct DaemonStatus {
    pub is_running: bool,
    pub uptime: Duration,
    pub next_sync_in: Option<Duration>,
}

impl Daemon {
    pub fn new(config: Config, source: SourceHost, engine: SyncEngine<GiteaClient>) -> Result<Self> {
        let config = Arc::new(config);

        let (shutdown_sender, _) = broadcast::channel(1);
        let is_running = Arc::new(AtomicBool::new(false));

        let pid_file_path = if !config.daemon.pid_file.is_empty() {
            Some(PathBuf::from(&config.daemon.pid_file))
        } else {
            None
        };

        Ok(Self {
            config,
            source,
            engine,
            shutdown_sender,
            is_running,
            pid_file_path,
        })
    }

    /// Run the daemon loop in the foreground until shut down.
    pub async fn run(&mut self) -> Result<()> {
        info!("Starting mirrorgate daemon");

        self.write_pid_file().context("Failed to write PID file")?;
        self.is_running.store(true, Ordering::SeqCst);

        let shutdown_receiver = self.shutdown_sender.subscribe();
        let is_running = self.is_running.clone();

        let shutdown_sender = self.shutdown_sender.clone();
        tokio::spawn(async move {
            Self::wait_for_shutdown_signal().await;
            info!("Shutdown signal received, stopping daemon...");
            is_running.store(false, Ordering::SeqCst);
            let _ = shutdown_sender.send(());
        });

        let result = self.daemon_loop(shutdown_receiver).await;

        self.cleanup().context("Failed to cleanup daemon")?;

        result
    }

    /// Start the daemon as a background service (Unix platforms).
    #[cfg(unix)]
    pub fn daemonize(&self) -> Result<()> {
        use daemonize::Daemonize;

        let log_file = if !self.config.daemon.log_file.is_empty() {
            if let Some(parent) = PathBuf::from(&self.config.daemon.log_file).parent() {
                fs::create_dir_all(parent).context("Failed to create log file directory")?;
            }
            let log_file = fs::File::create(&self.config.daemon.log_file)
                .context("Failed to create log file")?;
            Some(log_file)
        } else {
            None
        };

        let mut daemonize = Daemonize::new();

        if let Some(pid_path) = &self.pid_file_path {
            daemonize = daemonize.pid_file(pid_path);
        }

        if let Some(log_file) = log_file {
            daemonize = daemonize.stdout(log_file.try_clone()?).stderr(log_file);
        }

        daemonize.start().context("Failed to daemonize process")?;

        info!("mirrorgate daemon started as background service");
        Ok(())
    }

    /// Stop a running daemon by sending SIGTERM to the recorded PID.
    pub async fn stop(&self) -> Result<()> {
        info!("Sending shutdown signal to daemon");

        if let Some(pid_file) = &self.pid_file_path {
            if pid_file.exists() {
                let pid_str = fs::read_to_string(pid_file).context("Failed to read PID file")?;

                let pid: u32 = pid_str.trim().parse().context("Invalid PID in PID file")?;

                #[cfg(unix)]
                {
                    use nix::sys::signal::{self, Signal};
                    use nix::unistd::Pid;

                    let pid = Pid::from_raw(pid as i32);
                    signal::kill(pid, Signal::SIGTERM)
                        .context("Failed to send SIGTERM to daemon process")?;
                }

                #[cfg(not(unix))]
                {
                    warn!("Daemon stop not implemented for this platform");
                }

                info!("Shutdown signal sent to daemon process {}", pid);
            } else {
                warn!("PID file not found, daemon may not be running");
            }
        } else {
            warn!("No PID file configured, cannot stop daemon");
        }

        Ok(())
    }

    /// Get current daemon status.
    pub fn status(&self, start_time: Instant) -> DaemonStatus {
        let is_running = self.is_running.load(Ordering::SeqCst);
        let uptime = start_time.elapsed();

        let next_sync_in = if is_running {
            Some(
                self.config
                    .daemon_interval()
                    .unwrap_or(Duration::from_secs(1800)),
            )
        } else {
            None
        };

        DaemonStatus {
            is_running,
            uptime,
            next_sync_in,
        }
    }

    /// Main daemon loop - runs a sync pass per tick.
    async fn daemon_loop(&self, mut shutdown_receiver: broadcast::Receiver<()>) -> Result<()> {
        let sync_interval = self
            .config
            .daemon_interval()
            .context("Failed to parse daemon sync interval")?;
        let mut interval_timer = interval(sync_interval);

        info!("Daemon loop started with interval: {:?}", sync_interval);

        // The first tick fires immediately; consuming it here makes
        // skip_first the only thing deciding whether a pass runs at
        // startup.
        interval_timer.tick().await;

        if self.config.daemon.skip_first {
            info!("Skipping first sync pass");
        } else {
            self.run_pass().await?;
        }

        loop {
            tokio::select! {
                _ = shutdown_receiver.recv() => {
                    info!("Shutdown signal received in daemon loop");
                    break;
                }

                _ = interval_timer.tick() => {
                    if !self.is_running.load(Ordering::SeqCst) {
                        break;
                    }
                    self.run_pass().await?;
                }
            }
        }

        info!("Daemon loop exiting");
        Ok(())
    }

    /// One listing-plus-reconciliation pass. Only fatal when
    /// exit_on_error is configured.
    async fn run_pass(&self) -> Result<()> {
        debug!("Starting scheduled sync pass");

        let repos = match self
            .source
            .list_repos(self.config.skip.private, self.config.skip.forks)
            .await
        {
            Ok(repos) => repos,
            Err(e) => {
                error!("Could not list source repositories: {:?}", e);
                if self.config.daemon.exit_on_error {
                    return Err(e);
                }
                return Ok(());
            }
        };

        let summary = self.engine.run(&repos).await;

        if summary.failed > 0 && self.config.daemon.exit_on_error {
            bail!(
                "{} of {} repositories failed to sync",
                summary.failed,
                summary.total
            );
        }

        Ok(())
    }

    /// Wait for shutdown signals (Ctrl+C).
    async fn wait_for_shutdown_signal() {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        debug!("Ctrl+C received");
    }

    /// Write PID file for daemon process management.
    fn write_pid_file(&self) -> Result<()> {
        if let Some(pid_file) = &self.pid_file_path {
            let pid = std::process::id();

            if let Some(parent) = pid_file.parent() {
                fs::create_dir_all(parent).context("Failed to create PID file directory")?;
            }

            fs::write(pid_file, pid.to_string()).context("Failed to write PID file")?;

            info!("PID file written: {} (PID: {})", pid_file.display(), pid);
        }

        Ok(())
    }

    /// Remove PID file and perform cleanup.
    fn cleanup(&self) -> Result<()> {
        if let Some(pid_file) = &self.pid_file_path {
            if pid_file.exists() {
                fs::remove_file(pid_file).context("Failed to remove PID file")?;
                info!("PID file removed: {}", pid_file.display());
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Daemon cleanup completed");
        Ok(())
    }
}

/// Check if daemon is currently running by checking PID file.
pub fn is_daemon_running(config: &Config) -> Result<bool> {
    if !config.daemon.pid_file.is_empty() {
        let pid_file = PathBuf::from(&config.daemon.pid_file);

        if pid_file.exists() {
            let pid_str = fs::read_to_string(&pid_file).context("Failed to read PID file")?;

            let pid: u32 = pid_str.trim().parse().context("Invalid PID in PID file")?;

            #[cfg(unix)]
            {
                use nix::errno::Errno;
                use nix::sys::signal;
                use nix::unistd::Pid;

                let pid = Pid::from_raw(pid as i32);
                match signal::kill(pid, None) {
                    Ok(_) => return Ok(true),
                    Err(Errno::ESRCH) => {
                        // Stale PID file from a dead process.
                        let _ = fs::remove_file(&pid_file);
                        return Ok(false);
                    }
                    Err(_) => return Ok(true),
                }
            }

            #[cfg(not(unix))]
            {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_pid_file_means_not_running() {
        let temp_dir = tempdir().unwrap();
        let pid_file = temp_dir.path().join("test.pid");

        let mut config = Config::default();
        config.daemon.pid_file = pid_file.to_string_lossy().to_string();

        assert!(!pid_file.exists());
        assert!(!is_daemon_running(&config).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_pid_file_is_removed() {
        let temp_dir = tempdir().unwrap();
        let pid_file = temp_dir.path().join("test.pid");

        // A PID that almost certainly does not exist.
        std::fs::write(&pid_file, "999999").unwrap();

        let mut config = Config::default();
        config.daemon.pid_file = pid_file.to_string_lossy().to_string();

        assert!(!is_daemon_running(&config).unwrap());
        assert!(!pid_file.exists());
    }

    #[test]
    fn test_daemon_status_when_stopped() {
        let status = DaemonStatus {
            is_running: false,
            uptime: Duration::from_secs(0),
            next_sync_in: None,
        };

        assert!(!status.is_running);
        assert!(status.next_sync_in.is_none());
    }
}
