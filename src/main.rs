use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mirrorgate::config::LoggingConfig;
use mirrorgate::daemon::{is_daemon_running, Daemon};
use mirrorgate::health::HealthCheck;
use mirrorgate::sync::SyncAction;
use mirrorgate::{Config, GiteaClient, SourceHost, SyncEngine, SyncSummary};

#[derive(Parser)]
#[command(name = "mirrorgate")]
#[command(about = "Keeps Gitea pull mirrors in sync with their source repositories")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Sync mirrors according to configuration
    Sync {
        /// Report what would change without making changes
        #[arg(long)]
        dry_run: bool,
    },

    /// List source repositories that would be synced
    List {
        /// Show repository details
        #[arg(long)]
        details: bool,
    },

    /// Run as daemon
    Daemon {
        #[command(subcommand)]
        daemon_command: DaemonCommands,
    },

    /// System health check and diagnostics
    Doctor,
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Start the daemon
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(long)]
        foreground: bool,
    },

    /// Stop running daemon
    Stop,

    /// Show daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config)?;

    init_logging(cli.verbose, &config.logging);
    info!("Starting mirrorgate v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Init => cmd_init(&config),
        Commands::Sync { dry_run } => cmd_sync(dry_run, &config).await,
        Commands::List { details } => cmd_list(details, &config).await,
        Commands::Daemon { daemon_command } => cmd_daemon(daemon_command, &config).await,
        Commands::Doctor => cmd_doctor(&config).await,
    }
}

/// Initialize logging from the verbosity flag and config defaults.
/// RUST_LOG still wins when set.
fn init_logging(verbose: bool, logging: &LoggingConfig) {
    let default_level = if verbose { "debug" } else { logging.level.as_str() };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "compact" {
        registry
            .with(fmt::layer().compact().with_ansi(logging.color))
            .init();
    } else {
        registry
            .with(fmt::layer().with_ansi(logging.color))
            .init();
    }
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

/// Build the source adapter named by the configuration
fn build_source(config: &Config) -> Result<SourceHost> {
    SourceHost::from_config(&config.source, config.sync.topics())
}

/// Build the destination client and sync engine
fn build_engine(config: &Config, dry_run: bool) -> Result<SyncEngine<GiteaClient>> {
    let token = config
        .destination
        .token()
        .ok_or_else(|| anyhow!("destination token is not set (destination.token or DEST_TOKEN)"))?;

    let client = GiteaClient::new(&config.destination.url, &token)?;
    Ok(SyncEngine::new(client, config.sync_options(dry_run)))
}

/// Ensure a configuration file exists and report its location.
/// Loading already wrote the default template when none existed.
fn cmd_init(config: &Config) -> Result<()> {
    let config_path = Config::default_config_path()?;

    if !config_path.exists() {
        config.save(&config_path)?;
    }

    println!("✅ Configuration ready: {:?}", config_path);
    println!("   Set destination.url and DEST_TOKEN, then run 'mirrorgate doctor'");

    Ok(())
}

/// Sync mirrors according to configuration
async fn cmd_sync(dry_run: bool, config: &Config) -> Result<()> {
    config.validate()?;

    let source = build_source(config)?;
    let engine = build_engine(config, dry_run)?;

    println!("🔍 Listing source repositories ({})...", source.provider_name());
    let repos = source
        .list_repos(config.skip.private, config.skip.forks)
        .await?;
    println!("   Found {} repositories", repos.len());

    if dry_run {
        println!("\n🔍 Dry run mode - no changes will be made");
    }

    let summary = engine.run(&repos).await;
    print_sync_summary(&summary, dry_run);

    if summary.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

/// Print the result of a sync pass
fn print_sync_summary(summary: &SyncSummary, dry_run: bool) {
    if dry_run {
        println!("\n📊 Dry Run Complete");
    } else {
        println!("\n🎉 Synchronization Complete!");
    }
    println!("   📊 Total repositories: {}", summary.total);
    println!("   📥 Migrated: {}", summary.migrated);
    println!("   ✅ Synced: {}", summary.synced);
    println!("   ⏭️  Skipped: {}", summary.skipped);
    println!("   🚫 Mirror mismatches: {}", summary.mismatched);
    println!("   ❌ Failed: {}", summary.failed);
    println!("   ⏱️  Duration: {:.2}s", summary.duration.as_secs_f64());

    if summary.failed > 0 || summary.mismatched > 0 {
        println!("\n🔍 Problems:");
        for outcome in &summary.outcomes {
            if let Some(error) = &outcome.error {
                let icon = match outcome.action {
                    SyncAction::MirrorMismatch => "🚫",
                    _ => "❌",
                };
                println!("   {} {}: {}", icon, outcome.repo, error);
            }
        }
    }
}

/// List source repositories that would be synced
async fn cmd_list(details: bool, config: &Config) -> Result<()> {
    config.validate()?;

    let source = build_source(config)?;
    let repos = source
        .list_repos(config.skip.private, config.skip.forks)
        .await?;

    println!("Repositories ({}): ", repos.len());

    for repo in repos {
        if details {
            println!("📁 {}", repo.full_name());
            if !repo.description.is_empty() {
                println!("   📝 {}", repo.description);
            }
            if repo.private {
                println!("   🔒 Private");
            }
            if repo.archived {
                println!("   🗄️  Archived");
            }
            if !repo.topics.is_empty() {
                println!("   🏷️  {}", repo.topics.join(", "));
            }
            if let Some(url) = repo.clone_urls.first() {
                println!("   🔗 {}", url);
            }
            println!();
        } else {
            println!("  📁 {}", repo.full_name());
        }
    }

    Ok(())
}

/// Handle daemon commands
async fn cmd_daemon(daemon_command: DaemonCommands, config: &Config) -> Result<()> {
    match daemon_command {
        DaemonCommands::Start { foreground } => {
            println!("🚀 Starting mirrorgate daemon...");

            config.validate()?;

            if is_daemon_running(config)? {
                println!("⚠️  Daemon is already running!");
                println!("   Use 'mirrorgate daemon stop' to stop it first");
                return Ok(());
            }

            let source = build_source(config)?;
            let engine = build_engine(config, false)?;
            let mut daemon = Daemon::new(config.clone(), source, engine)?;

            if foreground {
                println!("🖥️  Running in foreground mode (Ctrl+C to stop)");
                daemon.run().await?;
            } else {
                #[cfg(unix)]
                {
                    daemon.daemonize()?;
                    daemon.run().await?;
                }

                #[cfg(not(unix))]
                {
                    println!("❌ Background daemon mode not supported on this platform");
                    println!("   Use --foreground to run in foreground mode");
                    return Ok(());
                }
            }
        }

        DaemonCommands::Stop => {
            println!("🛑 Stopping mirrorgate daemon...");

            if !is_daemon_running(config)? {
                println!("⚠️  No daemon appears to be running");
                return Ok(());
            }

            let source = build_source(config)?;
            let engine = build_engine(config, false)?;
            let daemon = Daemon::new(config.clone(), source, engine)?;
            daemon.stop().await?;

            println!("✅ Daemon stop signal sent");
        }

        DaemonCommands::Status => {
            println!("📊 mirrorgate Daemon Status");

            if is_daemon_running(config)? {
                println!("   🟢 Status: Running");
                println!("   🔄 Sync interval: {}", config.daemon.interval);
                println!("   📄 PID file: {}", config.daemon.pid_file);

                if !config.daemon.log_file.is_empty() {
                    println!("   📄 Log file: {}", config.daemon.log_file);
                }
            } else {
                println!("   🔴 Status: Not running");
                println!("   💡 Use 'mirrorgate daemon start' to start the daemon");
            }
        }
    }

    Ok(())
}

/// System health check and diagnostics
async fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config).await;
    print_health_report(&health);

    if !health.all_passed() {
        std::process::exit(1);
    }

    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    use mirrorgate::health::CheckResult;

    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning {
                "⚠️ "
            } else {
                "✅"
            }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 mirrorgate System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
    }
}
