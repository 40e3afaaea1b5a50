//! VaultSync command-line synchronization tool.
//!
//! Provides subcommands for running reconciliation passes, pushing and
//! pulling individual files, inspecting sync status and recorded conflicts,
//! and generating / validating configuration files.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use console::style;
use tracing_subscriber::EnvFilter;

use vaultsync_core::config::AppConfig;
use vaultsync_core::engine::{SyncEngine, UploadResult};
use vaultsync_core::models::ConflictOutcomeKind;
use vaultsync_core::notify::Notifier;
use vaultsync_core::policy::SyncPolicy;
use vaultsync_core::store::MetaStore;
use vaultsync_core::{HttpRemote, LocalFileTree};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// VaultSync command-line synchronization tool.
#[derive(Parser, Debug)]
#[command(
    name = "vaultsync",
    version,
    about = "Synchronize a local file tree with a VaultSync remote store"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./vaultsync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one full reconciliation pass.
    Sync {
        /// Suppress notification channels (logging only).
        #[arg(long)]
        silent: bool,
    },

    /// Show tracked files and their sync state.
    Status,

    /// Upload a single file now.
    Push {
        /// Relative path inside the tree root.
        path: String,
    },

    /// Download a single file now.
    Pull {
        /// Relative path inside the tree root.
        path: String,

        /// Specific revision to fetch (defaults to the latest).
        #[arg(long)]
        revision: Option<i64>,
    },

    /// Delete a file remotely and drop its local metadata.
    Rm {
        /// Relative path inside the tree root.
        path: String,
    },

    /// Inspect recorded conflicts.
    Conflicts {
        #[command(subcommand)]
        action: ConflictsAction,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./vaultsync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

#[derive(Subcommand, Debug)]
enum ConflictsAction {
    /// List recorded conflicts, newest first.
    List {
        /// Number of results.
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => cmd_init(&output),
        Commands::Validate => cmd_validate(&cli.config),
        command => {
            let config = load_config(&cli.config)?;
            let engine = build_engine(&config)?;

            match command {
                Commands::Sync { silent } => cmd_sync(&engine, silent).await,
                Commands::Status => cmd_status(&engine),
                Commands::Push { path } => cmd_push(&engine, &path).await,
                Commands::Pull { path, revision } => cmd_pull(&engine, &path, revision).await,
                Commands::Rm { path } => cmd_rm(&engine, &path).await,
                Commands::Conflicts { action } => cmd_conflicts(&engine, action),
                Commands::Init { .. } | Commands::Validate => unreachable!(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Wiring helpers
// ---------------------------------------------------------------------------

fn load_config(path: &PathBuf) -> Result<AppConfig> {
    let mut config =
        AppConfig::load_from_file(path).context("failed to load configuration file")?;
    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn build_engine(config: &AppConfig) -> Result<SyncEngine<HttpRemote, LocalFileTree>> {
    std::fs::create_dir_all(&config.storage.data_dir)
        .context("failed to create the data directory")?;
    let store = MetaStore::open(config.storage.data_dir.join("vaultsync.db"))
        .context("failed to open the metadata store")?;
    let store = Arc::new(store);
    let device_id = store.device_id().context("failed to read the device id")?;

    let remote = HttpRemote::from_config(config);
    let tree = LocalFileTree::new(&config.storage.tree_root)
        .context("failed to open the local file tree")?;
    let policy = SyncPolicy::from_config(&config.sync);
    let notifier = Arc::new(Notifier::from_config(&config.notifications));

    Ok(SyncEngine::new(
        store,
        remote,
        tree,
        policy,
        notifier,
        device_id,
        Duration::from_secs(config.sync.network_timeout_secs),
    ))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_sync(engine: &SyncEngine<HttpRemote, LocalFileTree>, silent: bool) -> Result<()> {
    let summary = engine
        .reconcile(silent)
        .await
        .context("reconciliation failed")?;

    println!();
    println!(
        "  {}  downloaded {}, uploaded {}, failed {}",
        style("sync complete").green().bold(),
        summary.downloaded,
        summary.uploaded,
        summary.failed
    );
    if summary.conflicts_resolved > 0 || summary.conflicts_manual > 0 {
        println!(
            "  {}  {} auto-merged, {} need manual resolution",
            style("conflicts").yellow().bold(),
            summary.conflicts_resolved,
            summary.conflicts_manual
        );
    }
    println!();
    Ok(())
}

fn cmd_status(engine: &SyncEngine<HttpRemote, LocalFileTree>) -> Result<()> {
    let records = engine
        .store()
        .list_records()
        .context("failed to list sync records")?;

    if records.is_empty() {
        println!("No files tracked yet. Run 'vaultsync sync' first.");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Path", "Revision", "Parent", "Size", "Last synced"]);
    for record in &records {
        table.add_row(vec![
            Cell::new(&record.path),
            Cell::new(record.revision),
            Cell::new(record.parent_revision),
            Cell::new(record.size),
            Cell::new(record.last_synced_at.format("%Y-%m-%d %H:%M:%S")),
        ]);
    }
    println!("{table}");
    println!("{} files tracked", records.len());
    Ok(())
}

async fn cmd_push(engine: &SyncEngine<HttpRemote, LocalFileTree>, path: &str) -> Result<()> {
    match engine.upload_file(path).await.context("upload failed")? {
        UploadResult::Uploaded { revision } => {
            println!("{} {path} at revision {revision}", style("uploaded").green());
        }
        UploadResult::Merged { revision } => {
            println!(
                "{} {path} merged with the server's edits, now at revision {revision}",
                style("merged").yellow()
            );
        }
        UploadResult::Manual { backup_path } => {
            println!(
                "{} {path} conflicts with the server; its version was saved to {backup_path}",
                style("conflict").red()
            );
            println!("Edit the file to resolve the markers, then push again.");
        }
        UploadResult::PendingResolution => {
            println!(
                "{} {path} still contains conflict markers; resolve them before pushing",
                style("skipped").yellow()
            );
        }
    }
    Ok(())
}

async fn cmd_pull(
    engine: &SyncEngine<HttpRemote, LocalFileTree>,
    path: &str,
    revision: Option<i64>,
) -> Result<()> {
    engine
        .download_file(path, revision)
        .await
        .context("download failed")?;
    println!("{} {path}", style("downloaded").green());
    Ok(())
}

async fn cmd_rm(engine: &SyncEngine<HttpRemote, LocalFileTree>, path: &str) -> Result<()> {
    engine.delete_file(path).await.context("delete failed")?;
    println!("{} {path}", style("deleted").green());
    Ok(())
}

fn cmd_conflicts(
    engine: &SyncEngine<HttpRemote, LocalFileTree>,
    action: ConflictsAction,
) -> Result<()> {
    match action {
        ConflictsAction::List { limit } => {
            let conflicts = engine
                .store()
                .list_conflicts()
                .context("failed to list conflicts")?;

            if conflicts.is_empty() {
                println!("No conflicts recorded.");
                return Ok(());
            }

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["When", "Path", "Server rev", "Claimed", "Outcome", "Backup"]);
            for conflict in conflicts.iter().take(limit) {
                let outcome = match conflict.outcome {
                    ConflictOutcomeKind::AutoMerged => {
                        Cell::new("auto-merged").fg(comfy_table::Color::Green)
                    }
                    ConflictOutcomeKind::Manual => {
                        Cell::new("manual").fg(comfy_table::Color::Yellow)
                    }
                };
                table.add_row(vec![
                    Cell::new(conflict.created_at.format("%Y-%m-%d %H:%M:%S")),
                    Cell::new(&conflict.path),
                    Cell::new(conflict.server_revision),
                    Cell::new(conflict.claimed_parent_revision),
                    outcome,
                    Cell::new(conflict.backup_path.as_deref().unwrap_or("—")),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}

fn cmd_init(output: &PathBuf) -> Result<()> {
    let default_config = r#"# VaultSync Configuration
# See documentation for all available options.

[remote]
base_url = "https://sync.example.com/api"
token_env = "VAULTSYNC_TOKEN"

[sync]
device_name = "my-laptop"
# syncable_extensions = ["md", "txt", "json", "csv", "org", "tex", "yaml", "yml", "toml", "html", "css", "js", "xml"]
ignore_patterns = []
max_upload_size = 0
network_timeout_secs = 30

[storage]
# data_dir = "~/.local/share/vaultsync"
tree_root = "."

[notifications]
# slack_webhook_url = "https://hooks.slack.com/services/..."

[log]
level = "info"
"#;

    if output.exists() {
        anyhow::bail!("refusing to overwrite existing file: {}", output.display());
    }
    std::fs::write(output, default_config).context("failed to write config file")?;
    println!("Wrote default configuration to {}", output.display());
    Ok(())
}

fn cmd_validate(path: &PathBuf) -> Result<()> {
    let config = load_config(path)?;
    println!(
        "{} configuration is valid (remote: {})",
        style("ok").green().bold(),
        config.remote.base_url
    );
    if config.remote.token.is_none() {
        println!(
            "{} token variable '{}' is not set; sync will refuse to run",
            style("warning").yellow(),
            config.remote.token_env
        );
    }
    Ok(())
}
