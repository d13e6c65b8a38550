//! treesync command-line tool.
//!
//! Provides subcommands for synchronizing serialized trees into their
//! databases, inspecting stored items and the history ledger, and generating
//! / validating configuration files.

mod inspect;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use tracing::info;
use tracing_subscriber::EnvFilter;

use treesync_core::config::AppConfig;
use treesync_core::sync_engine::{SyncEngine, SyncStats};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// treesync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "treesync",
    version,
    about = "Synchronize serialized content trees into content databases"
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "./treesync.toml")]
    config: PathBuf,

    /// Override the configured log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synchronize every configured database.
    Sync {
        /// Only synchronize this database.
        #[arg(short, long)]
        database: Option<String>,

        /// Stage the source data and stop before writing anything.
        #[arg(long)]
        stage_only: bool,

        /// Rewrite every field of every existing item.
        #[arg(long)]
        force: bool,

        /// Print the full run log of every database.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./treesync.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,

    /// Show a stored item with its fields.
    Show {
        /// Item ID.
        id: String,

        /// Database to read from.
        #[arg(short, long, default_value = "master")]
        database: String,
    },

    /// Show recent history ledger entries.
    History {
        /// Database to read from.
        #[arg(short, long, default_value = "master")]
        database: String,

        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        config,
        log_level,
        command,
    } = cli;
    let log_level = log_level.as_deref();

    match command {
        Commands::Init { output } => {
            init_tracing(log_level.unwrap_or("warn"));
            cmd_init(&output)
        }
        Commands::Validate => {
            init_tracing(log_level.unwrap_or("warn"));
            cmd_validate(&config)
        }
        Commands::Sync {
            database,
            stage_only,
            force,
            verbose,
        } => {
            let config = load_config(&config, log_level)?;
            cmd_sync(config, database.as_deref(), stage_only, force, verbose)
        }
        Commands::Show { id, database } => {
            let config = load_config(&config, log_level)?;
            inspect::show_item(&config, &database, &id)
        }
        Commands::History { database, limit } => {
            let config = load_config(&config, log_level)?;
            inspect::show_history(&config, &database, limit)
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// Load and validate the config, then start logging at the configured level
/// unless `--log-level` overrides it.
fn load_config(path: &Path, log_level: Option<&str>) -> Result<AppConfig> {
    let config =
        AppConfig::load_and_validate(path).context("failed to load configuration file")?;
    init_tracing(log_level.unwrap_or(&config.general.log_level));
    Ok(config)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

/// Written by `treesync init`. Cache eviction and link/search index refresh
/// need reactors registered by an embedding application, so their flags are
/// left out here.
const DEFAULT_CONFIG: &str = r#"# treesync configuration

[general]
log_level = "info"
data_dir = "./data"
# abort | continue
failure_policy = "abort"
user = "treesync"
publish_after_sync = true

[options]
force_update_all_fields = false
stage_data_without_write = false
update_history = true
update_publish_queue = true
allow_template_changes = true
lookup_blob_ids = true

# One entry per tree root. Strategies: mirror-exact, add-new-items-only, never-overwrite.
[[roots]]
name = "content"
database = "master"
source = "./serialization/content"
path = "/sitecore/content"
strategy = "mirror-exact"
exclusions = []
"#;

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, DEFAULT_CONFIG).context("failed to write config file")?;

    println!("{}", style::success(&format!("Default configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Point each [[roots]] entry at a directory of serialized items");
    println!("  2. Validate with: treesync validate --config {}", output.display());
    println!("  3. Synchronize with: treesync sync --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let config = AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  {}", style::success("TOML structure is valid"));

    match config.validate() {
        Ok(()) => println!("  {}", style::success("All required fields are valid")),
        Err(e) => {
            println!("  {}", style::error(&format!("Validation error: {}", e)));
            anyhow::bail!("configuration validation failed");
        }
    }

    for root in &config.roots {
        if !root.source.is_dir() {
            println!(
                "  {}",
                style::warn(&format!(
                    "Root '{}': source directory {} does not exist",
                    root.name,
                    root.source.display()
                ))
            );
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Data directory : {}", config.general.data_dir.display());
    println!("  Failure policy : {:?}", config.general.failure_policy);
    println!("  Databases      : {}", config.database_names().join(", "));
    println!("  Roots          : {}", config.roots.len());
    println!();
    println!("Configuration is valid.");

    Ok(())
}

fn cmd_sync(
    mut config: AppConfig,
    database: Option<&str>,
    stage_only: bool,
    force: bool,
    verbose: bool,
) -> Result<()> {
    config.options.stage_data_without_write |= stage_only;
    config.options.force_update_all_fields |= force;

    info!(
        databases = config.database_names().len(),
        stage_only = config.options.stage_data_without_write,
        "starting sync"
    );
    let engine = SyncEngine::new(config);
    let stats = engine.run_sync(database).context("sync failed")?;

    print_sync_stats(&stats, verbose);

    let failed = stats.failed_databases().count();
    if failed > 0 {
        anyhow::bail!("{} database(s) failed to synchronize", failed);
    }
    Ok(())
}

fn print_sync_stats(stats: &SyncStats, verbose: bool) {
    println!();
    println!("{}", style::header("Sync Summary"));
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Database", "Staged", "Created", "Updated", "Deleted", "Field writes", "Status",
    ]);

    for report in &stats.databases {
        let status = match (&report.failure, &report.summary) {
            (Some(_), _) => Cell::new("✗ failed").fg(Color::Red),
            (None, Some(s)) if s.stage_only => Cell::new("◌ staged only").fg(Color::Yellow),
            (None, _) => Cell::new("✓ synced").fg(Color::Green),
        };
        match &report.summary {
            Some(s) => table.add_row(vec![
                Cell::new(&report.database),
                Cell::new(s.staged.items),
                Cell::new(s.merged.created),
                Cell::new(s.merged.updated),
                Cell::new(s.merged.deleted),
                Cell::new(s.merged.field_writes),
                status,
            ]),
            None => table.add_row(vec![
                Cell::new(&report.database),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                Cell::new("-"),
                status,
            ]),
        };
    }
    println!("{}", table);

    for report in &stats.databases {
        if let Some(message) = &report.failure {
            println!("{}", style::error(&format!("{}: {}", report.database, message)));
        } else if report.errors_logged > 0 {
            println!(
                "{}",
                style::warn(&format!(
                    "{}: {} error(s) logged during the run",
                    report.database, report.errors_logged
                ))
            );
        }
        if verbose {
            println!();
            println!("{}", style::header(&format!("Run log: {}", report.database)));
            for entry in &report.log {
                println!(
                    "  {} {:<5} {}",
                    style::dim(&entry.at.format("%H:%M:%S").to_string()),
                    format!("{:?}", entry.level).to_uppercase(),
                    entry.message
                );
            }
        }
    }

    println!();
    println!("  Publish queue candidates: {}", stats.publish_candidates.len());
    println!("  Started at : {}", stats.started_at);
    if let Some(completed) = &stats.completed_at {
        println!("  Completed  : {}", completed);
    }
}
