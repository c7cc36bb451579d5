//! kinetic-dr (Delta Rules) - motion delta-rule service and tools
//!
//! `serve` runs the HTTP API; the other subcommands work directly on the
//! data folder's database.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kinetic_common::codec::Delimiter;
use kinetic_common::config::{default_config_path, RootFolderInitializer, RootFolderResolver, TomlConfig, ROOT_FOLDER_ENV};
use kinetic_dr::{build_router, commands, AppState};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "kinetic-dr", version, about = "Motion delta-rule service")]
struct Cli {
    /// Data folder holding kinetic.db
    #[arg(long, global = true, env = ROOT_FOLDER_ENV)]
    root_folder: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Write every motion's delta rules as delimited text
    Export {
        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Comma instead of the configured delimiter
        #[arg(long)]
        comma: bool,
    },
    /// Apply a delimited document to the delta tables
    Import { file: PathBuf },
    /// Seed a table from a JSON array of records
    Load {
        #[arg(long)]
        table: String,
        file: PathBuf,
    },
    /// Summarize one motion's grouping and relationships
    Report { motion_id: String },
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(default_config_path);
    let (config, config_warnings) = TomlConfig::load_collecting_warnings(config_path.as_deref());
    init_tracing(&config)?;
    for warning in config_warnings {
        warn!("{}", warning);
    }

    info!(
        "Starting Kinetic Delta Rules (kinetic-dr) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new(cli.root_folder.clone()).resolve(&config);
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());
    let store = commands::open_store(&db_path).await?;

    match cli.command {
        Command::Serve { port } => {
            let port = port.unwrap_or(config.port);
            let app = build_router(AppState::new(store, config));

            let addr = format!("127.0.0.1:{}", port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding {}", addr))?;
            info!("kinetic-dr listening on http://{}", addr);
            info!("Health check: http://{}/health", addr);

            axum::serve(listener, app).await?;
        }
        Command::Export { out, comma } => {
            let delimiter = if comma { Delimiter::Comma } else { config.exchange.delimiter };
            let text = commands::export(&store, delimiter).await?;
            match out {
                Some(path) => {
                    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
                    info!("Exported delta rules to {}", path.display());
                }
                None => print!("{}", text),
            }
        }
        Command::Import { file } => {
            let report = commands::import(&store, &file).await?;
            for problem in report.errors.iter().chain(&report.sync_warnings) {
                warn!("{}", problem);
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Load { table, file } => {
            let stored = commands::load_table(&store, &table, &file).await?;
            println!("{} records stored in {}", stored, table);
        }
        Command::Report { motion_id } => {
            print!("{}", commands::report(&store, &config, &motion_id).await?);
        }
    }

    Ok(())
}
