use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info};

use ingestor::config::IngestorConfig;
use ingestor::server::{AccessGate, AppState, IngestServer, IngestState, UploadResponse};
use ingestor::store::PgStore;
use ingestor::upload::{UploadRequest, UploadService};

/// Streaming analytics ingestion service for distributor exports
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Run the HTTP upload service (default)
    Serve,
    /// Ingest a single export file and print the summary as JSON
    Ingest {
        #[clap(long)]
        file: PathBuf,
        #[clap(long)]
        platform: String,
        /// Reporting date, YYYY-MM-DD
        #[clap(long)]
        reporting_date: String,
        #[clap(long)]
        artist_id: String,
        #[clap(long)]
        uploaded_by: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    // Supports: DEBUG, INFO, WARNING, ERROR, CRITICAL
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    let filter = build_tracing_filter(&log_level);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = match IngestorConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            print_ascii_art();
            serve(config).await
        }
        Command::Ingest { file, platform, reporting_date, artist_id, uploaded_by } => {
            let request = UploadRequest::from_file(&file, &platform, &reporting_date, &artist_id, uploaded_by.or(config.admin_user_id)).await?;
            ingest_once(config, request).await
        }
    };

    if let Err(e) = result {
        error!("❌ Ingestor failed: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn serve(config: IngestorConfig) -> Result<()> {
    info!("🚀 Starting analytics ingestor on port {}", config.http_port);

    let store = PgStore::connect(&config.database_url, config.db_max_connections).await?;
    let status = Arc::new(RwLock::new(IngestState { database_connected: true, ..IngestState::default() }));

    let app = AppState {
        service: UploadService::new(Arc::new(store.clone()), config.upload_settings()),
        status,
        gate: AccessGate::new(config.admin_token.clone(), config.admin_user_id),
    };

    let shutdown = setup_shutdown_handler();
    let server = IngestServer::new(config.http_port, config.max_upload_bytes, app);
    let result = server.run(shutdown).await;

    info!("🛑 Shutting down ingestor...");
    store.close().await;

    if result.is_ok() {
        info!("✅ Ingestor shutdown complete");
    }
    result
}

async fn ingest_once(config: IngestorConfig, request: UploadRequest) -> Result<()> {
    let store = PgStore::connect(&config.database_url, config.db_max_connections).await?;
    let service = UploadService::new(Arc::new(store.clone()), config.upload_settings());

    let outcome = service.process(request).await;
    store.close().await;

    let summary = outcome?;
    println!("{}", serde_json::to_string_pretty(&UploadResponse::from(&summary))?);
    Ok(())
}

fn print_ascii_art() {
    println!(
        r#"
██╗███╗   ██╗ ██████╗ ███████╗███████╗████████╗ ██████╗ ██████╗
██║████╗  ██║██╔════╝ ██╔════╝██╔════╝╚══██╔══╝██╔═══██╗██╔══██╗
██║██╔██╗ ██║██║  ███╗█████╗  ███████╗   ██║   ██║   ██║██████╔╝
██║██║╚██╗██║██║   ██║██╔══╝  ╚════██║   ██║   ██║   ██║██╔══██╗
██║██║ ╚████║╚██████╔╝███████╗███████║   ██║   ╚██████╔╝██║  ██║
╚═╝╚═╝  ╚═══╝ ╚═════╝ ╚══════╝╚══════╝   ╚═╝    ╚═════╝ ╚═╝  ╚═╝
"#
    );
    println!();
}

fn setup_shutdown_handler() -> Arc<tokio::sync::Notify> {
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        info!("🛑 Received shutdown signal");
        shutdown_clone.notify_waiters();
    });

    shutdown
}

/// Build tracing filter string from Python-style log level
fn build_tracing_filter(log_level: &str) -> String {
    let rust_level = match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" | "WARN" => "warn",
        "ERROR" => "error",
        "CRITICAL" => "error",
        _ => "info",
    };
    let sqlx_level = if rust_level == "debug" { "info" } else { "warn" };
    format!("ingestor={},sqlx={},tower_http={}", rust_level, sqlx_level, rust_level)
}
