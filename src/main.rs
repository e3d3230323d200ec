//! Sheets data API entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sheets_data_api::api::{create_router, AppState};
use sheets_data_api::config::Config;
use sheets_data_api::credentials::CredentialSource;
use sheets_data_api::metrics;
use sheets_data_api::sheets::{RangeReader, SheetsClient};
use sheets_data_api::utils::shutdown_signal;

/// HTTP service exposing a Google Sheets range as JSON.
#[derive(Parser, Debug)]
#[command(name = "sheets-data-api")]
#[command(about = "Serve a Google Sheets range as JSON over HTTP")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port (overrides PORT).
    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// HTTP server port (overrides PORT).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration and credentials without serving.
    CheckConfig,

    /// Read a range once and print it as JSON.
    Fetch {
        /// A1-notation range; defaults to SHEET_RANGE.
        #[arg(short, long)]
        range: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("sheets_data_api=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    // Handle subcommands
    match args.command {
        Some(Command::CheckConfig) => cmd_check_config().await,
        Some(Command::Fetch { range }) => cmd_fetch(range).await,
        Some(Command::Serve { port }) => cmd_serve(port.or(args.port)).await,
        None => cmd_serve(args.port).await,
    }
}

/// Check configuration validity and resolve credentials.
async fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("SHEETS DATA API - CONFIGURATION CHECK");
    println!("======================================================================");

    // Load configuration
    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    // Validate configuration
    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    // Select credential source
    print!("Selecting credential source... ");
    let source = match CredentialSource::from_config(&config) {
        Ok(source) => {
            println!("OK");
            source
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Credential selection failed"));
        }
    };

    // Load credentials
    print!("Loading credentials... ");
    let client = match SheetsClient::from_source(&config, &source).await {
        Ok(client) => {
            println!("OK");
            client
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Credential load failed"));
        }
    };

    // Show configuration summary
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Spreadsheet ID: {}", client.spreadsheet_id());
    println!("  Range: {}", config.sheet_range);
    println!("  Credential Source: {}", source.kind());
    println!("  Identity: {}", client.auth().describe());
    println!("  Sheets API: {}", config.sheets_api_url);
    println!("  Timeout: {}ms", config.http_timeout_ms);
    println!("  Port: {}", config.port);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Read a range once and print it.
async fn cmd_fetch(range: Option<String>) -> anyhow::Result<()> {
    let config = Config::load()?;
    let client = SheetsClient::from_config(&config).await?;
    let range = range.unwrap_or_else(|| config.sheet_range.clone());

    let cells = client.fetch_range(&range).await?;
    println!("{}", serde_json::to_string_pretty(&cells)?);

    Ok(())
}

/// Run the HTTP server.
async fn cmd_serve(port_override: Option<u16>) -> anyhow::Result<()> {
    // Load configuration
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    // Override with CLI args if provided
    if let Some(port) = port_override {
        config.port = port;
    }

    // Credentials load once, before the listener binds
    let client = SheetsClient::from_config(&config).await.map_err(|e| {
        error!("Failed to initialize Sheets client: {}", e);
        e
    })?;

    info!("Configuration loaded successfully");
    info!("Spreadsheet: {}", client.spreadsheet_id());
    info!("Range: {}", config.sheet_range);
    info!("Credentials: {}", client.auth().describe());

    // Initialize metrics
    let metrics_handle = metrics::init_metrics();

    // Create app state
    let app_state =
        AppState::new(Arc::new(client), config.sheet_range.clone()).with_metrics(metrics_handle);
    app_state.set_ready(true);

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}
