//! riskqa: grounded Q&A over financial risk documents.
//!
//! This is the application entry point. It loads configuration from a TOML
//! file, initializes tracing, constructs the shared state (OpenAI client and
//! the lazily loaded vector index), sets up the Axum router, and starts the
//! HTTP server.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use riskqa::config::{AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use riskqa::http::start_server;
use riskqa::routes::create_router;
use riskqa::state::AppState;

/// riskqa: grounded Q&A over financial risk documents
#[derive(Parser, Debug)]
#[command(name = "riskqa", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "riskqa=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration before tracing so the log format setting applies
    let config = AppConfig::load(&args.config)?;

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Loaded configuration");
    tracing::info!(
        chat_model = %config.openai.chat_model,
        embedding_model = %config.openai.embedding_model,
        has_api_key = config.openai.api_key.is_some(),
        index_dir = %config.index.dir,
        "Service configured"
    );
    if config.openai.api_key.is_none() {
        tracing::warn!("No OpenAI API key configured - /ask will answer in dev mode");
    }

    // Create application state; the index loads lazily on first use
    let state = AppState::new(config.clone());

    // Create router
    let app = create_router(state);

    // Start server (blocks until shutdown)
    start_server(app, &config).await?;

    Ok(())
}
