use anyhow::Context;
use clap::Parser;
use log_query_engine::{
    config::{Config, ObservabilityConfig},
    search::{create_backends, read_records, SearchQuery},
};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "log-query-engine")]
#[command(about = "Run one JSON search query over a JSONL record file", long_about = None)]
struct Args {
    /// Newline-delimited JSON log records
    #[arg(value_name = "RECORDS", env = "LQE_RECORDS")]
    records: PathBuf,

    /// JSON-encoded query, read from stdin when omitted
    #[arg(value_name = "QUERY")]
    query: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    init_tracing(&config.observability);

    tracing::info!("Starting Log Query Engine v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Search backend: {}", config.backend.kind);

    let query_json = match &args.query {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read query file {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read query from stdin")?;
            buffer
        }
    };
    let query: SearchQuery = serde_json::from_str(&query_json).context("invalid query JSON")?;

    let backends = create_backends(&config.backend, &config.search).await?;
    let records = read_records(&args.records)?;
    let loaded = backends.load(records).await?;
    tracing::info!("✅ Loaded {} records from {}", loaded, args.records.display());

    let service = backends.into_service(config.search.clone())?;
    let response = service.search(&query).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable
fn init_tracing(config: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("log_query_engine={}", config.log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
