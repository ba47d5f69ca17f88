use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use scribe_core::provider::LlmClient;
use scribe_engine::{Engine, EngineConfig};
use scribe_llm::{AnthropicClient, ReliableLlm};
use scribe_store::{
    builtin_configs, load_configs, DatasetCatalog, SessionStore, SessionStoreConfig,
};
use scribe_telemetry::{init_telemetry, TelemetryConfig};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Natural-language query server over multi-tenant SQLite datasets.
#[derive(Parser, Debug)]
#[command(name = "scribe", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Directory holding the dataset SQLite files.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Dataset catalog file (JSON). Defaults to the built-in catalog.
    #[arg(long)]
    datasets: Option<PathBuf>,

    /// Disable the SQLite sink for warn-level logs.
    #[arg(long)]
    no_log_db: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let guard = init_telemetry(TelemetryConfig {
        log_to_sqlite: !cli.no_log_db,
        ..TelemetryConfig::default()
    });

    tracing::info!("Starting scribe server");

    // Dataset catalog
    let data_dir = cli
        .data_dir
        .unwrap_or_else(|| dirs_home().join(".scribe").join("data"));
    std::fs::create_dir_all(&data_dir).expect("Failed to create data directory");

    let configs = match &cli.datasets {
        Some(path) => load_configs(path).expect("Failed to load dataset catalog"),
        None => builtin_configs(&data_dir),
    };
    let catalog = Arc::new(DatasetCatalog::open(configs).expect("Failed to open dataset catalog"));
    tracing::info!(datasets = ?catalog.ids(), "Catalog opened");

    // Model provider behind retry + circuit breaker. The API key comes from
    // ANTHROPIC_API_KEY; SCRIBE_MODEL overrides the default model.
    let client = AnthropicClient::from_env().expect("Failed to configure Anthropic client");
    let llm: Arc<dyn LlmClient> = Arc::new(ReliableLlm::with_defaults(client));

    let sessions = Arc::new(SessionStore::new(SessionStoreConfig::default()));
    let mut engine = Engine::new(
        llm,
        Arc::clone(&catalog),
        Arc::clone(&sessions),
        EngineConfig::default(),
    )
    .expect("Failed to build engine");
    if let Some(metrics) = guard.metrics() {
        engine = engine.with_metrics(metrics);
    }

    // Drop sessions nobody has touched within the idle TTL (every 60s)
    let sweeper = Arc::clone(&sessions);
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tick.tick().await;
            let evicted = sweeper.evict_idle();
            if evicted > 0 {
                tracing::info!(evicted, "Idle sessions evicted");
            }
        }
    });

    // Start server
    let config = scribe_server::ServerConfig {
        port: cli.port,
        ..Default::default()
    };
    let port = config.port;
    let _handle = scribe_server::start(config, Arc::new(engine), guard.metrics())
        .await
        .expect("Failed to start server");

    tracing::info!(port = port, "scribe server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
