use std::sync::Arc;

use clap::Parser;
use concierge_core::config::StorageBackend;
use concierge_core::{
    BookingStore, ConciergeConfig, ConciergeError, ContactError, ContactSource, GeminiEmbeddingClient,
    GeminiEmbeddingConfig, GeminiGenerationClient, GeminiGenerationConfig, GoogleSheetContacts,
    MemoryBookingStore, MemoryVectorIndex, PgBookingStore, PgVectorIndex, SerpApiSearch,
    StaticContacts, VectorIndex, WebSearch, WebSearchError,
};
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use concierge_server::server;
use concierge_server::subsystems::orchestrator::{Backends, Concierge, ConciergeSettings};
use concierge_server::subsystems::sessions::{run_session_sweeper, MemorySessionStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "concierge.toml")]
    config: String,

    /// Check every collaborator once, print the report and exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match ConciergeConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging: RUST_LOG when set, else the configured level
    fmt().with_env_filter(log_filter(&config.service.log_level)).init();

    let backends = match build_backends(&config).await {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Failed to initialise backends: {}", e);
            std::process::exit(1);
        }
    };

    let concierge = Arc::new(Concierge::new(backends, ConciergeSettings::from(&config)));

    if args.health {
        let report = concierge.health().await;
        for (name, component) in &report.services {
            let mark = if component.ok { "✅" } else { "❌" };
            println!("{} {}: {}", mark, name, component.detail);
        }
        if !report.is_healthy() {
            println!("❌ Concierge health check: {}", report.status);
            std::process::exit(1);
        }
        println!("✅ Concierge health check passed");
        return Ok(());
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    tokio::spawn(run_session_sweeper(
        concierge.session_store(),
        concierge.session_locks(),
        config.sessions.idle_timeout_minutes,
        config.sessions.sweep_interval_minutes,
        tx.subscribe(),
    ));

    if config.http.enabled {
        let http_concierge = concierge.clone();
        let http_config = config.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = concierge_server::http::start_http_server(
                http_concierge,
                http_config,
                http_shutdown,
            )
            .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, concierge, tx.subscribe()).await?;

    Ok(())
}

fn log_filter(configured: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Wire the configured adapters. Gemini keys are mandatory; the contact
/// spreadsheet is optional and falls back to the configured entries; web
/// search is off without a SerpAPI key.
async fn build_backends(config: &ConciergeConfig) -> Result<Backends, ConciergeError> {
    let (bookings, index): (Arc<dyn BookingStore>, Arc<dyn VectorIndex>) =
        match config.storage.backend {
            StorageBackend::Postgres => {
                let pool = concierge_core::db::create_pool(&config.database).await?;
                concierge_core::db::ensure_schema(&pool, config.embedding.dimensions).await?;
                tracing::info!("Using PostgreSQL storage");
                (
                    Arc::new(PgBookingStore::new(pool.clone())),
                    Arc::new(PgVectorIndex::new(pool)),
                )
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; bookings are lost on restart");
                (
                    Arc::new(MemoryBookingStore::new()),
                    Arc::new(MemoryVectorIndex::new()),
                )
            }
        };

    let embedder = GeminiEmbeddingClient::new(GeminiEmbeddingConfig::new(None, &config.embedding))?;
    let generator =
        GeminiGenerationClient::new(GeminiGenerationConfig::new(None, &config.generation))?;

    let contacts: Arc<dyn ContactSource> = match GoogleSheetContacts::new(None, &config.contacts) {
        Ok(sheet) => Arc::new(sheet),
        Err(ContactError::NotConfigured) => {
            tracing::info!("Contact spreadsheet not configured; serving fallback contacts");
            Arc::new(StaticContacts::new(config.contacts.fallback.clone()))
        }
        Err(e) => return Err(e.into()),
    };

    let web_search: Option<Arc<dyn WebSearch>> = match SerpApiSearch::new(None, &config.web_search) {
        Ok(search) => Some(Arc::new(search)),
        Err(WebSearchError::NotConfigured) => {
            tracing::info!("SerpAPI key not set; web search fallback disabled");
            None
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Backends {
        sessions: Arc::new(MemorySessionStore::new()),
        bookings,
        index,
        embedder: Arc::new(embedder),
        generator: Arc::new(generator),
        contacts,
        web_search,
    })
}
