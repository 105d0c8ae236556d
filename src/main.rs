// ABOUTME: Main entry point for the meshline chat orchestration server
// ABOUTME: Initializes logging, config, stores, transport clients, bridges, and the HTTP surface

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mesh_core::{
    ChatOrchestrator, ChatStore, IdentityIssuer, MemoryStore, SqliteStore, ThreadRegistry,
    UserDirectory,
};
use meshline::bridge_host::BridgeHost;
use meshline::config::Config;
use meshline::http::{start_http_server, AppState};
use meshline::metrics;
use meshline::responder::{build_responder, OrchestratorTrigger};
use meshline::transport_client::{RestChatTransport, RestIdentityService};

#[derive(Parser, Debug)]
#[command(name = "meshline", about = "Chat orchestration over a managed transport")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Log panics before the process dies
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("PANIC: {}", panic_info);
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting meshline");

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load_from(&cli.config)?;

    tracing::info!(
        endpoint = %config.transport.endpoint_url,
        storage = %config.storage.backend,
        http_port = config.http.port,
        users = config.users.len(),
        "Configuration loaded"
    );

    let metrics_handle = metrics::init_metrics()?;

    let store: Arc<dyn ChatStore> = match config.storage.backend.as_str() {
        "sqlite" => Arc::new(SqliteStore::new(&config.storage.path)?),
        _ => Arc::new(MemoryStore::new()),
    };

    let directory = UserDirectory::new(Arc::clone(&store));
    directory.seed(&config.seed_users()).await?;
    let registry = ThreadRegistry::new(Arc::clone(&store));

    let identity = Arc::new(RestIdentityService::new(
        config.transport.endpoint_url.clone(),
        config.transport.access_key.clone(),
    ));
    let transport = Arc::new(RestChatTransport::new(config.transport.endpoint_url.clone()));
    let issuer = Arc::new(IdentityIssuer::new(directory.clone(), identity));
    let orchestrator = Arc::new(ChatOrchestrator::new(
        directory,
        registry,
        issuer,
        transport,
        config.transport.endpoint_url.clone(),
    ));

    let responder = build_responder(&config.responder);
    let trigger = Arc::new(OrchestratorTrigger::new(
        Arc::clone(&orchestrator),
        Arc::clone(&responder),
    ));

    let (events, _) = broadcast::channel(64);
    BridgeHost::new(Arc::clone(&orchestrator), trigger).spawn(events.subscribe());

    let state = Arc::new(AppState {
        orchestrator,
        responder,
        events,
        started_at: Instant::now(),
    });

    start_http_server(&config, state, metrics_handle).await
}
