use primeq_client::{ConnectionManager, OneShotPublisher};
use primeq_frontend::{create_router, generate, AppState, FrontendConfig, MemoryRecordStore};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pq-frontend")]
#[command(about = "HTTP front end for the prime offload", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// HTTP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Generate this many random records at startup
    #[arg(long, default_value = "0")]
    seed: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = FrontendConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.http.port = port;
    }

    let store = Arc::new(MemoryRecordStore::new());
    if args.seed > 0 {
        generate(store.as_ref(), args.seed, 20).await?;
        tracing::info!("Seeded {} records", args.seed);
    }

    let manager = ConnectionManager::from_settings(&config.mq)?.with_client_name("pq-frontend");
    let state = Arc::new(AppState {
        store,
        publisher: OneShotPublisher::new(manager.clone(), config.queues.inbound_queue.clone()),
        manager,
        results_queue: config.queues.outbound_queue.clone(),
        results_wait: config.queues.results_wait(),
    });

    let app = create_router(state.clone());

    let addr = config.listen_address();
    tracing::info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received shutdown signal");
        })
        .await?;

    state.publisher.shutdown().await;

    Ok(())
}
