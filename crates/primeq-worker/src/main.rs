use primeq_client::ConnectionManager;
use primeq_worker::{Consumer, WorkerConfig};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pq-worker")]
#[command(about = "Primality worker: consumes work records and posts verdicts", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long)]
    config: Option<String>,

    /// Connection name, host(port)
    #[arg(long)]
    connection: Option<String>,

    /// Queue to consume work records from
    #[arg(long)]
    inbound: Option<String>,

    /// Queue to post results to
    #[arg(long)]
    outbound: Option<String>,

    /// Miller-Rabin rounds per value
    #[arg(long)]
    rounds: Option<u32>,
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

    // Load configuration
    let mut config = WorkerConfig::load(args.config.as_deref())?;

    // Override with CLI args
    if let Some(connection) = args.connection {
        config.mq.connection = connection;
    }
    if let Some(inbound) = args.inbound {
        config.consumer.inbound_queue = inbound;
    }
    if let Some(outbound) = args.outbound {
        config.consumer.outbound_queue = outbound;
    }
    if let Some(rounds) = args.rounds {
        config.consumer.rounds = rounds;
    }
    config.validate()?;

    let manager = ConnectionManager::from_settings(&config.mq)?.with_client_name("pq-worker");
    let consumer = Arc::new(Consumer::new(manager, config.consumer));

    // Handle shutdown signals
    let signal_consumer = consumer.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal");
        signal_consumer.stop();
    });

    consumer.run().await?;

    Ok(())
}
