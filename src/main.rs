use chain_indexer_service::blockchain::{self, SolanaClient, YellowstoneConnector};
use chain_indexer_service::config::Config;
use chain_indexer_service::{db, AppState};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: chain-indexer-service [backfill <from_slot> <to_slot>]";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Run,
    Backfill { from_slot: u64, to_slot: u64 },
}

fn parse_command(args: &[String]) -> Result<Command, String> {
    match args {
        [] => Ok(Command::Run),
        [command, from, to] if command == "backfill" => {
            let from_slot = from.parse().map_err(|_| format!("invalid from_slot {}\n{}", from, USAGE))?;
            let to_slot = to.parse().map_err(|_| format!("invalid to_slot {}\n{}", to, USAGE))?;
            Ok(Command::Backfill { from_slot, to_slot })
        }
        _ => Err(USAGE.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = parse_command(&args)?;

    tracing::info!("Starting chain-indexer-service");

    let config = Config::from_env()?;
    tracing::info!(
        "Configuration loaded: rpc={} grpc={} workers={}",
        config.solana_rpc_url,
        config.grpc_endpoint,
        config.worker_count
    );

    let db_pool = db::connection::establish_connection(&config.database_url).await?;
    sqlx::query("SELECT 1").execute(&db_pool).await?;
    tracing::info!("Database connection established");

    let rpc = Arc::new(SolanaClient::new(&config));
    let connector = Arc::new(YellowstoneConnector::new(
        config.grpc_endpoint.clone(),
        config.grpc_token.clone(),
    ));
    let state = Arc::new(AppState::new(config, db_pool, rpc, connector));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received shutdown signal");
        }
        signal_token.cancel();
    });

    match command {
        Command::Run => run(state, shutdown).await?,
        Command::Backfill { from_slot, to_slot } => {
            let reports = blockchain::backfill(&state, from_slot, to_slot, &shutdown).await?;
            for (address, report) in reports {
                tracing::info!(
                    "{}: {} processed, {} skipped, {} failed, completed={}",
                    address,
                    report.processed,
                    report.skipped,
                    report.failed,
                    report.completed
                );
            }
        }
    }

    Ok(())
}

async fn run(state: Arc<AppState>, shutdown: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
    let retry_state = state.clone();
    let retry_shutdown = shutdown.clone();
    let retries = tokio::spawn(async move {
        let period = retry_state.config.retry_interval;
        blockchain::schedule_retries(&retry_state, period, retry_shutdown).await;
    });

    let result = blockchain::subscribe(state, shutdown.clone()).await;

    shutdown.cancel();
    retries.await?;
    result?;

    tracing::info!("Indexer stopped");
    Ok(())
}
