use std::{str::FromStr, sync::Arc};

use anyhow::Context;
use clap::Parser;
use jemallocator::Jemalloc;
use log::{error, info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use swap_rewards::{
    api::{self, AppState},
    AlloyChain, CronScheduler, PostgresClient, RewardEngine, Settings, SwapListener,
    WatchedAddresses,
};

/// Swap reward service: watches campaign pools and awards points.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path of the YAML config file (extension optional)
    #[clap(long, env = "SWAP_REWARDS_CONFIG", default_value = "config")]
    config: String,
}

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let settings = Settings::new(&args.config).with_context(|| {
        format!(
            "Failed to load {}.yaml. Please ensure it exists and is valid",
            args.config
        )
    })?;

    let level = LevelFilter::from_str(&settings.log_level).unwrap_or(LevelFilter::Info);
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("Failed to initialize logger")?;

    let postgres = PostgresClient::new(settings.postgres.clone())
        .await
        .context("Failed to initialize database connection")?;
    postgres.migrate().await?;

    // Without a chain client nothing can be attributed
    let chain = AlloyChain::connect(&settings.chain)
        .await
        .context("Failed to connect to chain endpoint")?;

    let engine = Arc::new(RewardEngine::new(Arc::new(postgres), Arc::new(chain)));
    let registry = Arc::new(WatchedAddresses::new());

    run_service(settings, engine, registry).await
}

async fn run_service(
    settings: Settings,
    engine: Arc<RewardEngine>,
    registry: Arc<WatchedAddresses>,
) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();

    let listener = SwapListener::new(engine.clone(), registry.clone(), settings.listener.clone());
    let listener_token = cancellation_token.child_token();
    // Without the listener nothing is ingested, so its failure stops the service
    let shutdown_token = cancellation_token.clone();
    let listener_handle = tokio::spawn(async move {
        let result = listener.run(listener_token).await;
        if let Err(e) = &result {
            error!("Swap listener failed: {:#}", e);
            shutdown_token.cancel();
        }
        result
    });

    info!("Swap listener started");

    let cron_scheduler =
        CronScheduler::new(engine.clone(), registry.clone(), settings.rewards.clone());
    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    info!("Cron scheduler started - settlement and pool sync run periodically");

    let state = Arc::new(AppState {
        store: engine.store().clone(),
        registry,
    });
    let bind_addr = settings.server.bind_addr.clone();
    let api_token = cancellation_token.child_token();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(&bind_addr, state, api_token).await {
            error!("HTTP API failed: {:#}", e);
        }
    });

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Service running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
            _ = cancellation_token.cancelled() => {
                error!("Swap listener stopped, shutting down...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = cancellation_token.cancelled() => {
                error!("Swap listener stopped, shutting down...");
            },
        };
    }

    info!("Finishing all tasks...");

    cancellation_token.cancel();

    info!("Waiting for swap listener to stop...");
    let listener_result = listener_handle.await;

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Waiting for HTTP API to stop...");
    let _ = api_handle.await;

    info!("Waiting for pending reward updates...");
    engine.wait_for_pending().await;

    info!("All tasks stopped");
    listener_result.context("Swap listener panicked")?
}
