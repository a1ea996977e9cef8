// Entry point of the moderation service.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite, in-memory stores)
// - `gateway/` = JSON-lines adapter over stdin/stdout
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Run the gateway loop and background tasks
// 4. Shut down cleanly, saving statistics

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "gateway/gateway_layer.rs"]
mod gateway;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

use crate::config::{AppConfig, StorageBackend};
use crate::core::appeals::AppealStore;
use crate::core::collaborators::Role;
use crate::core::penalties::PenaltyStore;
use crate::core::pipeline::{ModerationPipeline, PipelineDeps};
use crate::core::review_queue::QueueStore;
use crate::core::workflow::AuditStore;
use crate::gateway::Dispatcher;
use crate::infra::collaborators::{InMemoryContentStore, InMemoryReputation};
use crate::infra::moderation::{
    InMemoryAppealStore, InMemoryAuditStore, InMemoryPenaltyStore, InMemoryQueueStore,
    SqliteModerationStore,
};
use anyhow::Context;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// The four storage ports, backed by one implementation.
struct Stores {
    queue: Arc<dyn QueueStore>,
    penalties: Arc<dyn PenaltyStore>,
    appeals: Arc<dyn AppealStore>,
    audit: Arc<dyn AuditStore>,
}

async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    match config.storage {
        StorageBackend::Sqlite => {
            let store = Arc::new(
                SqliteModerationStore::new(&config.database_url)
                    .await
                    .with_context(|| format!("Failed to open {}", config.database_url))?,
            );
            tracing::info!(database_url = %config.database_url, "Using SQLite storage");
            Ok(Stores {
                queue: store.clone(),
                penalties: store.clone(),
                appeals: store.clone(),
                audit: store,
            })
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; nothing survives a restart");
            Ok(Stores {
                queue: Arc::new(InMemoryQueueStore::new()),
                penalties: Arc::new(InMemoryPenaltyStore::new()),
                appeals: Arc::new(InMemoryAppealStore::new()),
                audit: Arc::new(InMemoryAuditStore::new()),
            })
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries gateway responses.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().context("Invalid flagging rules")?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let stores = open_stores(&config).await?;
    let content = Arc::new(InMemoryContentStore::new());
    let reputation = Arc::new(InMemoryReputation::new());
    for moderator_id in &config.moderator_ids {
        reputation.grant_role(moderator_id, Role::Moderator);
    }

    let pipeline = Arc::new(ModerationPipeline::new(PipelineDeps {
        queue_store: stores.queue,
        penalty_store: stores.penalties,
        appeal_store: stores.appeals,
        audit: stores.audit,
        content: content.clone(),
        reputation: reputation.clone(),
        rules: config.rules.clone(),
        policy: config.policy,
        settings: config.pipeline,
    }));

    let queued = pipeline
        .initialize()
        .await
        .context("Failed to restore moderation state")?;
    for moderator_id in &config.moderator_ids {
        if let Err(e) = pipeline.register_moderator(moderator_id).await {
            tracing::warn!(moderator_id = %moderator_id, error = %e, "Failed to register moderator");
        }
    }
    tracing::info!(
        queued,
        moderators = config.moderator_ids.len(),
        "Moderation service ready"
    );

    // ========================================================================
    // BACKGROUND TASKS
    // ========================================================================

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let snapshot_pipeline = Arc::clone(&pipeline);
    let mut snapshot_shutdown = shutdown_rx.clone();
    let every = config.stats_snapshot_interval;
    let snapshots = tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = snapshot_shutdown.changed() => break,
                _ = ticker.tick() => {
                    if let Err(e) = snapshot_pipeline.persist_statistics().await {
                        tracing::warn!(error = %e, "Statistics snapshot failed");
                    }
                }
            }
        }
    });

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            let _ = ctrl_c_tx.send(true);
        }
    });

    // ========================================================================
    // GATEWAY
    // ========================================================================

    let dispatcher = Dispatcher::new(Arc::clone(&pipeline), content);
    let served = dispatcher
        .serve(
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
            shutdown_rx,
        )
        .await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = snapshots.await {
        tracing::warn!(error = %e, "Snapshot task ended abnormally");
    }
    pipeline
        .persist_statistics()
        .await
        .context("Failed to save statistics on shutdown")?;
    tracing::info!("Moderation service stopped");

    served.context("Gateway I/O failed")
}
