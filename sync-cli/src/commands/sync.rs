//! Run one sync pass.

use anyhow::Result;
use std::path::Path;
use wearsync_client::{Config, SpoolTransport, SyncController};
use wearsync_core::SyncOutcome;

use super::{known_sensors, open_store};

/// Run the sync command.
pub async fn run(config: &Config, spool: &Path) -> Result<SyncOutcome> {
    let store = open_store(config).await?;
    let sensors = known_sensors(config, &store).await?;
    if sensors.is_empty() {
        println!("No sensors configured and nothing recorded.");
        return Ok(SyncOutcome::NothingToSync);
    }

    tracing::debug!(sensors = sensors.len(), spool = %spool.display(), "starting sync");
    let controller = SyncController::new(
        std::sync::Arc::new(SpoolTransport::new(spool)),
        store.clone(),
        store,
        sensors,
        &config.sync,
    );

    let outcome = controller.run().await;
    print_outcome(&outcome, spool);

    match &outcome {
        SyncOutcome::PartialFailure { failure, .. } => {
            anyhow::bail!("Sync stopped early: {}", failure)
        }
        _ => Ok(outcome),
    }
}

fn print_outcome(outcome: &SyncOutcome, spool: &Path) {
    println!("Sync: {}", outcome.message());
    match outcome {
        SyncOutcome::Success {
            chunks,
            rows,
            cursor,
        } => {
            println!();
            println!("  Chunks: {}", chunks);
            println!("  Rows:   {}", rows);
            println!("  Cursor: {}", cursor);
            println!("  Inbox:  {}", spool.display());
        }
        SyncOutcome::PartialFailure { chunks, rows, .. }
        | SyncOutcome::Cancelled { chunks, rows } => {
            println!();
            println!("  Delivered before stopping: {} chunks, {} rows", chunks, rows);
        }
        SyncOutcome::PeerUnavailable => {
            println!();
            println!("  Inbox {} does not exist.", spool.display());
        }
        SyncOutcome::NothingToSync | SyncOutcome::AlreadyRunning => {}
    }
}
