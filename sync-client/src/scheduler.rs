//! Background periodic sync task.
//!
//! Runs the controller on a fixed interval, the timer-driven counterpart
//! of a user-triggered sync.

use crate::controller::SyncController;
use crate::store::{CursorStore, SensorStore};
use crate::transport::Transport;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use wearsync_core::SyncOutcome;

/// Spawn a background task that syncs every `period`.
///
/// The first run happens one period after spawning. A tick that finds a
/// run already in flight is skipped. Returns a handle that can be used to
/// abort the task.
pub fn spawn_periodic_sync<T, S, C>(
    controller: Arc<SyncController<T, S, C>>,
    period: Duration,
) -> tokio::task::JoinHandle<()>
where
    T: Transport + 'static,
    S: SensorStore + 'static,
    C: CursorStore + 'static,
{
    tokio::spawn(async move {
        tracing::info!("Periodic sync started (interval: {}s)", period.as_secs());

        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        timer.tick().await;

        loop {
            timer.tick().await;

            match controller.run().await {
                SyncOutcome::NothingToSync => tracing::debug!("Periodic sync: nothing to sync"),
                SyncOutcome::AlreadyRunning => {
                    tracing::debug!("Periodic sync: skipped, run in flight")
                }
                outcome => tracing::info!("Periodic sync: {}", outcome.message()),
            }
        }
    })
}
