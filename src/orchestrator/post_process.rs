//! Post-run processing.
//!
//! A completed run refreshes the dashboard data after a short settle delay. The refresh runs
//! on its own task and reports back through a channel; its outcome never changes the run state.

use crate::store::{LoadOutcome, ResultStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Progress of a post-run reload, tagged with the run generation that scheduled it.
#[derive(Debug, Clone)]
pub(super) enum ReloadReport {
    Started { generation: u64 },
    Finished { generation: u64, outcome: LoadOutcome },
}

/// Spawn the settle-delay reload for the run identified by `generation`.
pub(super) fn schedule_reload(
    store: Arc<ResultStore>,
    delay: Duration,
    generation: u64,
    report_tx: UnboundedSender<ReloadReport>,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        debug!(generation, "reloading dashboard data after run");
        let _ = report_tx.send(ReloadReport::Started { generation });
        let outcome = store.load().await;
        let _ = report_tx.send(ReloadReport::Finished {
            generation,
            outcome,
        });
    });
}
