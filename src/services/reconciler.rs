use tokio::time::{Duration, sleep};
use tracing::{error, info};

use crate::services::transactions::TransactionService;

const STALE_AFTER_SECS: i64 = 60;
const SWEEP_BATCH_SIZE: i64 = 20;

/// Background sweep for transactions stuck in PENDING, e.g. after a crash
/// between the local commit and the gateway call. Complements the read-path
/// reconciliation so settlement does not depend on clients polling.
pub async fn run_reconciler(service: TransactionService, interval_secs: u64) {
    info!("pending-transaction reconciler started");

    loop {
        match service
            .reconcile_stale(STALE_AFTER_SECS, SWEEP_BATCH_SIZE)
            .await
        {
            Ok(0) => {}
            Ok(applied) => info!(applied, "reconciler applied status transitions"),
            Err(e) => error!("reconciler sweep failed: {e}"),
        }

        sleep(Duration::from_secs(interval_secs)).await;
    }
}
