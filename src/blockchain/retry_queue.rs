use crate::db::unprocessed;
use crate::error::IndexerError;
use crate::state::AppState;
use solana_sdk::signature::Signature;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const SWEEP_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Reprocesses every queued signature once. Successes leave the queue;
/// failures stay for the next sweep.
pub async fn sweep(state: &AppState) -> Result<SweepReport, IndexerError> {
    let started = Instant::now();
    let mut report = SweepReport::default();
    let mut offset = 0;

    info!("Retrying unprocessed transactions");

    loop {
        let queued = unprocessed::get_unprocessed(&state.db_pool, SWEEP_PAGE_SIZE, offset).await?;
        if queued.is_empty() {
            break;
        }

        for entry in queued {
            report.attempted += 1;

            let signature = match Signature::from_str(&entry.signature) {
                Ok(signature) => signature,
                Err(_) => {
                    error!(signature = %entry.signature, "Dropping malformed queued signature");
                    unprocessed::delete_unprocessed(&state.db_pool, &entry.signature).await?;
                    report.failed += 1;
                    continue;
                }
            };

            match state.processor.process_signature(entry.slot.max(0) as u64, &signature).await {
                Ok(_) => {
                    debug!(signature = %entry.signature, slot = entry.slot, "Reprocessed");
                    unprocessed::delete_unprocessed(&state.db_pool, &entry.signature).await?;
                    report.succeeded += 1;
                }
                Err(e) => {
                    error!(signature = %entry.signature, slot = entry.slot, "Retry failed: {}", e);
                    offset += 1;
                    report.failed += 1;
                }
            }
        }
    }

    info!(
        "Finished retrying unprocessed transactions: {} attempted, {} failed in {:?}",
        report.attempted,
        report.failed,
        started.elapsed()
    );
    Ok(report)
}

/// Sweeps the queue every `period` until `shutdown` fires.
pub async fn schedule_retries(state: &AppState, period: Duration, shutdown: CancellationToken) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = sweep(state).await {
                    error!("Retry sweep failed: {}", e);
                }
            }
            _ = shutdown.cancelled() => {
                info!("Stopping retry scheduler");
                break;
            }
        }
    }
}
