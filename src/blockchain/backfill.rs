use crate::blockchain::client::SignaturesForAddressOptions;
use crate::blockchain::geyser::backfill_fingerprint;
use crate::blockchain::retry::{with_retries, RetryPolicy};
use crate::db::{balance, checkpoint, unprocessed};
use crate::error::IndexerError;
use crate::state::AppState;
use futures::future::join_all;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub page_size: usize,
    pub transaction_delay: Duration,
    pub page_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            transaction_delay: Duration::from_millis(5),
            page_delay: Duration::from_millis(50),
            retry: RetryPolicy::fetch(),
        }
    }
}

/// Signatures bounding a backfill. Paging walks from `before` back towards `until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bookends {
    pub before: Signature,
    pub until: Signature,
}

/// Per-address outcome of a backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub completed: bool,
}

fn parse_signature(value: &str) -> Result<Signature, IndexerError> {
    Signature::from_str(value).map_err(|_| IndexerError::Bookend(format!("invalid stored signature {}", value)))
}

/// Whether balance changes for `signature` are already stored. A failed
/// lookup counts as not indexed so the signature still reaches processing,
/// which enqueues it for retry if the store stays unavailable.
pub async fn already_indexed(pool: &Pool<Sqlite>, signature: &str) -> bool {
    match balance::signature_exists(pool, signature).await {
        Ok(exists) => exists,
        Err(e) => {
            warn!(signature = %signature, "Failed to check whether signature is indexed: {}", e);
            false
        }
    }
}

/// Finds the bookends from already indexed rows, falling back to the
/// boundary blocks' signature lists.
pub async fn resolve_bookends(state: &AppState, from_slot: u64, to_slot: u64) -> Result<Bookends, IndexerError> {
    let before = match balance::earliest_signature_at_or_after(&state.db_pool, to_slot).await? {
        Some(sig) => parse_signature(&sig)?,
        None => {
            let signatures = state.rpc.get_block_signatures(to_slot).await?;
            *signatures
                .last()
                .ok_or_else(|| IndexerError::Bookend(format!("block {} has no signatures", to_slot)))?
        }
    };

    let until = match balance::latest_signature_at_or_before(&state.db_pool, from_slot).await? {
        Some(sig) => parse_signature(&sig)?,
        None => {
            let signatures = state.rpc.get_block_signatures(from_slot).await?;
            *signatures
                .first()
                .ok_or_else(|| IndexerError::Bookend(format!("block {} has no signatures", from_slot)))?
        }
    };

    Ok(Bookends { before, until })
}

/// Replays the tracked programs' transactions between `from_slot` and
/// `to_slot`. Only bookend resolution can fail the run; per-address failures
/// are logged and leave that address without a checkpoint.
pub async fn backfill(
    state: &AppState,
    from_slot: u64,
    to_slot: u64,
    shutdown: &CancellationToken,
) -> Result<Vec<(Pubkey, BackfillReport)>, IndexerError> {
    let bookends = resolve_bookends(state, from_slot, to_slot).await?;
    info!(
        "Starting backfill of slots {}..{} (before {}, until {})",
        from_slot, to_slot, bookends.before, bookends.until
    );

    let addresses = state.config.programs.addresses();
    let workers = addresses
        .iter()
        .map(|address| backfill_address(state, *address, bookends, from_slot, to_slot, shutdown));

    let reports = join_all(workers).await;
    Ok(addresses.into_iter().zip(reports).collect())
}

async fn backfill_address(
    state: &AppState,
    address: Pubkey,
    bookends: Bookends,
    from_slot: u64,
    to_slot: u64,
    shutdown: &CancellationToken,
) -> BackfillReport {
    let config = &state.backfill;
    let mut report = BackfillReport::default();
    let mut before = bookends.before;
    let mut found_intersection = false;

    info!(address = %address, "Backfilling from slot {} to {}", from_slot, to_slot);

    while !found_intersection {
        if shutdown.is_cancelled() {
            warn!(address = %address, "Backfill cancelled");
            return report;
        }

        let options = SignaturesForAddressOptions {
            before: Some(before),
            until: Some(bookends.until),
            limit: Some(config.page_size),
            min_context_slot: Some(to_slot),
        };

        let rpc = state.rpc.clone();
        let page = with_retries(config.retry, "get_signatures_for_address", || {
            let rpc = rpc.clone();
            let options = options.clone();
            async move { rpc.get_signatures_for_address(&address, options).await }
        })
        .await;

        let page = match page {
            Ok(page) => page,
            Err(e) => {
                error!(address = %address, "Failed to get signatures: {}", e);
                return report;
            }
        };

        if page.is_empty() {
            info!(address = %address, "No transactions left to backfill");
            break;
        }

        for info in &page {
            if shutdown.is_cancelled() {
                warn!(address = %address, "Backfill cancelled");
                return report;
            }

            if info.slot < from_slot {
                debug!(address = %address, slot = info.slot, "Reached slot below {}", from_slot);
                found_intersection = true;
                break;
            }

            before = info.signature;

            if info.failed || info.signature == Signature::default() {
                report.skipped += 1;
                continue;
            }

            let signature = info.signature.to_string();
            if already_indexed(&state.db_pool, &signature).await {
                report.skipped += 1;
                continue;
            }

            match state.processor.process_signature(info.slot, &info.signature).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    error!(signature = %signature, slot = info.slot, "Failed to process signature: {}", e);
                    report.failed += 1;
                    if let Err(e) =
                        unprocessed::enqueue_unprocessed(&state.db_pool, &signature, info.slot, &e.to_string()).await
                    {
                        error!(signature = %signature, "Failed to enqueue for retry: {}", e);
                    }
                }
            }

            sleep(config.transaction_delay).await;
        }

        debug!(address = %address, "Finished backfill page of {} signatures", page.len());
        sleep(config.page_delay).await;
    }

    let (subscription, hash) = backfill_fingerprint(&address);
    if let Err(e) = checkpoint::insert_range_checkpoint(&state.db_pool, &hash, &subscription, from_slot, to_slot).await {
        error!(address = %address, "Failed to record backfill checkpoint: {}", e);
        return report;
    }

    report.completed = true;
    info!(
        address = %address,
        "Backfill complete: {} processed, {} skipped, {} failed",
        report.processed, report.skipped, report.failed
    );
    report
}
