//! The `subscribe` entry point: keeps one live stream matching the tracked
//! mint set, restarting it whenever that set changes.

use crate::blockchain::backfill::backfill;
use crate::blockchain::geyser::{StreamError, SubscriptionFilter};
use crate::blockchain::retry::{with_retries, RetryPolicy};
use crate::blockchain::stream::{ErrorCallback, GeyserClient};
use crate::blockchain::worker_pool::WorkerPool;
use crate::db::mint::{get_tracked_mints, MintChangeListener};
use crate::db::{checkpoint, unprocessed};
use crate::error::IndexerError;
use crate::state::AppState;
use solana_sdk::signature::Signature;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use yellowstone_grpc_proto::prelude::{subscribe_update::UpdateOneof, SubscribeUpdate};

/// Furthest behind the tip the stream is asked to replay from. Anything
/// older is left to backfill.
pub const MAX_SLOT_GAP: u64 = 2990;

/// The live checkpoint is advanced on every slot divisible by this.
pub const CHECKPOINT_SLOT_INTERVAL: u64 = 10;

/// Id of the checkpoint the live stream is advancing, shared with workers.
#[derive(Debug, Clone, Default)]
pub struct CheckpointHandle(Arc<AtomicI64>);

impl CheckpointHandle {
    pub fn set(&self, id: i64) {
        self.0.store(id, Ordering::SeqCst);
    }

    pub fn get(&self) -> Option<i64> {
        match self.0.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePlan {
    pub from_slot: u64,
    /// `(from, to)` range to backfill alongside the new stream.
    pub backfill: Option<(u64, u64)>,
}

/// Where the stream should start given the lineage's last covered slot and
/// the current tip.
pub fn plan_resume(last_indexed_slot: u64, latest_slot: u64) -> ResumePlan {
    let minimum_slot = latest_slot.saturating_sub(MAX_SLOT_GAP);

    if last_indexed_slot >= minimum_slot && last_indexed_slot > 0 {
        ResumePlan {
            from_slot: last_indexed_slot,
            backfill: None,
        }
    } else if last_indexed_slot == 0 {
        ResumePlan {
            from_slot: minimum_slot,
            backfill: None,
        }
    } else {
        ResumePlan {
            from_slot: minimum_slot,
            backfill: Some((last_indexed_slot, minimum_slot)),
        }
    }
}

/// Handles one update from the stream: slot updates advance the live
/// checkpoint, account updates index the transaction that touched the account.
pub async fn handle_update(state: &AppState, checkpoint: &CheckpointHandle, update: SubscribeUpdate) {
    match update.update_oneof {
        Some(UpdateOneof::Slot(slot)) => {
            if slot.slot == 0 || slot.slot % CHECKPOINT_SLOT_INTERVAL != 0 {
                return;
            }
            let Some(id) = checkpoint.get() else {
                return;
            };
            debug!(slot = slot.slot, "Advancing checkpoint {}", id);
            if let Err(e) = checkpoint::advance_checkpoint(&state.db_pool, id, slot.slot).await {
                error!(slot = slot.slot, "Failed to update slot checkpoint: {}", e);
            }
        }
        Some(UpdateOneof::Account(account)) => {
            let Some(txn_signature) = account.account.and_then(|info| info.txn_signature) else {
                return;
            };
            let signature = match Signature::try_from(txn_signature.as_slice()) {
                Ok(signature) => signature,
                Err(e) => {
                    warn!(slot = account.slot, "Ignoring account update with malformed signature: {}", e);
                    return;
                }
            };

            if let Err(e) = state.processor.process_signature(account.slot, &signature).await {
                let signature = signature.to_string();
                error!(signature = %signature, slot = account.slot, "Failed to process signature: {}", e);
                if let Err(e) =
                    unprocessed::enqueue_unprocessed(&state.db_pool, &signature, account.slot, &e.to_string()).await
                {
                    error!(signature = %signature, "Failed to enqueue for retry: {}", e);
                }
            }
        }
        _ => {}
    }
}

/// Errors after which the stream will not recover on its own.
fn is_fatal(err: &StreamError) -> bool {
    !err.is_transient() && !matches!(err, StreamError::ReconnectFailed { .. })
}

enum Restart {
    MintsChanged,
    StreamFailed,
    Shutdown,
}

/// Runs the live subscription until `shutdown` is cancelled.
pub async fn subscribe(state: Arc<AppState>, shutdown: CancellationToken) -> Result<(), IndexerError> {
    let checkpoint = CheckpointHandle::default();
    let workers = WorkerPool::new(state.clone(), checkpoint.clone(), state.config.worker_count);
    let mut listener = MintChangeListener::new(state.db_pool.clone(), state.config.mint_poll_interval).await?;

    let result = subscription_loop(&state, &checkpoint, &workers, &mut listener, &shutdown).await;

    info!("Stopping subscription");
    workers.shutdown().await;
    result
}

async fn subscription_loop(
    state: &Arc<AppState>,
    checkpoint: &CheckpointHandle,
    workers: &WorkerPool,
    listener: &mut MintChangeListener,
    shutdown: &CancellationToken,
) -> Result<(), IndexerError> {
    loop {
        if shutdown.is_cancelled() {
            return Ok(());
        }

        let filter = SubscriptionFilter::new(get_tracked_mints(&state.db_pool).await?);
        let (subscription, hash) = filter.fingerprint()?;

        let last_indexed_slot = checkpoint::latest_covered_slot(&state.db_pool, &hash).await?;
        let rpc = state.rpc.clone();
        let latest_slot = with_retries(RetryPolicy::slot(), "get_slot", || {
            let rpc = rpc.clone();
            async move { rpc.get_slot().await }
        })
        .await?;

        let plan = plan_resume(last_indexed_slot, latest_slot);
        match plan.backfill {
            Some((from_slot, to_slot)) => {
                warn!(
                    "Last indexed slot {} is too old, streaming from {} and backfilling the gap",
                    from_slot, to_slot
                );
                spawn_backfill(state.clone(), from_slot, to_slot, shutdown.child_token());
            }
            None if last_indexed_slot == 0 => {
                warn!(
                    "No checkpoint for this subscription, streaming from slot {} without backfill",
                    plan.from_slot
                );
            }
            None => {}
        }

        let checkpoint_id = checkpoint::start_point_checkpoint(&state.db_pool, &hash, &subscription, plan.from_slot).await?;
        checkpoint.set(checkpoint_id);

        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<StreamError>();
        let on_error: ErrorCallback = Arc::new(move |err: &StreamError| {
            error!("Error in subscription stream: {}", err);
            if is_fatal(err) {
                let _ = fatal_tx.send(err.clone());
            }
        });

        let client = GeyserClient::new(state.connector.clone(), state.stream.clone());
        client
            .subscribe(filter.to_request(Some(plan.from_slot)), workers.get_sender(), on_error)
            .await?;

        info!(
            "Subscribed to {} tracked mints from slot {} (checkpoint {})",
            filter.mints.len(),
            plan.from_slot,
            checkpoint_id
        );

        let restart = loop {
            tokio::select! {
                _ = shutdown.cancelled() => break Restart::Shutdown,
                Some(err) = fatal_rx.recv() => {
                    warn!("Subscription stream stopped, restarting: {}", err);
                    break Restart::StreamFailed;
                }
                change = listener.recv(shutdown) => {
                    let Some(change) = change? else {
                        break Restart::Shutdown;
                    };
                    state.mint_cache.invalidate().await;
                    if change.changes_mint_set() {
                        info!(
                            "Tracked mints changed ({:?} new={:?} old={:?}), restarting subscription",
                            change.operation, change.new_mint, change.old_mint
                        );
                        break Restart::MintsChanged;
                    }
                }
            }
        };

        client.close().await;

        match restart {
            Restart::Shutdown => return Ok(()),
            Restart::MintsChanged => {}
            Restart::StreamFailed => {
                tokio::select! {
                    _ = shutdown.cancelled() => return Ok(()),
                    _ = tokio::time::sleep(state.stream.reconnect_interval) => {}
                }
            }
        }
    }
}

fn spawn_backfill(state: Arc<AppState>, from_slot: u64, to_slot: u64, shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = backfill(&state, from_slot, to_slot, &shutdown).await {
            error!("Failed to backfill slots {}..{}: {}", from_slot, to_slot, e);
        }
    });
}
