//! tests/backfill_tests.rs - replaying program history between two slots

#[cfg(test)]
mod tests {
    use crate::blockchain::backfill::{already_indexed, backfill, resolve_bookends};
    use crate::blockchain::geyser::backfill_fingerprint;
    use crate::db::mint::add_tracked_mint;
    use crate::db::{balance, checkpoint, unprocessed};
    use crate::models::SignatureInfo;
    use crate::state::AppState;
    use crate::tests::mocks::{balance_transaction, signature, test_state, MockConnector, MockRpc};
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Signature;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn info(sig: Signature, slot: u64) -> SignatureInfo {
        SignatureInfo {
            signature: sig,
            slot,
            failed: false,
        }
    }

    /// Claimable tokens history: bookend at 130, three transactions inside
    /// the range, then two below it.
    async fn setup() -> (AppState, Arc<MockRpc>, Pubkey, Pubkey) {
        let rpc = Arc::new(MockRpc::default());
        let state = test_state(rpc.clone(), Arc::new(MockConnector::default())).await;
        let program = state.config.programs.claimable_tokens;
        let mint = Pubkey::new_unique();
        add_tracked_mint(&state.db_pool, &mint.to_string(), "COIN").await.unwrap();

        rpc.set_address_signatures(
            program,
            vec![
                info(signature(130), 130),
                info(signature(120), 120),
                info(signature(110), 110),
                info(signature(100), 100),
                info(signature(95), 95),
                info(signature(80), 80),
            ],
        );
        rpc.set_block(130, vec![signature(131), signature(130)]);
        // The first transaction of block 100 belongs to another program.
        rpc.set_block(100, vec![signature(99), signature(100)]);

        for (seed, slot) in [(120u8, 120u64), (110, 110), (100, 100), (95, 95)] {
            rpc.add_transaction(balance_transaction(signature(seed), slot, mint, 1_000));
        }

        (state, rpc, program, mint)
    }

    #[tokio::test]
    async fn test_bookends_fall_back_to_block_signatures() {
        let (state, _rpc, _, _) = setup().await;

        let bookends = resolve_bookends(&state, 100, 130).await.unwrap();
        assert_eq!(bookends.before, signature(130));
        assert_eq!(bookends.until, signature(99));
    }

    #[tokio::test]
    async fn test_bookends_prefer_indexed_rows() {
        let (state, _rpc, _, mint) = setup().await;

        let indexed = balance_transaction(signature(50), 90, mint, 1);
        state.processor.process_transaction(90, &indexed).await.unwrap();

        let bookends = resolve_bookends(&state, 100, 130).await.unwrap();
        assert_eq!(bookends.until, signature(50));
    }

    #[tokio::test]
    async fn test_backfill_stops_below_from_slot() {
        let (state, rpc, program, _) = setup().await;

        let reports = backfill(&state, 100, 130, &CancellationToken::new()).await.unwrap();
        assert_eq!(reports.len(), 3);

        let (_, report) = reports.iter().find(|(address, _)| *address == program).unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 0);
        assert!(report.completed);

        let fetched = rpc.fetched();
        assert_eq!(fetched, vec![signature(120), signature(110), signature(100)]);
        assert!(!balance::signature_exists(&state.db_pool, &signature(95).to_string()).await.unwrap());

        let (_, hash) = backfill_fingerprint(&program);
        assert_eq!(checkpoint::latest_covered_slot(&state.db_pool, &hash).await.unwrap(), 130);
        assert!(reports.iter().all(|(_, report)| report.completed));
    }

    #[tokio::test]
    async fn test_backfill_skips_indexed_signatures() {
        let (state, rpc, program, mint) = setup().await;

        let already = balance_transaction(signature(110), 110, mint, 1_000);
        state.processor.process_transaction(110, &already).await.unwrap();

        let reports = backfill(&state, 100, 130, &CancellationToken::new()).await.unwrap();
        let (_, report) = reports.iter().find(|(address, _)| *address == program).unwrap();

        assert_eq!(report.processed, 2);
        assert_eq!(report.skipped, 1);
        assert!(!rpc.fetched().contains(&signature(110)));
    }

    #[tokio::test]
    async fn test_backfill_enqueues_failures() {
        let (state, rpc, program, _) = setup().await;
        rpc.set_address_signatures(
            program,
            vec![info(signature(130), 130), info(signature(125), 125), info(signature(120), 120)],
        );

        let reports = backfill(&state, 100, 130, &CancellationToken::new()).await.unwrap();
        let (_, report) = reports.iter().find(|(address, _)| *address == program).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);

        let queued = unprocessed::get_unprocessed(&state.db_pool, 10, 0).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].signature, signature(125).to_string());
        assert_eq!(queued[0].slot, 125);
    }

    #[tokio::test]
    async fn test_cancelled_backfill_leaves_no_checkpoint() {
        let (state, rpc, program, _) = setup().await;

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let reports = backfill(&state, 100, 130, &shutdown).await.unwrap();
        assert!(reports.iter().all(|(_, report)| !report.completed));
        assert!(rpc.fetched().is_empty());

        let (_, hash) = backfill_fingerprint(&program);
        assert_eq!(checkpoint::latest_covered_slot(&state.db_pool, &hash).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unreadable_store_does_not_mark_signature_indexed() {
        let rpc = Arc::new(MockRpc::default());
        let state = test_state(rpc.clone(), Arc::new(MockConnector::default())).await;
        let mint = Pubkey::new_unique();
        add_tracked_mint(&state.db_pool, &mint.to_string(), "COIN").await.unwrap();

        rpc.add_transaction(balance_transaction(signature(7), 70, mint, 10));
        state.processor.process_signature(70, &signature(7)).await.unwrap();

        assert!(already_indexed(&state.db_pool, &signature(7).to_string()).await);
        assert!(!already_indexed(&state.db_pool, &signature(8).to_string()).await);

        // A lookup that fails must leave the signature to processing, where a
        // failure lands in the retry queue instead of being dropped.
        state.db_pool.close().await;
        assert!(!already_indexed(&state.db_pool, &signature(7).to_string()).await);
    }
}
