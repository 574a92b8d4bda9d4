//! tests/subscription_tests.rs - the live subscription loop end to end

#[cfg(test)]
mod tests {
    use crate::blockchain::geyser::SubscriptionFilter;
    use crate::blockchain::subscription::{handle_update, subscribe, CheckpointHandle};
    use crate::db::mint::add_tracked_mint;
    use crate::db::{balance, checkpoint, unprocessed};
    use crate::tests::mocks::{
        account_update, balance_transaction, signature, slot_update, test_state, wait_until, MockConnector, MockRpc,
        ScriptedStream,
    };
    use solana_sdk::pubkey::Pubkey;
    use sqlx::SqlitePool;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use yellowstone_grpc_proto::tonic::Status;

    async fn wait_for_covered_slot(pool: &SqlitePool, hash: &str, slot: u64) {
        let poll = async {
            while checkpoint::latest_covered_slot(pool, hash).await.unwrap() < slot {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(2), poll)
            .await
            .expect("checkpoint not advanced within 2s");
    }

    #[tokio::test]
    async fn test_subscription_indexes_updates_and_restarts_on_mint_change() {
        let rpc = Arc::new(MockRpc::default());
        let connector = Arc::new(MockConnector::default());
        let state = Arc::new(test_state(rpc.clone(), connector.clone()).await);

        let mint = Pubkey::new_unique();
        add_tracked_mint(&state.db_pool, &mint.to_string(), "COIN").await.unwrap();
        rpc.set_slot(10_000);
        rpc.add_transaction(balance_transaction(signature(1), 7_015, mint, 250));

        connector.push(ScriptedStream::open(vec![
            Ok(account_update(7_015, &signature(1))),
            Ok(slot_update(7_020)),
            Ok(slot_update(7_021)),
        ]));
        connector.push(ScriptedStream::open(Vec::new()));

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(subscribe(state.clone(), shutdown.clone()));

        wait_until(|| connector.requests().len() == 1).await;
        let requests = connector.requests();
        let first = &requests[0];
        assert_eq!(first.from_slot, Some(7_010));
        assert!(first.accounts.contains_key(&mint.to_string()));

        let (_, hash) = SubscriptionFilter::new(vec![mint.to_string()]).fingerprint().unwrap();
        wait_for_covered_slot(&state.db_pool, &hash, 7_020).await;

        let added = Pubkey::new_unique();
        add_tracked_mint(&state.db_pool, &added.to_string(), "NEW").await.unwrap();
        wait_until(|| connector.requests().len() == 2).await;
        assert!(connector.requests()[1].accounts.contains_key(&added.to_string()));

        shutdown.cancel();
        task.await.unwrap().unwrap();

        assert!(balance::signature_exists(&state.db_pool, &signature(1).to_string()).await.unwrap());
        assert_eq!(checkpoint::latest_covered_slot(&state.db_pool, &hash).await.unwrap(), 7_020);
    }

    #[tokio::test]
    async fn test_subscription_restarts_after_fatal_stream_error() {
        let rpc = Arc::new(MockRpc::default());
        let connector = Arc::new(MockConnector::default());
        let state = Arc::new(test_state(rpc.clone(), connector.clone()).await);
        rpc.set_slot(5_000);

        connector.push(ScriptedStream::ending(vec![Err(Status::permission_denied("bad token"))]));
        connector.push(ScriptedStream::open(Vec::new()));

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(subscribe(state.clone(), shutdown.clone()));

        wait_until(|| connector.requests().len() == 2).await;
        assert_eq!(connector.requests()[1].from_slot, Some(2_010));

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_subscription_resumes_from_recent_checkpoint() {
        let rpc = Arc::new(MockRpc::default());
        let connector = Arc::new(MockConnector::default());
        let state = Arc::new(test_state(rpc.clone(), connector.clone()).await);
        rpc.set_slot(10_000);

        let (subscription, hash) = SubscriptionFilter::new(Vec::new()).fingerprint().unwrap();
        let id = checkpoint::start_point_checkpoint(&state.db_pool, &hash, &subscription, 9_000).await.unwrap();
        checkpoint::advance_checkpoint(&state.db_pool, id, 9_500).await.unwrap();

        connector.push(ScriptedStream::open(Vec::new()));

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(subscribe(state.clone(), shutdown.clone()));

        wait_until(|| connector.requests().len() == 1).await;
        assert_eq!(connector.requests()[0].from_slot, Some(9_500));

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_handle_update_advances_checkpoint_on_interval() {
        let state = test_state(Arc::new(MockRpc::default()), Arc::new(MockConnector::default())).await;
        let handle = CheckpointHandle::default();

        // No checkpoint yet: nothing to advance.
        handle_update(&state, &handle, slot_update(110)).await;

        let id = checkpoint::start_point_checkpoint(&state.db_pool, "hash", "{}", 100).await.unwrap();
        handle.set(id);

        handle_update(&state, &handle, slot_update(110)).await;
        handle_update(&state, &handle, slot_update(115)).await;

        let row = checkpoint::get_checkpoint(&state.db_pool, id).await.unwrap().unwrap();
        assert_eq!(row.to_slot, 110);
    }

    #[tokio::test]
    async fn test_handle_update_enqueues_failed_signatures() {
        let state = test_state(Arc::new(MockRpc::default()), Arc::new(MockConnector::default())).await;

        handle_update(&state, &CheckpointHandle::default(), account_update(321, &signature(9))).await;

        let queued = unprocessed::get_unprocessed(&state.db_pool, 10, 0).await.unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].signature, signature(9).to_string());
        assert_eq!(queued[0].slot, 321);
    }
}
