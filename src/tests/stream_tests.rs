//! tests/stream_tests.rs - geyser client reconnects and shutdown

#[cfg(test)]
mod tests {
    use crate::blockchain::geyser::{StreamError, SubscriptionFilter};
    use crate::blockchain::stream::{ErrorCallback, GeyserClient, StreamConfig, StreamPhase, INTERNAL_SLOT_FILTER};
    use crate::tests::mocks::{account_update, signature, slot_update, wait_until, MockConnector, ScriptedStream};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use yellowstone_grpc_proto::prelude::{subscribe_update::UpdateOneof, SubscribeRequest};
    use yellowstone_grpc_proto::tonic::{Code, Status};

    fn fast_config() -> StreamConfig {
        StreamConfig {
            reconnect_interval: Duration::from_millis(5),
            reconnect_window: Duration::from_millis(15),
            max_reconnect_attempts: 0,
        }
    }

    fn collect_errors() -> (ErrorCallback, Arc<Mutex<Vec<StreamError>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        let callback: ErrorCallback = Arc::new(move |err: &StreamError| sink.lock().unwrap().push(err.clone()));
        (callback, errors)
    }

    fn request() -> SubscribeRequest {
        SubscriptionFilter::new(vec!["mint-a".to_string()]).to_request(Some(1_000))
    }

    #[test]
    fn test_reconnect_attempts_bounded_by_window() {
        let config = StreamConfig::default();
        assert_eq!(config.reconnect_attempts(), 240);

        let capped = StreamConfig {
            max_reconnect_attempts: 3,
            ..StreamConfig::default()
        };
        assert_eq!(capped.reconnect_attempts(), 3);
        assert_eq!(fast_config().reconnect_attempts(), 3);
    }

    #[tokio::test]
    async fn test_reconnect_resumes_from_last_slot() {
        let connector = Arc::new(MockConnector::with_scripts(vec![
            ScriptedStream::ending(vec![Ok(slot_update(42)), Err(Status::unavailable("node restarting"))]),
            ScriptedStream::open(vec![Ok(slot_update(43))]),
        ]));
        let client = GeyserClient::new(connector.clone(), fast_config());
        let (on_error, errors) = collect_errors();
        let (tx, mut rx) = mpsc::channel(16);

        client.subscribe(request(), tx, on_error).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first.update_oneof, Some(UpdateOneof::Slot(ref s)) if s.slot == 42));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.update_oneof, Some(UpdateOneof::Slot(ref s)) if s.slot == 43));

        let requests = connector.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].from_slot, Some(1_000));
        assert_eq!(requests[1].from_slot, Some(42));
        assert_eq!(requests[1].accounts, requests[0].accounts);

        {
            let errors = errors.lock().unwrap();
            assert_eq!(errors.len(), 1);
            assert!(matches!(&errors[0], StreamError::Status { code: Code::Unavailable, .. }));
        }
        assert_eq!(client.phase(), StreamPhase::Streaming);
        assert_eq!(client.last_slot(), 43);

        client.close().await;
    }

    #[tokio::test]
    async fn test_reconnect_without_slots_replays_nothing() {
        let connector = Arc::new(MockConnector::with_scripts(vec![
            ScriptedStream::ending(Vec::new()),
            ScriptedStream::open(Vec::new()),
        ]));
        let client = GeyserClient::new(connector.clone(), fast_config());
        let (on_error, errors) = collect_errors();
        let (tx, _rx) = mpsc::channel(16);

        client.subscribe(request(), tx, on_error).await.unwrap();
        wait_until(|| connector.requests().len() == 2).await;

        assert_eq!(connector.requests()[1].from_slot, None);
        assert!(matches!(errors.lock().unwrap()[0], StreamError::EndOfStream));

        client.close().await;
    }

    #[tokio::test]
    async fn test_terminal_error_stops_stream() {
        let connector = Arc::new(MockConnector::with_scripts(vec![ScriptedStream::ending(vec![Err(
            Status::permission_denied("bad token"),
        )])]));
        let client = GeyserClient::new(connector.clone(), fast_config());
        let (on_error, errors) = collect_errors();
        let (tx, _rx) = mpsc::channel(16);

        client.subscribe(request(), tx, on_error).await.unwrap();
        wait_until(|| client.phase() == StreamPhase::Closed).await;

        assert_eq!(connector.requests().len(), 1);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], StreamError::Status { code: Code::PermissionDenied, .. }));
    }

    #[tokio::test]
    async fn test_reconnect_gives_up_after_window() {
        let connector = Arc::new(MockConnector::with_scripts(vec![ScriptedStream::ending(vec![Err(
            Status::unavailable("gone"),
        )])]));
        let client = GeyserClient::new(connector.clone(), fast_config());
        let (on_error, errors) = collect_errors();
        let (tx, _rx) = mpsc::channel(16);

        client.subscribe(request(), tx, on_error).await.unwrap();
        wait_until(|| client.phase() == StreamPhase::Closed).await;

        // Initial subscribe plus three failed reconnects.
        assert_eq!(connector.requests().len(), 4);

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 5);
        assert!(matches!(errors[1], StreamError::ReconnectFailed { attempt: 1, .. }));
        assert!(matches!(errors[3], StreamError::ReconnectFailed { attempt: 3, .. }));
        let last = errors.last().unwrap();
        assert!(matches!(last, StreamError::ReconnectExhausted(3)));
        assert_eq!(last.to_string(), "failed to reconnect after 3 attempts");
    }

    #[tokio::test]
    async fn test_internal_slot_updates_are_not_forwarded() {
        let connector = Arc::new(MockConnector::with_scripts(vec![ScriptedStream::open(vec![
            Ok(slot_update(7)),
            Ok(account_update(7, &signature(1))),
        ])]));
        let client = GeyserClient::new(connector.clone(), fast_config());
        let (on_error, _errors) = collect_errors();
        let (tx, mut rx) = mpsc::channel(16);

        let mut bare = request();
        bare.slots.clear();
        client.subscribe(bare, tx, on_error).await.unwrap();

        let update = rx.recv().await.unwrap();
        assert!(matches!(update.update_oneof, Some(UpdateOneof::Account(_))));
        assert_eq!(client.last_slot(), 7);
        assert!(connector.requests()[0].slots.contains_key(INTERNAL_SLOT_FILTER));

        client.close().await;
    }

    #[tokio::test]
    async fn test_second_subscribe_is_rejected() {
        let connector = Arc::new(MockConnector::with_scripts(vec![
            ScriptedStream::open(Vec::new()),
            ScriptedStream::open(Vec::new()),
        ]));
        let client = GeyserClient::new(connector.clone(), fast_config());
        let (on_error, _errors) = collect_errors();
        let (tx, _rx) = mpsc::channel(16);

        client.subscribe(request(), tx.clone(), on_error.clone()).await.unwrap();
        let second = client.subscribe(request(), tx, on_error).await;
        assert!(matches!(second, Err(StreamError::AlreadySubscribed)));
        assert_eq!(connector.requests().len(), 1);

        client.close().await;
        assert_eq!(client.phase(), StreamPhase::Closed);
        client.close().await;
        assert_eq!(client.phase(), StreamPhase::Closed);
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_returned() {
        let connector = Arc::new(MockConnector::default());
        let client = GeyserClient::new(connector, fast_config());
        let (on_error, errors) = collect_errors();
        let (tx, _rx) = mpsc::channel(16);

        let result = client.subscribe(request(), tx, on_error).await;
        assert!(matches!(result, Err(StreamError::Connect(_))));
        assert!(errors.lock().unwrap().is_empty());
        assert_eq!(client.phase(), StreamPhase::Idle);
    }
}
