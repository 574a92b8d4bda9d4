//! Resilient subscription over a [`GeyserConnector`].
//!
//! A client moves `Idle -> Connected -> Streaming`. Transient stream failures
//! move it to `Reconnecting`, which resubscribes from the last observed slot
//! and returns to `Streaming`. Any other failure, an exhausted reconnect budget
//! or [`GeyserClient::close`] leaves it `Closed`.

use crate::blockchain::geyser::{GeyserConnector, StreamError, UpdateStream};
use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use yellowstone_grpc_proto::prelude::{subscribe_update::UpdateOneof, SubscribeRequest, SubscribeRequestFilterSlots, SubscribeUpdate};

pub const INTERNAL_SLOT_FILTER: &str = "internal_slot_tracker";

pub type ErrorCallback = Arc<dyn Fn(&StreamError) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Connected,
    Streaming,
    Reconnecting,
    Closed,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub reconnect_interval: Duration,
    pub reconnect_window: Duration,
    /// Zero or negative means "as many as the window allows".
    pub max_reconnect_attempts: i64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(5),
            reconnect_window: Duration::from_secs(20 * 60),
            max_reconnect_attempts: 0,
        }
    }
}

impl StreamConfig {
    pub fn reconnect_attempts(&self) -> u32 {
        let interval = self.reconnect_interval.as_millis().max(1);
        let ceiling = (self.reconnect_window.as_millis() / interval).clamp(1, u32::MAX as u128) as u32;

        if self.max_reconnect_attempts <= 0 {
            ceiling
        } else {
            ceiling.min(self.max_reconnect_attempts.min(u32::MAX as i64) as u32)
        }
    }
}

struct ClientState {
    phase: StreamPhase,
    last_slot: u64,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

pub struct GeyserClient {
    connector: Arc<dyn GeyserConnector>,
    config: StreamConfig,
    state: Arc<Mutex<ClientState>>,
}

fn lock(state: &Mutex<ClientState>) -> MutexGuard<'_, ClientState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl GeyserClient {
    pub fn new(connector: Arc<dyn GeyserConnector>, config: StreamConfig) -> Self {
        Self {
            connector,
            config,
            state: Arc::new(Mutex::new(ClientState {
                phase: StreamPhase::Idle,
                last_slot: 0,
                cancel: None,
                task: None,
            })),
        }
    }

    pub fn phase(&self) -> StreamPhase {
        lock(&self.state).phase
    }

    pub fn last_slot(&self) -> u64 {
        lock(&self.state).last_slot
    }

    /// Opens the subscription and starts forwarding updates to `sink`.
    ///
    /// Errors from the initial connection are returned. Everything after that
    /// is reported through `on_error`, including each failed reconnect.
    pub async fn subscribe(
        &self,
        mut request: SubscribeRequest,
        sink: mpsc::Sender<SubscribeUpdate>,
        on_error: ErrorCallback,
    ) -> Result<(), StreamError> {
        {
            let state = lock(&self.state);
            if matches!(
                state.phase,
                StreamPhase::Connected | StreamPhase::Streaming | StreamPhase::Reconnecting
            ) {
                return Err(StreamError::AlreadySubscribed);
            }
        }

        let internal_slots = request.slots.is_empty();
        if internal_slots {
            request
                .slots
                .insert(INTERNAL_SLOT_FILTER.to_string(), SubscribeRequestFilterSlots::default());
        }

        let stream = self.connector.subscribe(request.clone()).await?;

        let cancel = CancellationToken::new();
        {
            let mut state = lock(&self.state);
            state.phase = StreamPhase::Connected;
            state.last_slot = 0;
            state.cancel = Some(cancel.clone());
        }

        let receiver = ReceiveLoop {
            connector: self.connector.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
            request,
            internal_slots,
            sink,
            on_error,
            cancel,
        };

        let task = tokio::spawn(receiver.run(stream));

        let mut state = lock(&self.state);
        if state.phase == StreamPhase::Connected {
            state.phase = StreamPhase::Streaming;
        }
        state.task = Some(task);

        Ok(())
    }

    /// Stops the receive loop and drops the transport. Safe to call repeatedly.
    pub async fn close(&self) {
        let (cancel, task) = {
            let mut state = lock(&self.state);
            (state.cancel.take(), state.task.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Stream receive task ended abnormally: {}", e);
            }
        }

        lock(&self.state).phase = StreamPhase::Closed;
    }
}

struct ReceiveLoop {
    connector: Arc<dyn GeyserConnector>,
    config: StreamConfig,
    state: Arc<Mutex<ClientState>>,
    request: SubscribeRequest,
    internal_slots: bool,
    sink: mpsc::Sender<SubscribeUpdate>,
    on_error: ErrorCallback,
    cancel: CancellationToken,
}

impl ReceiveLoop {
    async fn run(self, mut stream: UpdateStream) {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = stream.next() => next,
            };

            let err = match next {
                Some(Ok(update)) => {
                    if !self.forward(update).await {
                        break;
                    }
                    continue;
                }
                Some(Err(status)) => StreamError::from(status),
                None => StreamError::EndOfStream,
            };

            if self.cancel.is_cancelled() {
                break;
            }

            (self.on_error)(&err);

            if !err.is_transient() {
                warn!("Stream failed with non-recoverable error: {}", err);
                break;
            }

            match self.reconnect().await {
                Some(next_stream) => stream = next_stream,
                None => break,
            }
        }

        lock(&self.state).phase = StreamPhase::Closed;
        debug!("Stream receive loop exited");
    }

    /// Returns false once the loop should stop.
    async fn forward(&self, update: SubscribeUpdate) -> bool {
        if let Some(UpdateOneof::Slot(slot)) = &update.update_oneof {
            if slot.slot > 0 {
                lock(&self.state).last_slot = slot.slot;
            }
            if self.internal_slots {
                return true;
            }
        }

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.sink.send(update) => {
                if sent.is_err() {
                    (self.on_error)(&StreamError::SinkClosed);
                    return false;
                }
                true
            }
        }
    }

    async fn reconnect(&self) -> Option<UpdateStream> {
        lock(&self.state).phase = StreamPhase::Reconnecting;
        let attempts = self.config.reconnect_attempts();

        for attempt in 1..=attempts {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(self.config.reconnect_interval) => {}
            }

            let last_slot = lock(&self.state).last_slot;
            let mut request = self.request.clone();
            request.from_slot = (last_slot > 0).then_some(last_slot);

            match self.connector.subscribe(request).await {
                Ok(stream) => {
                    info!("Reconnected on attempt {}/{} from slot {:?}", attempt, attempts, (last_slot > 0).then_some(last_slot));
                    let mut state = lock(&self.state);
                    if self.cancel.is_cancelled() {
                        return None;
                    }
                    state.phase = StreamPhase::Streaming;
                    return Some(stream);
                }
                Err(e) => {
                    warn!("Reconnect attempt {}/{} failed: {}", attempt, attempts, e);
                    (self.on_error)(&StreamError::ReconnectFailed {
                        attempt,
                        source: Box::new(e),
                    });
                }
            }
        }

        (self.on_error)(&StreamError::ReconnectExhausted(attempts));
        None
    }
}
