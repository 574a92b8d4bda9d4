use crate::blockchain::subscription::{handle_update, CheckpointHandle};
use crate::state::AppState;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use yellowstone_grpc_proto::prelude::SubscribeUpdate;

pub const UPDATE_CHANNEL_CAPACITY: usize = 3000;

/// Stream updates fan out to `worker_count` tasks sharing one receiver.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    sender: mpsc::Sender<SubscribeUpdate>,
}

struct WorkerHandle {
    id: usize,
    handle: tokio::task::JoinHandle<()>,
}

impl WorkerPool {
    pub fn new(state: Arc<AppState>, checkpoint: CheckpointHandle, worker_count: usize) -> Self {
        let (sender, receiver) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let receiver = Arc::new(Mutex::new(receiver));

        let worker_count = worker_count.max(1);
        let mut workers = Vec::with_capacity(worker_count);

        for id in 0..worker_count {
            let worker = Worker {
                id,
                state: state.clone(),
                checkpoint: checkpoint.clone(),
                receiver: receiver.clone(),
            };
            let handle = tokio::spawn(worker.run());
            workers.push(WorkerHandle { id, handle });
        }

        Self { workers, sender }
    }

    pub fn get_sender(&self) -> mpsc::Sender<SubscribeUpdate> {
        self.sender.clone()
    }

    /// Closes the channel and waits for workers to drain what is queued.
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.handle.await {
                debug!("Worker {} ended abnormally: {}", worker.id, e);
            }
        }
    }
}

struct Worker {
    id: usize,
    state: Arc<AppState>,
    checkpoint: CheckpointHandle,
    receiver: Arc<Mutex<mpsc::Receiver<SubscribeUpdate>>>,
}

impl Worker {
    async fn run(self) {
        debug!("Worker {} started", self.id);

        loop {
            let update = {
                let mut receiver = self.receiver.lock().await;
                match receiver.recv().await {
                    Some(update) => update,
                    None => {
                        info!("Worker {} channel closed, shutting down", self.id);
                        break;
                    }
                }
            };

            handle_update(&self.state, &self.checkpoint, update).await;
        }
    }
}
