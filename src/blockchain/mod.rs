pub mod backfill;
pub mod client;
pub mod geyser;
pub mod models;
pub mod processor;
pub mod purchase;
pub mod retry;
pub mod retry_queue;
pub mod stream;
pub mod subscription;
pub mod worker_pool;

// Re-exports for convenience
pub use backfill::backfill;
pub use client::{LedgerRpc, SolanaClient};
pub use geyser::{GeyserConnector, YellowstoneConnector};
pub use processor::TransactionProcessor;
pub use retry_queue::schedule_retries;
pub use subscription::subscribe;
