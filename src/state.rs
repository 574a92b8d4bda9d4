use crate::blockchain::backfill::BackfillConfig;
use crate::blockchain::client::LedgerRpc;
use crate::blockchain::geyser::GeyserConnector;
use crate::blockchain::processor::{ProcessorConfig, TransactionProcessor};
use crate::blockchain::stream::StreamConfig;
use crate::cache::MintFilterCache;
use crate::config::Config;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub db_pool: SqlitePool,
    pub rpc: Arc<dyn LedgerRpc>,
    pub connector: Arc<dyn GeyserConnector>,
    pub mint_cache: MintFilterCache,
    pub processor: TransactionProcessor,
    pub backfill: BackfillConfig,
    pub stream: StreamConfig,
}

impl AppState {
    pub fn new(
        config: Config,
        db_pool: SqlitePool,
        rpc: Arc<dyn LedgerRpc>,
        connector: Arc<dyn GeyserConnector>,
    ) -> Self {
        let mint_cache = MintFilterCache::new(config.mint_cache_ttl);
        let processor = TransactionProcessor::new(
            db_pool.clone(),
            rpc.clone(),
            mint_cache.clone(),
            ProcessorConfig::from(&config),
        );
        let stream = StreamConfig {
            max_reconnect_attempts: config.grpc_max_reconnect_attempts,
            ..StreamConfig::default()
        };

        Self {
            config,
            db_pool,
            rpc,
            connector,
            mint_cache,
            processor,
            backfill: BackfillConfig::default(),
            stream,
        }
    }
}
