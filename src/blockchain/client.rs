use crate::blockchain::models::decode_transaction;
use crate::config::Config;
use crate::models::{FetchedTransaction, SignatureInfo};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::{RpcBlockConfig, RpcSignaturesForAddressConfig, RpcTransactionConfig};
use solana_client::rpc_request::RpcRequest;
use solana_client::rpc_response::RpcConfirmedTransactionStatusWithSignature;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::{TransactionDetails, UiTransactionEncoding};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("RPC error: {0}")]
    RpcError(#[from] solana_client::client_error::ClientError),

    #[error("Invalid signature: {0}")]
    SignatureError(String),

    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Failed to decode transaction: {0}")]
    Decode(String),
}

/// Paging options for `getSignaturesForAddress`. Results come back newest
/// first, strictly older than `before` and strictly newer than `until`.
#[derive(Debug, Clone, Default)]
pub struct SignaturesForAddressOptions {
    pub before: Option<Signature>,
    pub until: Option<Signature>,
    pub limit: Option<usize>,
    pub min_context_slot: Option<u64>,
}

/// The slice of the JSON-RPC API the indexer depends on.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_transaction(&self, signature: &Signature) -> Result<FetchedTransaction, ClientError>;

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        options: SignaturesForAddressOptions,
    ) -> Result<Vec<SignatureInfo>, ClientError>;

    /// Signatures of a block in ledger order.
    async fn get_block_signatures(&self, slot: u64) -> Result<Vec<Signature>, ClientError>;

    async fn get_slot(&self) -> Result<u64, ClientError>;
}

pub struct SolanaClient {
    rpc_client: RpcClient,
    commitment: CommitmentConfig,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl SolanaClient {
    pub fn new(config: &Config) -> Self {
        let rpc_url = &config.solana_rpc_url;
        let timeout = Duration::from_secs(config.rpc_timeout_secs);

        let commitment = match config.solana_commitment_level.as_str() {
            "processed" => CommitmentConfig::processed(),
            "finalized" => CommitmentConfig::finalized(),
            _ => CommitmentConfig::confirmed(),
        };

        info!("Initializing Solana client with RPC endpoint: {}, commitment: {:?}", rpc_url, commitment);

        let rpc_client = RpcClient::new_with_timeout_and_commitment(rpc_url.clone(), timeout, commitment);

        let limiter = config
            .rpc_rate_limit
            .and_then(NonZeroU32::new)
            .map(|per_second| RateLimiter::direct(Quota::per_second(per_second)));

        Self {
            rpc_client,
            commitment,
            limiter,
        }
    }

    async fn throttle(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

#[async_trait]
impl LedgerRpc for SolanaClient {
    async fn get_transaction(&self, signature: &Signature) -> Result<FetchedTransaction, ClientError> {
        self.throttle().await;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        let tx = self.rpc_client.get_transaction_with_config(signature, config).await?;
        decode_transaction(signature, tx)
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        options: SignaturesForAddressOptions,
    ) -> Result<Vec<SignatureInfo>, ClientError> {
        self.throttle().await;

        let config = RpcSignaturesForAddressConfig {
            before: options.before.map(|s| s.to_string()),
            until: options.until.map(|s| s.to_string()),
            limit: options.limit,
            commitment: Some(self.commitment),
            min_context_slot: options.min_context_slot,
        };

        let statuses: Vec<RpcConfirmedTransactionStatusWithSignature> = self
            .rpc_client
            .send(RpcRequest::GetSignaturesForAddress, json!([address.to_string(), config]))
            .await?;

        debug!("Fetched {} signatures for {}", statuses.len(), address);

        statuses
            .into_iter()
            .map(|status| {
                let signature = Signature::from_str(&status.signature)
                    .map_err(|_| ClientError::SignatureError(status.signature.clone()))?;
                Ok(SignatureInfo {
                    signature,
                    slot: status.slot,
                    failed: status.err.is_some(),
                })
            })
            .collect()
    }

    async fn get_block_signatures(&self, slot: u64) -> Result<Vec<Signature>, ClientError> {
        self.throttle().await;

        let config = RpcBlockConfig {
            encoding: None,
            transaction_details: Some(TransactionDetails::Signatures),
            rewards: Some(false),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };

        let block = self.rpc_client.get_block_with_config(slot, config).await?;

        block
            .signatures
            .unwrap_or_default()
            .iter()
            .map(|sig| Signature::from_str(sig).map_err(|_| ClientError::SignatureError(sig.clone())))
            .collect()
    }

    async fn get_slot(&self) -> Result<u64, ClientError> {
        self.throttle().await;
        let slot = self.rpc_client.get_slot_with_commitment(self.commitment).await?;
        Ok(slot)
    }
}
