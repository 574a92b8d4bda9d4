//! Yellowstone gRPC transport and the account filter the indexer subscribes with.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use yellowstone_grpc_client::GeyserGrpcClient;
use yellowstone_grpc_proto::prelude::{
    subscribe_request_filter_accounts_filter::Filter as AccountsFilter,
    subscribe_request_filter_accounts_filter_memcmp::Data as MemcmpData, CommitmentLevel, SubscribeRequest,
    SubscribeRequestFilterAccounts, SubscribeRequestFilterAccountsFilter, SubscribeRequestFilterAccountsFilterMemcmp,
    SubscribeRequestFilterSlots, SubscribeUpdate,
};
use yellowstone_grpc_proto::tonic::transport::ClientTlsConfig;
use yellowstone_grpc_proto::tonic::{Code, Status};

pub type UpdateStream = BoxStream<'static, Result<SubscribeUpdate, Status>>;

#[derive(Error, Debug, Clone)]
pub enum StreamError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("stream error ({code:?}): {message}")]
    Status { code: Code, message: String },

    #[error("stream ended")]
    EndOfStream,

    #[error("client is already subscribed")]
    AlreadySubscribed,

    #[error("failed to reconnect after {0} attempts")]
    ReconnectExhausted(u32),

    #[error("reconnect attempt {attempt} failed: {source}")]
    ReconnectFailed {
        attempt: u32,
        #[source]
        source: Box<StreamError>,
    },

    #[error("update receiver closed")]
    SinkClosed,
}

impl StreamError {
    /// Errors after which a resubscribe can pick up where the stream left off.
    pub fn is_transient(&self) -> bool {
        match self {
            StreamError::Status { code, .. } => matches!(code, Code::Unavailable | Code::DeadlineExceeded),
            StreamError::EndOfStream => true,
            _ => false,
        }
    }
}

impl From<Status> for StreamError {
    fn from(status: Status) -> Self {
        StreamError::Status {
            code: status.code(),
            message: status.message().to_string(),
        }
    }
}

/// Opens a subscription and yields its updates.
#[async_trait]
pub trait GeyserConnector: Send + Sync {
    async fn subscribe(&self, request: SubscribeRequest) -> Result<UpdateStream, StreamError>;
}

#[derive(Debug, Clone)]
pub struct YellowstoneConnector {
    endpoint: String,
    x_token: Option<String>,
    connect_timeout: Duration,
}

impl YellowstoneConnector {
    pub fn new(endpoint: impl Into<String>, x_token: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            x_token,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl GeyserConnector for YellowstoneConnector {
    async fn subscribe(&self, request: SubscribeRequest) -> Result<UpdateStream, StreamError> {
        let connect_err = |e: &dyn std::fmt::Display| StreamError::Connect(e.to_string());

        let mut builder = GeyserGrpcClient::build_from_shared(self.endpoint.clone())
            .map_err(|e| connect_err(&e))?
            .x_token(self.x_token.clone())
            .map_err(|e| connect_err(&e))?
            .connect_timeout(self.connect_timeout)
            .http2_keep_alive_interval(Duration::from_secs(10))
            .keep_alive_timeout(Duration::from_secs(1))
            .keep_alive_while_idle(true);

        if self.endpoint.starts_with("https://") {
            builder = builder
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| connect_err(&e))?;
        }

        let mut client = builder.connect().await.map_err(|e| connect_err(&e))?;
        info!("Connected to geyser endpoint {}", self.endpoint);

        let (sink, stream) = client
            .subscribe_with_request(Some(request))
            .await
            .map_err(|e| connect_err(&e))?;

        // The subscription lives as long as its request sink and client.
        let stream = stream.map(move |update| {
            let _ = (&sink, &client);
            update
        });

        Ok(stream.boxed())
    }
}

/// What the live subscription listens for. Serialized form feeds the
/// checkpoint fingerprint, so field order matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    pub commitment: String,
    pub slots: bool,
    pub mints: Vec<String>,
}

impl SubscriptionFilter {
    pub fn new(mut mints: Vec<String>) -> Self {
        mints.sort();
        mints.dedup();
        Self {
            commitment: "confirmed".to_string(),
            slots: true,
            mints,
        }
    }

    /// Serialized filter and its hex SHA-256.
    pub fn fingerprint(&self) -> Result<(String, String), serde_json::Error> {
        let json = serde_json::to_string(self)?;
        let hash = hex::encode(Sha256::digest(json.as_bytes()));
        Ok((json, hash))
    }

    pub fn to_request(&self, from_slot: Option<u64>) -> SubscribeRequest {
        let mut accounts = HashMap::new();
        for mint in &self.mints {
            accounts.insert(
                mint.clone(),
                SubscribeRequestFilterAccounts {
                    owner: vec![spl_token::ID.to_string()],
                    filters: vec![
                        SubscribeRequestFilterAccountsFilter {
                            filter: Some(AccountsFilter::TokenAccountState(true)),
                        },
                        SubscribeRequestFilterAccountsFilter {
                            filter: Some(AccountsFilter::Memcmp(SubscribeRequestFilterAccountsFilterMemcmp {
                                offset: 0,
                                data: Some(MemcmpData::Base58(mint.clone())),
                            })),
                        },
                    ],
                    ..Default::default()
                },
            );
        }

        let mut slots = HashMap::new();
        if self.slots {
            slots.insert(
                "checkpoints".to_string(),
                SubscribeRequestFilterSlots {
                    filter_by_commitment: Some(true),
                    ..Default::default()
                },
            );
        }

        SubscribeRequest {
            accounts,
            slots,
            commitment: Some(CommitmentLevel::Confirmed as i32),
            from_slot,
            ..Default::default()
        }
    }
}

/// Serialized subscription and fingerprint for a backfill over one program.
pub fn backfill_fingerprint(address: &Pubkey) -> (String, String) {
    let json = json!({ "type": "backfill", "address": address.to_string() }).to_string();
    let hash = hex::encode(Sha256::digest(json.as_bytes()));
    (json, hash)
}
