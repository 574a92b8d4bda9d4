//! In-memory stand-ins for the ledger RPC and the geyser transport.

use crate::blockchain::backfill::BackfillConfig;
use crate::blockchain::client::{ClientError, LedgerRpc, SignaturesForAddressOptions};
use crate::blockchain::geyser::{GeyserConnector, StreamError, UpdateStream};
use crate::blockchain::processor::{ProcessorConfig, TransactionProcessor};
use crate::blockchain::retry::RetryPolicy;
use crate::blockchain::stream::StreamConfig;
use crate::config::Config;
use crate::db::connection::connect_in_memory;
use crate::models::{FetchedTransaction, SignatureInfo, TokenBalance, TransactionMeta};
use crate::state::AppState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use solana_sdk::hash::Hash;
use solana_sdk::instruction::CompiledInstruction;
use solana_sdk::message::v0::{self, MessageAddressTableLookup};
use solana_sdk::message::{Message, MessageHeader, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use yellowstone_grpc_proto::prelude::{
    subscribe_update::UpdateOneof, SubscribeRequest, SubscribeUpdate, SubscribeUpdateAccount,
    SubscribeUpdateAccountInfo, SubscribeUpdateSlot,
};
use yellowstone_grpc_proto::tonic::Status;

pub fn signature(seed: u8) -> Signature {
    Signature::from([seed; 64])
}

#[derive(Default)]
pub struct MockRpc {
    transactions: Mutex<HashMap<Signature, FetchedTransaction>>,
    signatures: Mutex<HashMap<Pubkey, Vec<SignatureInfo>>>,
    blocks: Mutex<HashMap<u64, Vec<Signature>>>,
    slot: AtomicU64,
    fetched: Mutex<Vec<Signature>>,
}

impl MockRpc {
    pub fn add_transaction(&self, tx: FetchedTransaction) {
        self.transactions.lock().unwrap().insert(tx.signature(), tx);
    }

    /// `infos` newest first, the order the ledger returns them in.
    pub fn set_address_signatures(&self, address: Pubkey, infos: Vec<SignatureInfo>) {
        self.signatures.lock().unwrap().insert(address, infos);
    }

    pub fn set_block(&self, slot: u64, signatures: Vec<Signature>) {
        self.blocks.lock().unwrap().insert(slot, signatures);
    }

    pub fn set_slot(&self, slot: u64) {
        self.slot.store(slot, Ordering::SeqCst);
    }

    pub fn fetched(&self) -> Vec<Signature> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerRpc for MockRpc {
    async fn get_transaction(&self, signature: &Signature) -> Result<FetchedTransaction, ClientError> {
        self.fetched.lock().unwrap().push(*signature);
        self.transactions
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(signature.to_string()))
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        options: SignaturesForAddressOptions,
    ) -> Result<Vec<SignatureInfo>, ClientError> {
        let all = self.signatures.lock().unwrap().get(address).cloned().unwrap_or_default();

        let start = options
            .before
            .and_then(|before| all.iter().position(|info| info.signature == before))
            .map(|i| i + 1)
            .unwrap_or(0);

        let page = all
            .into_iter()
            .skip(start)
            .take_while(|info| Some(info.signature) != options.until)
            .take(options.limit.unwrap_or(1000))
            .collect();

        Ok(page)
    }

    async fn get_block_signatures(&self, slot: u64) -> Result<Vec<Signature>, ClientError> {
        Ok(self.blocks.lock().unwrap().get(&slot).cloned().unwrap_or_default())
    }

    async fn get_slot(&self) -> Result<u64, ClientError> {
        Ok(self.slot.load(Ordering::SeqCst))
    }
}

/// One scripted subscription: the updates it yields, and whether it then
/// stays open or ends.
pub struct ScriptedStream {
    pub updates: Vec<Result<SubscribeUpdate, Status>>,
    pub stay_open: bool,
}

impl ScriptedStream {
    pub fn open(updates: Vec<Result<SubscribeUpdate, Status>>) -> Self {
        Self { updates, stay_open: true }
    }

    pub fn ending(updates: Vec<Result<SubscribeUpdate, Status>>) -> Self {
        Self {
            updates,
            stay_open: false,
        }
    }
}

/// Serves scripted streams in order and fails to connect once they run out.
#[derive(Default)]
pub struct MockConnector {
    scripts: Mutex<VecDeque<ScriptedStream>>,
    requests: Mutex<Vec<SubscribeRequest>>,
}

impl MockConnector {
    pub fn with_scripts(scripts: Vec<ScriptedStream>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, script: ScriptedStream) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn requests(&self) -> Vec<SubscribeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GeyserConnector for MockConnector {
    async fn subscribe(&self, request: SubscribeRequest) -> Result<UpdateStream, StreamError> {
        self.requests.lock().unwrap().push(request);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| StreamError::Connect("connection refused".to_string()))?;

        let updates = stream::iter(script.updates);
        if script.stay_open {
            Ok(updates.chain(stream::pending()).boxed())
        } else {
            Ok(updates.boxed())
        }
    }
}

pub fn slot_update(slot: u64) -> SubscribeUpdate {
    SubscribeUpdate {
        update_oneof: Some(UpdateOneof::Slot(SubscribeUpdateSlot {
            slot,
            ..Default::default()
        })),
        ..Default::default()
    }
}

pub fn account_update(slot: u64, txn_signature: &Signature) -> SubscribeUpdate {
    SubscribeUpdate {
        update_oneof: Some(UpdateOneof::Account(SubscribeUpdateAccount {
            account: Some(SubscribeUpdateAccountInfo {
                txn_signature: Some(txn_signature.as_ref().to_vec()),
                ..Default::default()
            }),
            slot,
            ..Default::default()
        })),
        ..Default::default()
    }
}

/// Legacy transaction over `account_keys` with the given instructions.
pub fn build_transaction(
    signature: Signature,
    slot: u64,
    account_keys: Vec<Pubkey>,
    instructions: Vec<CompiledInstruction>,
    meta: TransactionMeta,
) -> FetchedTransaction {
    let message = Message {
        header: MessageHeader {
            num_required_signatures: 1,
            num_readonly_signed_accounts: 0,
            num_readonly_unsigned_accounts: 0,
        },
        account_keys,
        recent_blockhash: Hash::default(),
        instructions,
    };

    FetchedTransaction {
        slot,
        block_time: DateTime::<Utc>::from_timestamp(2_000, 0),
        transaction: VersionedTransaction {
            signatures: vec![signature],
            message: VersionedMessage::Legacy(message),
        },
        meta,
    }
}

/// A v0 transaction whose instructions may index into lookup-table addresses;
/// `meta` carries the addresses the lookups loaded.
pub fn build_v0_transaction(
    signature: Signature,
    slot: u64,
    static_keys: Vec<Pubkey>,
    lookups: Vec<MessageAddressTableLookup>,
    instructions: Vec<CompiledInstruction>,
    meta: TransactionMeta,
) -> FetchedTransaction {
    let message = v0::Message {
        header: MessageHeader {
            num_required_signatures: 1,
            num_readonly_signed_accounts: 0,
            num_readonly_unsigned_accounts: 0,
        },
        account_keys: static_keys,
        recent_blockhash: Hash::default(),
        instructions,
        address_table_lookups: lookups,
    };

    FetchedTransaction {
        slot,
        block_time: DateTime::<Utc>::from_timestamp(2_000, 0),
        transaction: VersionedTransaction {
            signatures: vec![signature],
            message: VersionedMessage::V0(message),
        },
        meta,
    }
}

pub fn token_balance(account_index: u8, mint: Pubkey, owner: Pubkey, amount: u64) -> TokenBalance {
    TokenBalance {
        account_index,
        mint,
        owner: Some(owner),
        amount,
    }
}

/// A transaction that moves `amount` of `mint` into a fresh token account.
pub fn balance_transaction(signature: Signature, slot: u64, mint: Pubkey, amount: u64) -> FetchedTransaction {
    let payer = Pubkey::new_unique();
    let token_account = Pubkey::new_unique();
    let owner = Pubkey::new_unique();

    let meta = TransactionMeta {
        post_token_balances: vec![token_balance(1, mint, owner, amount)],
        ..Default::default()
    };
    build_transaction(signature, slot, vec![payer, token_account], Vec::new(), meta)
}

pub fn fast_processor_config(config: &Config) -> ProcessorConfig {
    ProcessorConfig {
        fetch_retry: RetryPolicy::new(1, Duration::ZERO),
        ..ProcessorConfig::from(config)
    }
}

/// State over an in-memory database with retries and delays shortened.
pub async fn test_state(rpc: Arc<MockRpc>, connector: Arc<MockConnector>) -> AppState {
    let pool = connect_in_memory().await.expect("Failed to open in-memory database");
    let config = Config {
        mint_poll_interval: Duration::from_millis(10),
        worker_count: 2,
        ..Config::default()
    };

    let mut state = AppState::new(config, pool, rpc, connector);
    state.processor = TransactionProcessor::new(
        state.db_pool.clone(),
        state.rpc.clone(),
        state.mint_cache.clone(),
        fast_processor_config(&state.config),
    );
    state.backfill = BackfillConfig {
        transaction_delay: Duration::ZERO,
        page_delay: Duration::ZERO,
        retry: RetryPolicy::new(1, Duration::ZERO),
        ..BackfillConfig::default()
    };
    state.stream = StreamConfig {
        reconnect_interval: Duration::from_millis(10),
        reconnect_window: Duration::from_millis(100),
        max_reconnect_attempts: 0,
    };
    state
}

/// Polls `condition` until it holds, panicking after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not met within 2s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
