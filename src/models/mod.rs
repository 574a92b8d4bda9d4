use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;

// Stored rows. Slots and amounts are kept as i64 since that is what SQLite
// integers hold.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Checkpoint {
    pub id: i64,
    pub from_slot: i64,
    pub to_slot: i64,
    pub subscription: String,
    pub subscription_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BalanceChange {
    pub signature: String,
    pub account: String,
    pub owner: Option<String>,
    pub mint: String,
    pub change: i64,
    pub balance: i64,
    pub slot: i64,
    pub block_timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClaimableAccount {
    pub signature: String,
    pub instruction_index: i64,
    pub slot: i64,
    pub mint: String,
    pub ethereum_address: String,
    pub account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClaimableAccountTransfer {
    pub signature: String,
    pub instruction_index: i64,
    pub amount: i64,
    pub slot: i64,
    pub from_account: String,
    pub to_account: String,
    pub sender_eth_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub signature: String,
    pub instruction_index: i64,
    pub route_index: i64,
    pub amount: i64,
    pub slot: i64,
    pub to_account: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Purchase {
    pub signature: String,
    pub instruction_index: i64,
    pub amount: i64,
    pub slot: i64,
    pub from_account: String,
    pub content_type: String,
    pub content_id: i64,
    pub buyer_user_id: i64,
    pub access_type: String,
    pub valid_after_blocknumber: i64,
    pub is_valid: Option<bool>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RewardDisbursement {
    pub signature: String,
    pub instruction_index: i64,
    pub amount: i64,
    pub slot: i64,
    pub user_bank: String,
    pub challenge_id: String,
    pub specifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UnprocessedTransaction {
    pub signature: String,
    pub slot: i64,
    pub error_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserBalance {
    pub identity: String,
    pub mint: String,
    pub balance: i64,
}

// Ledger-side shapes, decoded from RPC responses.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBalance {
    pub account_index: u8,
    pub mint: Pubkey,
    pub owner: Option<Pubkey>,
    pub amount: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionMeta {
    pub failed: bool,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
    pub loaded_writable: Vec<Pubkey>,
    pub loaded_readonly: Vec<Pubkey>,
}

#[derive(Debug, Clone)]
pub struct FetchedTransaction {
    pub slot: u64,
    pub block_time: Option<DateTime<Utc>>,
    pub transaction: VersionedTransaction,
    pub meta: TransactionMeta,
}

impl FetchedTransaction {
    pub fn signature(&self) -> Signature {
        self.transaction.signatures.first().copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureInfo {
    pub signature: Signature,
    pub slot: u64,
    pub failed: bool,
}
