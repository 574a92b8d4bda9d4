use crate::blockchain::client::LedgerRpc;
use crate::blockchain::purchase::validate_purchase;
use crate::blockchain::retry::{with_retries, RetryPolicy};
use crate::cache::mint::is_tracked;
use crate::cache::{MintFilterCache, RecentTransactionCache};
use crate::config::Config;
use crate::db::{balance, claimable, payment, reward};
use crate::error::IndexerError;
use crate::models::{
    BalanceChange, ClaimableAccount, ClaimableAccountTransfer, FetchedTransaction, Payment, Purchase,
    RewardDisbursement, TransactionMeta,
};
use crate::programs::claimable_tokens::{self, ClaimableTokensData, SignedTransferData};
use crate::programs::memo::{self, find_location_memo, find_purchase_memo};
use crate::programs::payment_router::{self, PaymentRouterData};
use crate::programs::reward_manager::{self, split_disbursement_id, RewardManagerData};
use crate::programs::secp256k1::{self, SECP256K1_PROGRAM_ID};
use crate::programs::{eth_address_hex, DecodeError, InstructionAccounts, TrackedPrograms};
use solana_sdk::instruction::CompiledInstruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Token accounts written per mint; the scope of balance reconciliation.
type TouchedAccounts = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub programs: TrackedPrograms,
    pub network_take_rate: f64,
    pub staking_bridge: Pubkey,
    pub fetch_retry: RetryPolicy,
}

impl From<&Config> for ProcessorConfig {
    fn from(config: &Config) -> Self {
        Self {
            programs: config.programs,
            network_take_rate: config.network_take_rate,
            staking_bridge: config.staking_bridge_usdc_token_account,
            fetch_retry: RetryPolicy::fetch(),
        }
    }
}

/// Rows written for one transaction. Counts include rows that already
/// existed and were skipped by the conflict clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessSummary {
    pub skipped_failed: bool,
    pub balance_changes: usize,
    pub claimable_accounts: usize,
    pub claimable_transfers: usize,
    pub payments: usize,
    pub purchases: usize,
    pub reward_disbursements: usize,
    pub skipped_instructions: usize,
}

enum InstructionError {
    Decode(DecodeError),
    Store(sqlx::Error),
}

impl From<DecodeError> for InstructionError {
    fn from(e: DecodeError) -> Self {
        InstructionError::Decode(e)
    }
}

impl From<sqlx::Error> for InstructionError {
    fn from(e: sqlx::Error) -> Self {
        InstructionError::Store(e)
    }
}

/// Token amounts are stored as SQLite integers.
fn token_amount(amount: u64) -> Result<i64, DecodeError> {
    i64::try_from(amount).map_err(|_| DecodeError::AmountOverflow(amount))
}

/// Static keys followed by every lookup table's writable addresses, then every
/// lookup table's readonly addresses. This is the index space compiled
/// instructions refer to.
pub fn resolve_account_keys(tx: &VersionedTransaction, meta: &TransactionMeta) -> Result<Vec<Pubkey>, IndexerError> {
    let static_keys = tx.message.static_account_keys();
    let lookups = tx.message.address_table_lookups().unwrap_or_default();

    let writable: usize = lookups.iter().map(|l| l.writable_indexes.len()).sum();
    let readonly: usize = lookups.iter().map(|l| l.readonly_indexes.len()).sum();

    if writable != meta.loaded_writable.len() {
        return Err(IndexerError::LookupTable(format!(
            "expected {} loaded writable addresses, got {}",
            writable,
            meta.loaded_writable.len()
        )));
    }
    if readonly != meta.loaded_readonly.len() {
        return Err(IndexerError::LookupTable(format!(
            "expected {} loaded readonly addresses, got {}",
            readonly,
            meta.loaded_readonly.len()
        )));
    }

    let mut keys = Vec::with_capacity(static_keys.len() + writable + readonly);
    keys.extend_from_slice(static_keys);
    keys.extend_from_slice(&meta.loaded_writable);
    keys.extend_from_slice(&meta.loaded_readonly);
    Ok(keys)
}

/// One row per token account whose mint is tracked, with the post balance and
/// its difference from the pre balance. Missing pre balances count as zero,
/// as do missing post balances of closed accounts.
pub fn extract_balance_changes(
    signature: &str,
    slot: u64,
    block_timestamp: i64,
    meta: &TransactionMeta,
    account_keys: &[Pubkey],
    tracked_mints: &HashSet<String>,
) -> Result<Vec<BalanceChange>, IndexerError> {
    struct Totals {
        owner: Option<String>,
        mint: String,
        pre: u64,
        post: u64,
    }

    let mut totals: BTreeMap<u8, Totals> = BTreeMap::new();

    for pre in &meta.pre_token_balances {
        let mint = pre.mint.to_string();
        if !is_tracked(tracked_mints, &mint) {
            continue;
        }
        totals.insert(
            pre.account_index,
            Totals {
                owner: pre.owner.map(|o| o.to_string()),
                mint,
                pre: pre.amount,
                post: 0,
            },
        );
    }

    for post in &meta.post_token_balances {
        let mint = post.mint.to_string();
        if !is_tracked(tracked_mints, &mint) {
            continue;
        }
        let entry = totals.entry(post.account_index).or_insert_with(|| Totals {
            owner: post.owner.map(|o| o.to_string()),
            mint,
            pre: 0,
            post: 0,
        });
        if entry.owner.is_none() {
            entry.owner = post.owner.map(|o| o.to_string());
        }
        entry.post = post.amount;
    }

    totals
        .into_iter()
        .map(|(index, t)| {
            let account = account_keys.get(index as usize).ok_or_else(|| {
                IndexerError::Decode(DecodeError::AccountIndexOutOfRange {
                    index: index as usize,
                    len: account_keys.len(),
                })
            })?;
            Ok(BalanceChange {
                signature: signature.to_string(),
                account: account.to_string(),
                owner: t.owner,
                mint: t.mint,
                change: token_amount(t.post)? - token_amount(t.pre)?,
                balance: token_amount(t.post)?,
                slot: slot as i64,
                block_timestamp,
            })
        })
        .collect()
}

/// The signed transfer message carried by the secp256k1 instruction right
/// before a claimable tokens transfer.
fn signed_transfer_data(
    instructions: &[CompiledInstruction],
    account_keys: &[Pubkey],
    index: usize,
) -> Result<SignedTransferData, DecodeError> {
    let previous = index
        .checked_sub(1)
        .and_then(|i| instructions.get(i))
        .ok_or_else(|| DecodeError::Secp256k1("transfer has no preceding instruction".to_string()))?;

    let program_id = account_keys.get(previous.program_id_index as usize);
    if program_id != Some(&SECP256K1_PROGRAM_ID) {
        return Err(DecodeError::Secp256k1(
            "preceding instruction is not a secp256k1 verification".to_string(),
        ));
    }

    let secp = secp256k1::decode(&previous.data)?;
    let first = secp
        .signatures
        .first()
        .ok_or_else(|| DecodeError::Secp256k1("no signatures".to_string()))?;
    SignedTransferData::decode(&first.message)
}

/// Memo strings from `start` onward, in instruction order.
fn memos_from(instructions: &[CompiledInstruction], account_keys: &[Pubkey], start: usize) -> Vec<String> {
    instructions
        .iter()
        .skip(start)
        .filter(|ix| {
            account_keys
                .get(ix.program_id_index as usize)
                .is_some_and(memo::is_memo_program)
        })
        .map(|ix| String::from_utf8_lossy(&ix.data).into_owned())
        .collect()
}

#[derive(Clone)]
pub struct TransactionProcessor {
    pool: Pool<Sqlite>,
    rpc: Arc<dyn LedgerRpc>,
    mint_cache: MintFilterCache,
    recent: RecentTransactionCache,
    config: ProcessorConfig,
}

impl TransactionProcessor {
    pub fn new(
        pool: Pool<Sqlite>,
        rpc: Arc<dyn LedgerRpc>,
        mint_cache: MintFilterCache,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            pool,
            rpc,
            mint_cache,
            recent: RecentTransactionCache::default(),
            config,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Fetches a transaction by signature and indexes it. A zero `slot` takes
    /// the slot reported by the ledger.
    pub async fn process_signature(&self, slot: u64, signature: &Signature) -> Result<ProcessSummary, IndexerError> {
        let key = signature.to_string();
        if self.recent.contains(&key) {
            return Ok(ProcessSummary::default());
        }

        let rpc = self.rpc.clone();
        let fetched = with_retries(self.config.fetch_retry, "get_transaction", || {
            let rpc = rpc.clone();
            async move { rpc.get_transaction(signature).await }
        })
        .await?;

        let slot = if slot == 0 { fetched.slot } else { slot };
        let summary = self.process_transaction(slot, &fetched).await?;
        self.recent.mark_processed(&key).await;
        Ok(summary)
    }

    /// Indexes one transaction. Every row is written in a single database
    /// transaction; any store failure rolls all of them back.
    pub async fn process_transaction(
        &self,
        slot: u64,
        fetched: &FetchedTransaction,
    ) -> Result<ProcessSummary, IndexerError> {
        let signature = fetched.signature().to_string();
        let mut summary = ProcessSummary::default();

        if fetched.meta.failed {
            debug!(signature = %signature, slot, "Skipping failed transaction");
            summary.skipped_failed = true;
            return Ok(summary);
        }

        let account_keys = resolve_account_keys(&fetched.transaction, &fetched.meta)?;
        let block_timestamp = fetched.block_time.map(|t| t.timestamp()).unwrap_or(0);
        let tracked_mints = self.mint_cache.tracked_mints(&self.pool).await?;

        let changes = extract_balance_changes(
            &signature,
            slot,
            block_timestamp,
            &fetched.meta,
            &account_keys,
            &tracked_mints,
        )?;

        let mut touched: TouchedAccounts = BTreeMap::new();
        for change in &changes {
            touched.entry(change.mint.clone()).or_default().insert(change.account.clone());
        }

        let mut tx = self.pool.begin().await?;

        balance::insert_balance_changes(&mut tx, &changes).await?;
        summary.balance_changes = changes.len();

        let instructions = fetched.transaction.message.instructions();
        for (index, instruction) in instructions.iter().enumerate() {
            let Some(program_id) = account_keys.get(instruction.program_id_index as usize) else {
                continue;
            };
            if !self.config.programs.contains(program_id) {
                continue;
            }

            let ctx = InstructionContext {
                signature: &signature,
                slot,
                block_timestamp,
                index,
                instructions,
                account_keys: &account_keys,
            };

            let result = if *program_id == self.config.programs.claimable_tokens {
                self.claimable_tokens_instruction(&mut tx, &ctx, instruction, &mut summary, &mut touched)
                    .await
            } else if *program_id == self.config.programs.reward_manager {
                self.reward_manager_instruction(&mut tx, &ctx, instruction, &mut summary).await
            } else {
                self.payment_router_instruction(&mut tx, &ctx, instruction, &mut summary).await
            };

            match result {
                Ok(()) => {}
                Err(InstructionError::Decode(e)) => {
                    warn!(
                        signature = %signature,
                        slot,
                        instruction_index = index,
                        program_id = %program_id,
                        "Skipping instruction: {}",
                        e
                    );
                    summary.skipped_instructions += 1;
                }
                Err(InstructionError::Store(e)) => return Err(e.into()),
            }
        }

        for (mint, accounts) in touched.iter().filter(|(m, _)| is_tracked(&tracked_mints, m)) {
            balance::reconcile_user_balances(&mut tx, mint, accounts).await?;
        }

        tx.commit().await?;
        debug!(signature = %signature, slot, ?summary, "Processed transaction");

        Ok(summary)
    }

    async fn claimable_tokens_instruction(
        &self,
        conn: &mut SqliteConnection,
        ctx: &InstructionContext<'_>,
        instruction: &CompiledInstruction,
        summary: &mut ProcessSummary,
        touched: &mut TouchedAccounts,
    ) -> Result<(), InstructionError> {
        let accounts = InstructionAccounts::resolve(&instruction.accounts, ctx.account_keys)?;
        let decoded = claimable_tokens::decode(&instruction.data, accounts)?;

        match &decoded.data {
            ClaimableTokensData::CreateTokenAccount(create) => {
                let mint = decoded.mint()?.to_string();
                let row = ClaimableAccount {
                    signature: ctx.signature.to_string(),
                    instruction_index: ctx.index as i64,
                    slot: ctx.slot as i64,
                    mint: mint.clone(),
                    ethereum_address: eth_address_hex(&create.eth_address),
                    account: decoded.user_bank()?.to_string(),
                };
                claimable::insert_claimable_account(conn, &row).await?;
                debug!("claimable_tokens create {} for {}", row.account, row.ethereum_address);
                touched.entry(mint).or_default().insert(row.account.clone());
                summary.claimable_accounts += 1;
            }
            ClaimableTokensData::Transfer(transfer) => {
                let signed = signed_transfer_data(ctx.instructions, ctx.account_keys, ctx.index)?;
                let row = ClaimableAccountTransfer {
                    signature: ctx.signature.to_string(),
                    instruction_index: ctx.index as i64,
                    amount: token_amount(signed.amount)?,
                    slot: ctx.slot as i64,
                    from_account: decoded.sender_user_bank()?.to_string(),
                    to_account: decoded.destination()?.to_string(),
                    sender_eth_address: eth_address_hex(&transfer.sender_eth_address),
                };
                claimable::insert_claimable_transfer(conn, &row).await?;
                info!(
                    "claimable_tokens transfer of {} from {} to {}",
                    row.amount, row.from_account, row.to_account
                );
                summary.claimable_transfers += 1;
            }
        }

        Ok(())
    }

    async fn reward_manager_instruction(
        &self,
        conn: &mut SqliteConnection,
        ctx: &InstructionContext<'_>,
        instruction: &CompiledInstruction,
        summary: &mut ProcessSummary,
    ) -> Result<(), InstructionError> {
        let accounts = InstructionAccounts::resolve(&instruction.accounts, ctx.account_keys)?;
        let decoded = reward_manager::decode(&instruction.data, accounts)?;

        if let RewardManagerData::EvaluateAttestations(evaluate) = &decoded.data {
            let (challenge_id, specifier) = split_disbursement_id(&evaluate.disbursement_id);
            let row = RewardDisbursement {
                signature: ctx.signature.to_string(),
                instruction_index: ctx.index as i64,
                amount: token_amount(evaluate.amount)?,
                slot: ctx.slot as i64,
                user_bank: decoded.destination_user_bank()?.to_string(),
                challenge_id,
                specifier,
            };
            reward::insert_reward_disbursement(conn, &row).await?;
            info!(
                "reward_manager disbursement {}:{} of {} to {}",
                row.challenge_id, row.specifier, row.amount, row.user_bank
            );
            summary.reward_disbursements += 1;
        }

        Ok(())
    }

    async fn payment_router_instruction(
        &self,
        conn: &mut SqliteConnection,
        ctx: &InstructionContext<'_>,
        instruction: &CompiledInstruction,
        summary: &mut ProcessSummary,
    ) -> Result<(), InstructionError> {
        let accounts = InstructionAccounts::resolve(&instruction.accounts, ctx.account_keys)?;
        let decoded = payment_router::decode(&instruction.data, accounts)?;

        let PaymentRouterData::Route(route) = &decoded.data else {
            return Ok(());
        };

        let payments = decoded.payments()?;
        let sender = decoded.sender()?.to_string();

        for (route_index, (destination, amount)) in payments.iter().enumerate() {
            let row = Payment {
                signature: ctx.signature.to_string(),
                instruction_index: ctx.index as i64,
                route_index: route_index as i64,
                amount: token_amount(*amount)?,
                slot: ctx.slot as i64,
                to_account: destination.to_string(),
            };
            payment::insert_payment(conn, &row).await?;
            summary.payments += 1;
        }

        let memos = memos_from(ctx.instructions, ctx.account_keys, ctx.index);
        if let Some(purchase) = find_purchase_memo(memos.iter().map(String::as_str)) {
            let location = find_location_memo(memos.iter().map(String::as_str));
            let route_map = decoded.route_map()?;

            let validation = validate_purchase(
                conn,
                self.config.network_take_rate,
                &self.config.staking_bridge,
                &purchase,
                &route_map,
                ctx.block_timestamp,
            )
            .await?;
            if let Some(reason) = &validation.reason {
                warn!(signature = ctx.signature, instruction_index = ctx.index, "Invalid purchase: {}", reason);
            }

            let row = Purchase {
                signature: ctx.signature.to_string(),
                instruction_index: ctx.index as i64,
                amount: token_amount(route.total_amount)?,
                slot: ctx.slot as i64,
                from_account: sender.clone(),
                content_type: purchase.content_type.clone(),
                content_id: purchase.content_id,
                buyer_user_id: purchase.buyer_user_id,
                access_type: purchase.access_type.clone(),
                valid_after_blocknumber: purchase.valid_after_blocknumber,
                is_valid: validation.is_valid,
                city: non_empty(location.city),
                region: non_empty(location.region),
                country: non_empty(location.country),
            };
            payment::insert_purchase(conn, &row).await?;
            info!(
                "payment_router purchase of {} {} by user {}",
                row.content_type, row.content_id, row.buyer_user_id
            );
            summary.purchases += 1;
        }

        info!(
            "payment_router route from {} to {} destinations",
            sender,
            payments.len()
        );

        Ok(())
    }
}

struct InstructionContext<'a> {
    signature: &'a str,
    slot: u64,
    block_timestamp: i64,
    index: usize,
    instructions: &'a [CompiledInstruction],
    account_keys: &'a [Pubkey],
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
