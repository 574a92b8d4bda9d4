use crate::blockchain::client::ClientError;
use crate::models::{FetchedTransaction, TokenBalance, TransactionMeta};
use chrono::DateTime;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, UiLoadedAddresses, UiTransactionStatusMeta,
    UiTransactionTokenBalance,
};
use std::str::FromStr;

/// Convert an RPC `getTransaction` response into the ledger shape the
/// processor works on.
pub fn decode_transaction(
    signature: &Signature,
    tx_data: EncodedConfirmedTransactionWithStatusMeta,
) -> Result<FetchedTransaction, ClientError> {
    let transaction = tx_data
        .transaction
        .transaction
        .decode()
        .ok_or_else(|| ClientError::Decode(format!("unsupported transaction encoding for {}", signature)))?;

    let meta = match tx_data.transaction.meta {
        Some(meta) => decode_meta(meta)?,
        None => return Err(ClientError::Decode(format!("transaction {} has no metadata", signature))),
    };

    let block_time = tx_data
        .block_time
        .and_then(|secs| DateTime::from_timestamp(secs, 0));

    Ok(FetchedTransaction {
        slot: tx_data.slot,
        block_time,
        transaction,
        meta,
    })
}

fn decode_meta(meta: UiTransactionStatusMeta) -> Result<TransactionMeta, ClientError> {
    let failed = meta.err.is_some();

    let pre_token_balances = Option::<Vec<UiTransactionTokenBalance>>::from(meta.pre_token_balances)
        .unwrap_or_default()
        .into_iter()
        .map(decode_token_balance)
        .collect::<Result<Vec<_>, _>>()?;

    let post_token_balances = Option::<Vec<UiTransactionTokenBalance>>::from(meta.post_token_balances)
        .unwrap_or_default()
        .into_iter()
        .map(decode_token_balance)
        .collect::<Result<Vec<_>, _>>()?;

    let (loaded_writable, loaded_readonly) = match Option::<UiLoadedAddresses>::from(meta.loaded_addresses) {
        Some(loaded) => (parse_pubkeys(&loaded.writable)?, parse_pubkeys(&loaded.readonly)?),
        None => (Vec::new(), Vec::new()),
    };

    Ok(TransactionMeta {
        failed,
        pre_token_balances,
        post_token_balances,
        loaded_writable,
        loaded_readonly,
    })
}

fn decode_token_balance(balance: UiTransactionTokenBalance) -> Result<TokenBalance, ClientError> {
    let mint = parse_pubkey(&balance.mint)?;
    let owner = Option::<String>::from(balance.owner)
        .filter(|owner| !owner.is_empty())
        .map(|owner| parse_pubkey(&owner))
        .transpose()?;
    let amount = balance
        .ui_token_amount
        .amount
        .parse::<u64>()
        .map_err(|e| ClientError::Decode(format!("invalid token amount {}: {}", balance.ui_token_amount.amount, e)))?;

    Ok(TokenBalance {
        account_index: balance.account_index,
        mint,
        owner,
        amount,
    })
}

fn parse_pubkey(value: &str) -> Result<Pubkey, ClientError> {
    Pubkey::from_str(value).map_err(|_| ClientError::Decode(format!("invalid public key {}", value)))
}

fn parse_pubkeys(values: &[String]) -> Result<Vec<Pubkey>, ClientError> {
    values.iter().map(|v| parse_pubkey(v)).collect()
}
