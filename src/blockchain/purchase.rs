use crate::db::pricing::{self, PriceSplit};
use crate::programs::memo::PurchaseMemo;
use solana_sdk::pubkey::Pubkey;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::debug;

/// USDC has 6 decimals; one cent is 10^4 base units.
const USDC_PER_CENT: f64 = 10_000.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseValidation {
    /// `None` until the referenced block has been observed.
    pub is_valid: Option<bool>,
    pub reason: Option<String>,
}

impl PurchaseValidation {
    fn deferred() -> Self {
        Self { is_valid: None, reason: None }
    }

    fn valid() -> Self {
        Self { is_valid: Some(true), reason: None }
    }

    fn invalid(reason: String) -> Self {
        Self {
            is_valid: Some(false),
            reason: Some(reason),
        }
    }
}

/// Amount each payout wallet should receive for a price, in USDC base units.
///
/// The network cut goes to the staking bridge. The rest is split by
/// percentage, rounding down and then handing leftover units to the wallets
/// with the largest remainders.
pub fn expected_splits(
    price_cents: i64,
    splits: &[PriceSplit],
    payout_wallets: &HashMap<i64, String>,
    network_take_rate: f64,
    staking_bridge: &Pubkey,
) -> Result<HashMap<String, i64>, String> {
    let price_usdc = price_cents as f64 * USDC_PER_CENT;
    let network_cut = price_usdc * network_take_rate / 100.0;
    let seller_total = (price_usdc - network_cut) as i64;

    let mut amounts: Vec<(String, i64, f64)> = Vec::with_capacity(splits.len());
    for split in splits {
        let wallet = payout_wallets
            .get(&split.user_id)
            .ok_or_else(|| format!("no payout wallet for user {}", split.user_id))?;
        let exact = seller_total as f64 * split.percentage / 100.0;
        let floor = exact.floor();
        amounts.push((wallet.clone(), floor as i64, exact - floor));
    }

    let mut distributed: i64 = amounts.iter().map(|(_, amount, _)| amount).sum();
    while distributed < seller_total {
        let largest = amounts
            .iter_mut()
            .filter(|(_, _, remainder)| *remainder > 0.0)
            .max_by(|a, b| a.2.total_cmp(&b.2));
        let Some(entry) = largest else {
            break;
        };
        entry.1 += 1;
        entry.2 = 0.0;
        distributed += 1;
    }

    let mut expected = HashMap::new();
    for (wallet, amount, _) in amounts {
        *expected.entry(wallet).or_insert(0) += amount;
    }
    *expected.entry(staking_bridge.to_string()).or_insert(0) += network_cut as i64;

    Ok(expected)
}

/// Checks a route against the price in force for the memo's content.
pub async fn validate_purchase(
    conn: &mut SqliteConnection,
    network_take_rate: f64,
    staking_bridge: &Pubkey,
    memo: &PurchaseMemo,
    route_map: &HashMap<Pubkey, u64>,
    block_timestamp: i64,
) -> Result<PurchaseValidation, sqlx::Error> {
    let current_block = pricing::max_block_number(&mut *conn).await?;
    if memo.valid_after_blocknumber > current_block {
        debug!(
            "Purchase valid after block {} but latest block is {}",
            memo.valid_after_blocknumber, current_block
        );
        return Ok(PurchaseValidation::deferred());
    }

    let gate = pricing::get_relevant_price(
        &mut *conn,
        &memo.content_type,
        memo.content_id,
        &memo.access_type,
        memo.valid_after_blocknumber,
        block_timestamp,
    )
    .await?;
    let Some(gate) = gate else {
        return Ok(PurchaseValidation::invalid(format!(
            "no price found for {} {}",
            memo.content_type, memo.content_id
        )));
    };

    let user_ids: Vec<i64> = gate.splits.iter().map(|s| s.user_id).collect();
    let payout_wallets = pricing::get_payout_wallets(&mut *conn, &user_ids, block_timestamp).await?;

    let expected = match expected_splits(
        gate.price_cents,
        &gate.splits,
        &payout_wallets,
        network_take_rate,
        staking_bridge,
    ) {
        Ok(expected) => expected,
        Err(reason) => return Ok(PurchaseValidation::invalid(reason)),
    };

    for (account, expected_amount) in &expected {
        let key = match Pubkey::from_str(account) {
            Ok(key) => key,
            Err(_) => return Ok(PurchaseValidation::invalid(format!("invalid split account {}", account))),
        };
        let received = route_map.get(&key).copied().unwrap_or(0);
        if (received as i128) < (*expected_amount as i128) {
            return Ok(PurchaseValidation::invalid(format!(
                "payment for account {} not sufficient (expected {}, received {})",
                account, expected_amount, received
            )));
        }
    }

    Ok(PurchaseValidation::valid())
}
