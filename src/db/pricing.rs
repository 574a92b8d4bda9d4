use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSplit {
    pub user_id: i64,
    pub percentage: f64,
}

/// Price in cents and the seller splits in force for a piece of content.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseGate {
    pub price_cents: i64,
    pub splits: Vec<PriceSplit>,
}

pub async fn max_block_number(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let number: Option<i64> = sqlx::query_scalar("SELECT MAX(number) FROM blocks")
        .fetch_one(conn)
        .await?;
    Ok(number.unwrap_or(0))
}

/// Latest price row at or before `block_timestamp` that became valid no
/// earlier than the memo's block.
pub async fn get_relevant_price(
    conn: &mut SqliteConnection,
    content_type: &str,
    content_id: i64,
    access_type: &str,
    valid_after_blocknumber: i64,
    block_timestamp: i64,
) -> Result<Option<PurchaseGate>, sqlx::Error> {
    let sql = if content_type == "album" {
        r#"
        SELECT total_price_cents, splits FROM album_price_history
        WHERE blocknumber >= ? AND album_id = ? AND access = ? AND block_timestamp <= ?
        ORDER BY block_timestamp DESC
        LIMIT 1
        "#
    } else {
        r#"
        SELECT total_price_cents, splits FROM track_price_history
        WHERE blocknumber >= ? AND track_id = ? AND access = ? AND block_timestamp <= ?
        ORDER BY block_timestamp DESC
        LIMIT 1
        "#
    };

    let row: Option<(i64, String)> = sqlx::query_as(sql)
        .bind(valid_after_blocknumber)
        .bind(content_id)
        .bind(access_type)
        .bind(block_timestamp)
        .fetch_optional(conn)
        .await?;

    let Some((price_cents, splits)) = row else {
        return Ok(None);
    };
    let splits: Vec<PriceSplit> =
        serde_json::from_str(&splits).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

    Ok(Some(PurchaseGate { price_cents, splits }))
}

/// Payout wallet per user: the latest payout wallet set at or before the
/// timestamp, else the user's USDC user bank.
pub async fn get_payout_wallets(
    conn: &mut SqliteConnection,
    user_ids: &[i64],
    block_timestamp: i64,
) -> Result<HashMap<i64, String>, sqlx::Error> {
    let mut wallets = HashMap::new();

    for &user_id in user_ids {
        let wallet: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT COALESCE(
                (
                    SELECT h.spl_usdc_payout_wallet FROM user_payout_wallet_history h
                    WHERE h.user_id = users.user_id AND h.block_timestamp <= ?
                    ORDER BY h.block_timestamp DESC
                    LIMIT 1
                ),
                usdc_user_bank_accounts.bank_account
            )
            FROM users
            LEFT JOIN usdc_user_bank_accounts ON usdc_user_bank_accounts.ethereum_address = users.wallet
            WHERE users.user_id = ?
            "#,
        )
        .bind(block_timestamp)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

        if let Some(Some(wallet)) = wallet {
            if !wallet.is_empty() {
                wallets.insert(user_id, wallet);
            }
        }
    }

    Ok(wallets)
}
