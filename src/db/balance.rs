use crate::models::{BalanceChange, UserBalance};
use sqlx::{Pool, Sqlite, SqliteConnection};
use std::collections::BTreeSet;

pub async fn insert_balance_changes(
    conn: &mut SqliteConnection,
    changes: &[BalanceChange],
) -> Result<u64, sqlx::Error> {
    let mut inserted = 0;
    for change in changes {
        let result = sqlx::query(
            r#"
            INSERT INTO sol_token_account_balance_changes
            (signature, account, owner, mint, change, balance, slot, block_timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(signature, account) DO NOTHING
            "#,
        )
        .bind(&change.signature)
        .bind(&change.account)
        .bind(&change.owner)
        .bind(&change.mint)
        .bind(change.change)
        .bind(change.balance)
        .bind(change.slot)
        .bind(change.block_timestamp)
        .execute(&mut *conn)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

/// Recomputes the per-identity balances that `accounts` can affect within a
/// mint: every identity any of those accounts has ever belonged to, either as
/// token owner or through a claimable account. Each identity's balance is
/// the sum of the latest balance of every account currently attributed to
/// it; claimable user banks count toward their ethereum address.
pub async fn reconcile_user_balances(
    conn: &mut SqliteConnection,
    mint: &str,
    accounts: &BTreeSet<String>,
) -> Result<(), sqlx::Error> {
    let mut identities = BTreeSet::new();
    for account in accounts {
        let found: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT owner FROM sol_token_account_balance_changes
            WHERE mint = ?1 AND account = ?2 AND owner IS NOT NULL AND owner != ''
            UNION
            SELECT ethereum_address FROM sol_claimable_accounts
            WHERE mint = ?1 AND account = ?2
            "#,
        )
        .bind(mint)
        .bind(account)
        .fetch_all(&mut *conn)
        .await?;
        identities.extend(found);
    }

    for identity in &identities {
        reconcile_identity(conn, mint, identity).await?;
    }
    Ok(())
}

async fn reconcile_identity(conn: &mut SqliteConnection, mint: &str, identity: &str) -> Result<(), sqlx::Error> {
    // Ties within a slot go to the row written last.
    let balance: Option<i64> = sqlx::query_scalar(
        r#"
        WITH candidates AS (
            SELECT account FROM sol_token_account_balance_changes WHERE mint = ?1 AND owner = ?2
            UNION
            SELECT account FROM sol_claimable_accounts WHERE mint = ?1 AND ethereum_address = ?2
        ),
        latest AS (
            SELECT account, owner, balance FROM (
                SELECT b.account, NULLIF(b.owner, '') AS owner, b.balance,
                       ROW_NUMBER() OVER (PARTITION BY b.account ORDER BY b.slot DESC, b.rowid DESC) AS rn
                FROM sol_token_account_balance_changes b
                WHERE b.mint = ?1 AND b.account IN (SELECT account FROM candidates)
            )
            WHERE rn = 1
        ),
        claims AS (
            SELECT account, MIN(ethereum_address) AS ethereum_address
            FROM sol_claimable_accounts
            WHERE mint = ?1 AND account IN (SELECT account FROM candidates)
            GROUP BY account
        )
        SELECT SUM(latest.balance)
        FROM latest
        LEFT JOIN claims ON claims.account = latest.account
        WHERE COALESCE(claims.ethereum_address, latest.owner) = ?2
        "#,
    )
    .bind(mint)
    .bind(identity)
    .fetch_one(&mut *conn)
    .await?;

    match balance {
        Some(balance) => {
            sqlx::query(
                r#"
                INSERT INTO sol_user_balances (identity, mint, balance)
                VALUES (?, ?, ?)
                ON CONFLICT(identity, mint) DO UPDATE
                SET balance = excluded.balance, updated_at = strftime('%s', 'now')
                "#,
            )
            .bind(identity)
            .bind(mint)
            .bind(balance)
            .execute(&mut *conn)
            .await?;
        }
        None => {
            sqlx::query("DELETE FROM sol_user_balances WHERE identity = ? AND mint = ?")
                .bind(identity)
                .bind(mint)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

/// Latest stored signature at or below `slot`; the lower backfill bookend.
pub async fn latest_signature_at_or_before(
    pool: &Pool<Sqlite>,
    slot: u64,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT signature FROM sol_token_account_balance_changes
        WHERE slot <= ?
        ORDER BY slot DESC
        LIMIT 1
        "#,
    )
    .bind(slot as i64)
    .fetch_optional(pool)
    .await
}

/// Earliest stored signature at or above `slot`; the upper backfill bookend.
pub async fn earliest_signature_at_or_after(
    pool: &Pool<Sqlite>,
    slot: u64,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT signature FROM sol_token_account_balance_changes
        WHERE slot >= ?
        ORDER BY slot ASC
        LIMIT 1
        "#,
    )
    .bind(slot as i64)
    .fetch_optional(pool)
    .await
}

pub async fn signature_exists(pool: &Pool<Sqlite>, signature: &str) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sol_token_account_balance_changes WHERE signature = ?",
    )
    .bind(signature)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

pub async fn get_balance_changes(
    pool: &Pool<Sqlite>,
    signature: &str,
) -> Result<Vec<BalanceChange>, sqlx::Error> {
    sqlx::query_as::<_, BalanceChange>(
        r#"
        SELECT signature, account, owner, mint, change, balance, slot, block_timestamp
        FROM sol_token_account_balance_changes
        WHERE signature = ?
        ORDER BY account
        "#,
    )
    .bind(signature)
    .fetch_all(pool)
    .await
}

pub async fn get_user_balances(pool: &Pool<Sqlite>, mint: &str) -> Result<Vec<UserBalance>, sqlx::Error> {
    sqlx::query_as::<_, UserBalance>(
        "SELECT identity, mint, balance FROM sol_user_balances WHERE mint = ? ORDER BY identity",
    )
    .bind(mint)
    .fetch_all(pool)
    .await
}
