use crate::models::{ClaimableAccount, ClaimableAccountTransfer};
use sqlx::{Pool, Sqlite, SqliteConnection};

pub async fn insert_claimable_account(
    conn: &mut SqliteConnection,
    account: &ClaimableAccount,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sol_claimable_accounts
        (signature, instruction_index, slot, mint, ethereum_address, account)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(signature, instruction_index) DO NOTHING
        "#,
    )
    .bind(&account.signature)
    .bind(account.instruction_index)
    .bind(account.slot)
    .bind(&account.mint)
    .bind(&account.ethereum_address)
    .bind(&account.account)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn insert_claimable_transfer(
    conn: &mut SqliteConnection,
    transfer: &ClaimableAccountTransfer,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sol_claimable_account_transfers
        (signature, instruction_index, amount, slot, from_account, to_account, sender_eth_address)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(signature, instruction_index) DO NOTHING
        "#,
    )
    .bind(&transfer.signature)
    .bind(transfer.instruction_index)
    .bind(transfer.amount)
    .bind(transfer.slot)
    .bind(&transfer.from_account)
    .bind(&transfer.to_account)
    .bind(&transfer.sender_eth_address)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get_claimable_accounts(
    pool: &Pool<Sqlite>,
    signature: &str,
) -> Result<Vec<ClaimableAccount>, sqlx::Error> {
    sqlx::query_as::<_, ClaimableAccount>(
        r#"
        SELECT signature, instruction_index, slot, mint, ethereum_address, account
        FROM sol_claimable_accounts
        WHERE signature = ?
        ORDER BY instruction_index
        "#,
    )
    .bind(signature)
    .fetch_all(pool)
    .await
}

pub async fn get_claimable_transfers(
    pool: &Pool<Sqlite>,
    signature: &str,
) -> Result<Vec<ClaimableAccountTransfer>, sqlx::Error> {
    sqlx::query_as::<_, ClaimableAccountTransfer>(
        r#"
        SELECT signature, instruction_index, amount, slot, from_account, to_account, sender_eth_address
        FROM sol_claimable_account_transfers
        WHERE signature = ?
        ORDER BY instruction_index
        "#,
    )
    .bind(signature)
    .fetch_all(pool)
    .await
}
