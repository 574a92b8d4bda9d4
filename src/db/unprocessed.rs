use crate::models::UnprocessedTransaction;
use sqlx::{Pool, Sqlite};

/// Records a signature that failed processing. Re-enqueueing refreshes the
/// stored reason and `updated_at`.
pub async fn enqueue_unprocessed(
    pool: &Pool<Sqlite>,
    signature: &str,
    slot: u64,
    error_message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sol_unprocessed_txs (signature, slot, error_message)
        VALUES (?, ?, ?)
        ON CONFLICT(signature) DO UPDATE SET
            error_message = excluded.error_message,
            updated_at = strftime('%s', 'now')
        "#,
    )
    .bind(signature)
    .bind(slot as i64)
    .bind(error_message)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_unprocessed(
    pool: &Pool<Sqlite>,
    limit: i64,
    offset: i64,
) -> Result<Vec<UnprocessedTransaction>, sqlx::Error> {
    sqlx::query_as::<_, UnprocessedTransaction>(
        r#"
        SELECT signature, slot, error_message
        FROM sol_unprocessed_txs
        ORDER BY created_at ASC, signature ASC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn delete_unprocessed(pool: &Pool<Sqlite>, signature: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sol_unprocessed_txs WHERE signature = ?")
        .bind(signature)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_unprocessed(pool: &Pool<Sqlite>) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM sol_unprocessed_txs")
        .fetch_one(pool)
        .await
}
