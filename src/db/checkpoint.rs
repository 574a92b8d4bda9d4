use crate::models::Checkpoint;
use sqlx::{Pool, Sqlite};
use tracing::debug;

/// Opens a zero-width checkpoint at `from_slot` for a fresh subscription.
pub async fn start_point_checkpoint(
    pool: &Pool<Sqlite>,
    subscription_hash: &str,
    subscription: &str,
    from_slot: u64,
) -> Result<i64, sqlx::Error> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sol_slot_checkpoints (from_slot, to_slot, subscription, subscription_hash)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(from_slot as i64)
    .bind(from_slot as i64)
    .bind(subscription)
    .bind(subscription_hash)
    .fetch_one(pool)
    .await?;

    debug!("Started checkpoint {} at slot {} for {}", id, from_slot, subscription_hash);
    Ok(id)
}

/// Moves the checkpoint's end forward. Never moves it backwards; returns
/// whether the row changed.
pub async fn advance_checkpoint(pool: &Pool<Sqlite>, id: i64, slot: u64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE sol_slot_checkpoints
        SET to_slot = ?, updated_at = strftime('%s', 'now')
        WHERE id = ? AND to_slot < ?
        "#,
    )
    .bind(slot as i64)
    .bind(id)
    .bind(slot as i64)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn insert_range_checkpoint(
    pool: &Pool<Sqlite>,
    subscription_hash: &str,
    subscription: &str,
    from_slot: u64,
    to_slot: u64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        INSERT INTO sol_slot_checkpoints (from_slot, to_slot, subscription, subscription_hash)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(from_slot as i64)
    .bind(to_slot as i64)
    .bind(subscription)
    .bind(subscription_hash)
    .fetch_one(pool)
    .await
}

/// Highest slot covered by any checkpoint of this lineage, or 0 if none.
pub async fn latest_covered_slot(pool: &Pool<Sqlite>, subscription_hash: &str) -> Result<u64, sqlx::Error> {
    let slot: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(to_slot), 0) FROM sol_slot_checkpoints WHERE subscription_hash = ?",
    )
    .bind(subscription_hash)
    .fetch_one(pool)
    .await?;

    Ok(slot.max(0) as u64)
}

pub async fn get_checkpoint(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Checkpoint>, sqlx::Error> {
    sqlx::query_as::<_, Checkpoint>(
        r#"
        SELECT id, from_slot, to_slot, subscription, subscription_hash
        FROM sol_slot_checkpoints
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
