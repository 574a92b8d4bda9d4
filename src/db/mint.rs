use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub async fn get_tracked_mints(pool: &Pool<Sqlite>) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar("SELECT mint FROM artist_coins ORDER BY mint")
        .fetch_all(pool)
        .await
}

pub async fn add_tracked_mint(pool: &Pool<Sqlite>, mint: &str, ticker: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO artist_coins (mint, ticker) VALUES (?, ?) ON CONFLICT(mint) DO NOTHING")
        .bind(mint)
        .bind(ticker)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn remove_tracked_mint(pool: &Pool<Sqlite>, mint: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM artist_coins WHERE mint = ?")
        .bind(mint)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MintOperation {
    Insert,
    Update,
    Delete,
}

/// Payload written by the `artist_coins` triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintChange {
    pub operation: MintOperation,
    pub new_mint: Option<String>,
    pub old_mint: Option<String>,
}

impl MintChange {
    /// Inserts and deletes change the tracked set; updates do not.
    pub fn changes_mint_set(&self) -> bool {
        matches!(self.operation, MintOperation::Insert | MintOperation::Delete)
    }
}

/// Waits for rows appended to `artist_coins_notifications`. Only changes made
/// after the listener was created are delivered.
pub struct MintChangeListener {
    pool: Pool<Sqlite>,
    last_id: i64,
    poll_interval: Duration,
}

impl MintChangeListener {
    pub async fn new(pool: Pool<Sqlite>, poll_interval: Duration) -> Result<Self, sqlx::Error> {
        let last_id: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(id), 0) FROM artist_coins_notifications")
            .fetch_one(&pool)
            .await?;

        Ok(Self {
            pool,
            last_id,
            poll_interval,
        })
    }

    /// Next change, or `None` once `shutdown` is cancelled.
    pub async fn recv(&mut self, shutdown: &CancellationToken) -> Result<Option<MintChange>, sqlx::Error> {
        let mut ticker = interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let row: Option<(i64, String)> = sqlx::query_as(
                        "SELECT id, payload FROM artist_coins_notifications WHERE id > ? ORDER BY id LIMIT 1",
                    )
                    .bind(self.last_id)
                    .fetch_optional(&self.pool)
                    .await?;

                    let Some((id, payload)) = row else {
                        continue;
                    };
                    self.last_id = id;

                    match serde_json::from_str::<MintChange>(&payload) {
                        Ok(change) => {
                            debug!("Mint change notification {}: {:?}", id, change);
                            return Ok(Some(change));
                        }
                        Err(e) => warn!("Ignoring malformed mint notification {}: {}", id, e),
                    }
                }
                _ = shutdown.cancelled() => return Ok(None),
            }
        }
    }
}
