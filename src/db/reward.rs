use crate::models::RewardDisbursement;
use sqlx::{Pool, Sqlite, SqliteConnection};

pub async fn insert_reward_disbursement(
    conn: &mut SqliteConnection,
    disbursement: &RewardDisbursement,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sol_reward_disbursements
        (signature, instruction_index, amount, slot, user_bank, challenge_id, specifier)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(signature, instruction_index) DO NOTHING
        "#,
    )
    .bind(&disbursement.signature)
    .bind(disbursement.instruction_index)
    .bind(disbursement.amount)
    .bind(disbursement.slot)
    .bind(&disbursement.user_bank)
    .bind(&disbursement.challenge_id)
    .bind(&disbursement.specifier)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get_reward_disbursements(
    pool: &Pool<Sqlite>,
    signature: &str,
) -> Result<Vec<RewardDisbursement>, sqlx::Error> {
    sqlx::query_as::<_, RewardDisbursement>(
        r#"
        SELECT signature, instruction_index, amount, slot, user_bank, challenge_id, specifier
        FROM sol_reward_disbursements
        WHERE signature = ?
        ORDER BY instruction_index
        "#,
    )
    .bind(signature)
    .fetch_all(pool)
    .await
}
