use crate::models::{Payment, Purchase};
use sqlx::{Pool, Sqlite, SqliteConnection};

pub async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sol_payments
        (signature, instruction_index, route_index, amount, slot, to_account)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(signature, instruction_index, route_index) DO NOTHING
        "#,
    )
    .bind(&payment.signature)
    .bind(payment.instruction_index)
    .bind(payment.route_index)
    .bind(payment.amount)
    .bind(payment.slot)
    .bind(&payment.to_account)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn insert_purchase(conn: &mut SqliteConnection, purchase: &Purchase) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sol_purchases
        (signature, instruction_index, amount, slot, from_account, content_type, content_id,
         buyer_user_id, access_type, valid_after_blocknumber, is_valid, city, region, country)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(signature, instruction_index) DO NOTHING
        "#,
    )
    .bind(&purchase.signature)
    .bind(purchase.instruction_index)
    .bind(purchase.amount)
    .bind(purchase.slot)
    .bind(&purchase.from_account)
    .bind(&purchase.content_type)
    .bind(purchase.content_id)
    .bind(purchase.buyer_user_id)
    .bind(&purchase.access_type)
    .bind(purchase.valid_after_blocknumber)
    .bind(purchase.is_valid)
    .bind(&purchase.city)
    .bind(&purchase.region)
    .bind(&purchase.country)
    .execute(conn)
    .await?;

    Ok(())
}

pub async fn get_payments(pool: &Pool<Sqlite>, signature: &str) -> Result<Vec<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(
        r#"
        SELECT signature, instruction_index, route_index, amount, slot, to_account
        FROM sol_payments
        WHERE signature = ?
        ORDER BY instruction_index, route_index
        "#,
    )
    .bind(signature)
    .fetch_all(pool)
    .await
}

pub async fn get_purchases(pool: &Pool<Sqlite>, signature: &str) -> Result<Vec<Purchase>, sqlx::Error> {
    sqlx::query_as::<_, Purchase>(
        r#"
        SELECT signature, instruction_index, amount, slot, from_account, content_type, content_id,
               buyer_user_id, access_type, valid_after_blocknumber, is_valid, city, region, country
        FROM sol_purchases
        WHERE signature = ?
        ORDER BY instruction_index
        "#,
    )
    .bind(signature)
    .fetch_all(pool)
    .await
}
