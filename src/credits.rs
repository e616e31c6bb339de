// src/credits.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgConnection, PgPool, Row};
use utoipa::ToSchema;

use crate::error::ApiError;

pub const WELCOME_BONUS_CREDITS: i32 = 3;
pub const REFERRER_REWARD_CREDITS: i32 = 50;
pub const REFEREE_REWARD_CREDITS: i32 = 20;
pub const SOCIAL_SHARE_REWARD_CREDITS: i32 = 5;
pub const ORIGINAL_DOWNLOAD_COST: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Purchase,
    Usage,
    Refund,
    Bonus,
    Referral,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Usage => "usage",
            TransactionType::Refund => "refund",
            TransactionType::Bonus => "bonus",
            TransactionType::Referral => "referral",
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: i32,
    pub username: Option<String>,
    pub email: String,
    pub credits: i32,
    pub referral_code: String,
    pub created_at: Option<DateTime<Utc>>,
}

pub async fn get_profile(pool: &PgPool, user_id: i32) -> Result<UserProfile, ApiError> {
    let row = sqlx::query(
        r#"SELECT id, username, email, credits, referral_code, created_at
           FROM user_profiles
           WHERE id = $1"#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("user".to_string()))?;

    Ok(UserProfile {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        credits: row.get("credits"),
        referral_code: row.get("referral_code"),
        created_at: row.get("created_at"),
    })
}

pub async fn get_balance(pool: &PgPool, user_id: i32) -> Result<i32, ApiError> {
    let row = sqlx::query("SELECT credits FROM user_profiles WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound("user".to_string()))?;

    Ok(row.get("credits"))
}

/// Deducts `amount` credits and appends the matching usage transaction row.
///
/// The balance check and the decrement are one conditional UPDATE, so two
/// concurrent deductions against the same row can never both win; the loser
/// gets `InsufficientCredits`. Returns the remaining balance.
pub async fn deduct(
    pool: &PgPool,
    user_id: i32,
    amount: i32,
    description: &str,
) -> Result<i32, ApiError> {
    if amount <= 0 {
        return Err(ApiError::Validation(
            "amount must be a positive integer".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"UPDATE user_profiles
           SET credits = credits - $2
           WHERE id = $1 AND credits >= $2
           RETURNING credits"#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut *tx)
    .await?;

    let remaining: i32 = match updated {
        Some(row) => row.get("credits"),
        None => {
            // Either the user does not exist or the balance is short.
            let available = sqlx::query("SELECT credits FROM user_profiles WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?
                .map(|r| r.get::<i32, _>("credits"));

            return match available {
                Some(available) => Err(ApiError::InsufficientCredits {
                    required: amount,
                    available,
                }),
                None => Err(ApiError::NotFound("user".to_string())),
            };
        }
    };

    sqlx::query(
        r#"INSERT INTO credit_transactions (user_id, amount, transaction_type, description)
           VALUES ($1, $2, $3, $4)"#,
    )
    .bind(user_id)
    .bind(-amount)
    .bind(TransactionType::Usage.as_str())
    .bind(description)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(remaining)
}

/// Grants `amount` credits inside its own transaction. Returns the new balance.
pub async fn award(
    pool: &PgPool,
    user_id: i32,
    amount: i32,
    tx_type: TransactionType,
    description: &str,
) -> Result<i32, ApiError> {
    let mut tx = pool.begin().await?;
    let balance = apply_award(&mut tx, user_id, amount, tx_type, description).await?;
    tx.commit().await?;
    Ok(balance)
}

/// Like `award`, but runs inside a caller-owned transaction so multiple
/// awards (e.g. both sides of a referral) commit or roll back together.
pub async fn apply_award(
    conn: &mut PgConnection,
    user_id: i32,
    amount: i32,
    tx_type: TransactionType,
    description: &str,
) -> Result<i32, ApiError> {
    if amount <= 0 {
        return Err(ApiError::Validation(
            "award amount must be a positive integer".to_string(),
        ));
    }

    let row = sqlx::query(
        r#"UPDATE user_profiles
           SET credits = credits + $2
           WHERE id = $1
           RETURNING credits"#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::NotFound("user".to_string()))?;

    sqlx::query(
        r#"INSERT INTO credit_transactions (user_id, amount, transaction_type, description)
           VALUES ($1, $2, $3, $4)"#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(tx_type.as_str())
    .bind(description)
    .execute(&mut *conn)
    .await?;

    Ok(row.get("credits"))
}
