// src/referrals.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use utoipa::ToSchema;

use crate::credits::{self, REFEREE_REWARD_CREDITS, REFERRER_REWARD_CREDITS, TransactionType};
use crate::error::ApiError;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferrerInfo {
    pub referrer_id: i32,
    pub referrer_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralRecord {
    pub id: i32,
    pub referee_email: String,
    pub status: String,
    pub reward: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
    pub total_earned: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralOverview {
    pub referral_code: String,
    pub referral_link: String,
    pub stats: ReferralStats,
    pub referrals: Vec<ReferralRecord>,
}

#[derive(Debug)]
pub struct ReferralOutcome {
    pub referral_id: i32,
    /// False when the pair already had a referral row (idempotent repeat).
    pub newly_completed: bool,
}

pub async fn validate_code(pool: &PgPool, code: &str) -> Result<ReferrerInfo, ApiError> {
    if code.trim().is_empty() {
        return Err(ApiError::Validation("code is required".to_string()));
    }

    let row = sqlx::query(
        r#"SELECT id, username, email FROM user_profiles WHERE referral_code = $1"#,
    )
    .bind(code)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::NotFound("referral code".to_string()))?;

    let username: Option<String> = row.get("username");
    let email: String = row.get("email");

    Ok(ReferrerInfo {
        referrer_id: row.get("id"),
        referrer_name: username.unwrap_or_else(|| mask_email(&email)),
    })
}

/// Completes a referral between two users, rewarding both sides.
///
/// Idempotent: a second call for the same pair returns the existing row and
/// awards nothing. The referral insert and both awards run in one database
/// transaction, so either both parties are credited or neither is.
pub async fn complete_referral(
    pool: &PgPool,
    referrer_id: i32,
    referee_id: i32,
) -> Result<ReferralOutcome, ApiError> {
    if referrer_id == referee_id {
        return Err(ApiError::Validation(
            "users cannot refer themselves".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let existing = sqlx::query(
        r#"SELECT id FROM referrals WHERE referrer_id = $1 AND referee_id = $2"#,
    )
    .bind(referrer_id)
    .bind(referee_id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(row) = existing {
        tx.rollback().await?;
        return Ok(ReferralOutcome {
            referral_id: row.get("id"),
            newly_completed: false,
        });
    }

    // ON CONFLICT covers the race where two requests pass the check above at
    // the same time: the loser gets no row back and resolves to the winner's
    // committed referral instead of a unique-violation error.
    let inserted = sqlx::query(
        r#"INSERT INTO referrals
               (referrer_id, referee_id, status, referrer_reward, referee_reward, completed_at)
           VALUES ($1, $2, 'completed', $3, $4, NOW())
           ON CONFLICT (referrer_id, referee_id) DO NOTHING
           RETURNING id"#,
    )
    .bind(referrer_id)
    .bind(referee_id)
    .bind(REFERRER_REWARD_CREDITS)
    .bind(REFEREE_REWARD_CREDITS)
    .fetch_optional(&mut *tx)
    .await?;

    let referral_id: i32 = match inserted {
        Some(row) => row.get("id"),
        None => {
            tx.rollback().await?;
            let row = sqlx::query(
                r#"SELECT id FROM referrals WHERE referrer_id = $1 AND referee_id = $2"#,
            )
            .bind(referrer_id)
            .bind(referee_id)
            .fetch_one(pool)
            .await?;
            return Ok(ReferralOutcome {
                referral_id: row.get("id"),
                newly_completed: false,
            });
        }
    };

    credits::apply_award(
        &mut tx,
        referrer_id,
        REFERRER_REWARD_CREDITS,
        TransactionType::Referral,
        "Referral reward: invited user signed up",
    )
    .await?;

    credits::apply_award(
        &mut tx,
        referee_id,
        REFEREE_REWARD_CREDITS,
        TransactionType::Referral,
        "Referral reward: signed up with a referral code",
    )
    .await?;

    tx.commit().await?;

    log::info!(
        "referral completed referrer_id={referrer_id} referee_id={referee_id} id={referral_id}"
    );

    Ok(ReferralOutcome {
        referral_id,
        newly_completed: true,
    })
}

pub async fn get_referral_stats(
    pool: &PgPool,
    user_id: i32,
    app_base_url: &str,
) -> Result<ReferralOverview, ApiError> {
    let profile = credits::get_profile(pool, user_id).await?;

    let rows = sqlx::query(
        r#"SELECT r.id, r.status, r.referrer_reward, r.created_at, r.completed_at,
                  u.email AS referee_email
           FROM referrals r
           JOIN user_profiles u ON u.id = r.referee_id
           WHERE r.referrer_id = $1
           ORDER BY r.created_at DESC"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut referrals = Vec::with_capacity(rows.len());
    let mut completed = 0i64;
    let mut total_earned = 0i64;

    for row in rows {
        let status: String = row.get("status");
        let reward: i32 = row.get("referrer_reward");
        if status == "completed" {
            completed += 1;
            total_earned += reward as i64;
        }
        let email: String = row.get("referee_email");
        referrals.push(ReferralRecord {
            id: row.get("id"),
            referee_email: mask_email(&email),
            status,
            reward,
            created_at: row.get("created_at"),
            completed_at: row.get("completed_at"),
        });
    }

    let total = referrals.len() as i64;

    Ok(ReferralOverview {
        referral_link: format!(
            "{}/?ref={}",
            app_base_url.trim_end_matches('/'),
            profile.referral_code
        ),
        referral_code: profile.referral_code,
        stats: ReferralStats {
            total,
            completed,
            pending: total - completed,
            total_earned,
        },
        referrals,
    })
}

/// Generates an 8-character uppercase referral code.
pub fn generate_referral_code() -> String {
    uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect::<String>()
        .to_uppercase()
}

/// `alice@example.com` -> `al***@example.com`. The full address never leaves
/// the server in referral listings.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{visible}***@{domain}")
        }
        None => "***".to_string(),
    }
}
