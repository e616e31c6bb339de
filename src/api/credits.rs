// src/api/credits.rs

use actix_web::web::ReqData;
use actix_web::{HttpResponse, get, post, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::AppState;
use crate::credits::{self, SOCIAL_SHARE_REWARD_CREDITS, TransactionType};
use crate::error::ApiError;
use crate::referrals;

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeductRequest {
    pub amount: i32,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeductResponse {
    pub success: bool,
    pub credits_deducted: i32,
    pub credits_remaining: i32,
}

#[utoipa::path(
    post,
    path = "/api/credits/deduct",
    tag = "credits",
    request_body = DeductRequest,
    responses(
        (status = 200, description = "Credits deducted", body = DeductResponse),
        (status = 400, description = "Invalid amount"),
        (status = 401, description = "Missing or invalid token"),
        (status = 402, description = "Insufficient credits"),
        (status = 404, description = "Unknown user")
    )
)]
#[post("/credits/deduct")]
pub async fn deduct_credits(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<DeductRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    let description = payload
        .description
        .as_deref()
        .unwrap_or("Credit usage")
        .to_string();

    let remaining = credits::deduct(&state.pool, user_id, payload.amount, &description).await?;

    log::info!(
        "credits deducted user_id={user_id} amount={} remaining={remaining}",
        payload.amount
    );

    Ok(HttpResponse::Ok().json(DeductResponse {
        success: true,
        credits_deducted: payload.amount,
        credits_remaining: remaining,
    }))
}

#[utoipa::path(
    get,
    path = "/api/credits/referral",
    tag = "credits",
    responses(
        (status = 200, description = "Referral code, link, stats and records"),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[get("/credits/referral")]
pub async fn referral_overview(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, ApiError> {
    let overview = referrals::get_referral_stats(
        &state.pool,
        user_id.into_inner(),
        &state.config.app_base_url,
    )
    .await?;

    Ok(HttpResponse::Ok().json(overview))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SocialShareRequest {
    pub platform: String,
    #[allow(dead_code)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SocialShareResponse {
    pub success: bool,
    pub credits_awarded: i32,
    pub credits_remaining: i32,
}

#[utoipa::path(
    post,
    path = "/api/credits/social-share",
    tag = "credits",
    request_body = SocialShareRequest,
    responses(
        (status = 200, description = "Share reward granted", body = SocialShareResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 409, description = "Already claimed today")
    )
)]
#[post("/credits/social-share")]
pub async fn social_share(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<SocialShareRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    let platform = payload.platform.trim().to_lowercase();
    if platform.is_empty() {
        return Err(ApiError::Validation("platform is required".to_string()));
    }

    // One claim per user/platform/UTC day; the unique index arbitrates races.
    // Claim and award share one transaction, so a failed award also drops
    // the claim instead of locking the user out of it.
    let today = Utc::now().date_naive();
    let mut tx = state.pool.begin().await?;

    let inserted = sqlx::query(
        r#"INSERT INTO social_share_claims (user_id, platform, share_date)
           VALUES ($1, $2, $3)
           ON CONFLICT (user_id, platform, share_date) DO NOTHING"#,
    )
    .bind(user_id)
    .bind(&platform)
    .bind(today)
    .execute(&mut *tx)
    .await?;

    if inserted.rows_affected() == 0 {
        return Err(ApiError::Conflict(format!(
            "share reward for {platform} already claimed today"
        )));
    }

    let remaining = credits::apply_award(
        &mut tx,
        user_id,
        SOCIAL_SHARE_REWARD_CREDITS,
        TransactionType::Bonus,
        &format!("Social share reward ({platform})"),
    )
    .await?;

    tx.commit().await?;

    Ok(HttpResponse::Ok().json(SocialShareResponse {
        success: true,
        credits_awarded: SOCIAL_SHARE_REWARD_CREDITS,
        credits_remaining: remaining,
    }))
}
