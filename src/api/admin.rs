// src/api/admin.rs
//
// Operator seeding endpoints. Every handler requires the X-Admin-Key header
// to match ADMIN_API_KEY; these never ship without that gate.

use actix_web::{HttpRequest, HttpResponse, post, web};
use serde::Deserialize;
use serde_json::json;
use sqlx::Row;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::referrals;

const DEFAULT_CHECK_IN_REWARDS: [(i32, i32); 7] =
    [(1, 1), (2, 1), (3, 2), (4, 2), (5, 3), (6, 3), (7, 5)];

fn require_admin(req: &HttpRequest, state: &web::Data<AppState>) -> Result<(), ApiError> {
    let provided = req
        .headers()
        .get("X-Admin-Key")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if provided.is_empty() || provided != state.config.admin_api_key {
        return Err(ApiError::Unauthenticated);
    }
    Ok(())
}

async fn profile_id_by_email(state: &web::Data<AppState>, email: &str) -> Result<i32, ApiError> {
    let row = sqlx::query("SELECT id FROM user_profiles WHERE email = $1")
        .bind(email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {email}")))?;
    Ok(row.get("id"))
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestReferralRequest {
    pub referrer_email: String,
    pub referee_email: String,
}

#[post("/create-test-referral")]
pub async fn create_test_referral(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<CreateTestReferralRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state)?;

    let referrer_id = profile_id_by_email(&state, &payload.referrer_email).await?;
    let referee_id = profile_id_by_email(&state, &payload.referee_email).await?;

    let outcome = referrals::complete_referral(&state.pool, referrer_id, referee_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "referralId": outcome.referral_id,
        "newlyCompleted": outcome.newly_completed,
    })))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DemoReferralDataRequest {
    pub email: String,
}

/// Seeds three demo referees with completed referrals for the given user.
#[post("/demo-referral-data")]
pub async fn demo_referral_data(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<DemoReferralDataRequest>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state)?;

    let referrer_id = profile_id_by_email(&state, &payload.email).await?;
    let mut created = Vec::new();

    for n in 1..=3 {
        let suffix = Uuid::new_v4().simple().to_string();
        let email = format!("demo-referee-{n}-{}@example.com", &suffix[..8]);
        let referee_id: i32 = sqlx::query(
            r#"INSERT INTO user_profiles (username, email, password_hash, referral_code)
               VALUES ($1, $2, 'demo', $3)
               RETURNING id"#,
        )
        .bind(format!("demo_referee_{n}"))
        .bind(&email)
        .bind(referrals::generate_referral_code())
        .fetch_one(&state.pool)
        .await?
        .get("id");

        let outcome = referrals::complete_referral(&state.pool, referrer_id, referee_id).await?;
        created.push(json!({
            "refereeEmail": email,
            "referralId": outcome.referral_id,
        }));
    }

    Ok(HttpResponse::Ok().json(json!({ "created": created })))
}

#[post("/init-check-in-rewards")]
pub async fn init_check_in_rewards(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    require_admin(&req, &state)?;

    for (day, reward) in DEFAULT_CHECK_IN_REWARDS {
        sqlx::query(
            r#"INSERT INTO check_in_rewards (day, credits)
               VALUES ($1, $2)
               ON CONFLICT (day) DO UPDATE SET credits = EXCLUDED.credits"#,
        )
        .bind(day)
        .bind(reward)
        .execute(&state.pool)
        .await?;
    }

    Ok(HttpResponse::Ok().json(json!({
        "initialized": DEFAULT_CHECK_IN_REWARDS.len(),
    })))
}
