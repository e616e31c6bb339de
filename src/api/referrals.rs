// src/api/referrals.rs

use actix_web::{HttpResponse, get, web};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::AppState;
use crate::error::ApiError;
use crate::referrals;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateQuery {
    pub code: String,
}

#[utoipa::path(
    get,
    path = "/referral/validate",
    tag = "referrals",
    params(("code" = String, Query, description = "Referral code to check")),
    responses(
        (status = 200, description = "Code belongs to a user"),
        (status = 404, description = "Unknown code")
    )
)]
#[get("/referral/validate")]
pub async fn validate_referral_code(
    state: web::Data<AppState>,
    query: web::Query<ValidateQuery>,
) -> Result<HttpResponse, ApiError> {
    match referrals::validate_code(&state.pool, &query.code).await {
        Ok(info) => Ok(HttpResponse::Ok().json(json!({
            "valid": true,
            "referrerName": info.referrer_name,
            "referrerId": info.referrer_id,
        }))),
        Err(ApiError::NotFound(_)) => Ok(HttpResponse::NotFound().json(json!({
            "valid": false,
            "error": "Referral code not found",
        }))),
        Err(other) => Err(other),
    }
}
