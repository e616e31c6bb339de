// src/api/auth.rs

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage, HttpRequest, HttpResponse, post, web};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::task::{Context, Poll};
use utoipa::ToSchema;

use crate::AppState;
use crate::credits::{self, TransactionType, WELCOME_BONUS_CREDITS};
use crate::error::ApiError;
use crate::referrals;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i32,
    exp: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_applied: Option<bool>,
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created", body = AuthResponse),
        (status = 400, description = "Duplicate email or invalid data")
    )
)]
#[post("/auth/register")]
pub async fn register(
    state: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();

    if !payload.email.contains('@') {
        return Err(ApiError::Validation("invalid email".to_string()));
    }
    if payload.password.len() < 6 {
        return Err(ApiError::Validation(
            "password must be at least 6 characters".to_string(),
        ));
    }

    let password_hash = hash(&payload.password, DEFAULT_COST)
        .map_err(|e| ApiError::Internal(format!("bcrypt hash error: {e}")))?;

    let referral_code = referrals::generate_referral_code();

    let row = sqlx::query(
        r#"INSERT INTO user_profiles (username, email, password_hash, referral_code)
           VALUES ($1, $2, $3, $4)
           RETURNING id"#,
    )
    .bind(payload.username.as_deref())
    .bind(&payload.email)
    .bind(password_hash)
    .bind(&referral_code)
    .fetch_one(&state.pool)
    .await
    .map_err(|e| {
        log::warn!("register insert error: {e}");
        ApiError::Validation("user already exists or invalid data".to_string())
    })?;

    let user_id: i32 = row.get("id");

    if let Err(e) = credits::award(
        &state.pool,
        user_id,
        WELCOME_BONUS_CREDITS,
        TransactionType::Bonus,
        "Welcome bonus",
    )
    .await
    {
        log::error!("welcome bonus failed user_id={user_id}: {e}");
    }

    // Best effort: a bad referral code must not fail the signup.
    let referral_applied = match payload.referral_code.as_deref() {
        Some(code) if !code.trim().is_empty() => {
            match apply_referral(&state, code, user_id).await {
                Ok(applied) => Some(applied),
                Err(e) => {
                    log::warn!("referral not applied user_id={user_id}: {e}");
                    Some(false)
                }
            }
        }
        _ => None,
    };

    let token = generate_jwt(user_id, &state.config.jwt_secret)
        .map_err(|e| ApiError::Internal(format!("jwt encode error: {e}")))?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        token,
        user_id,
        referral_applied,
    }))
}

async fn apply_referral(
    state: &web::Data<AppState>,
    code: &str,
    referee_id: i32,
) -> Result<bool, ApiError> {
    let referrer = referrals::validate_code(&state.pool, code).await?;
    let outcome =
        referrals::complete_referral(&state.pool, referrer.referrer_id, referee_id).await?;
    Ok(outcome.newly_completed)
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
#[post("/auth/login")]
pub async fn login(
    state: web::Data<AppState>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let row = sqlx::query(r#"SELECT id, password_hash FROM user_profiles WHERE email = $1"#)
        .bind(&payload.email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    let user_id: i32 = row.get("id");
    let password_hash: String = row.get("password_hash");

    match verify(&payload.password, &password_hash) {
        Ok(true) => {}
        Ok(false) => return Err(ApiError::Unauthenticated),
        Err(e) => return Err(ApiError::Internal(format!("bcrypt verify error: {e}"))),
    }

    let token = generate_jwt(user_id, &state.config.jwt_secret)
        .map_err(|e| ApiError::Internal(format!("jwt encode error: {e}")))?;

    Ok(HttpResponse::Ok().json(AuthResponse {
        token,
        user_id,
        referral_applied: None,
    }))
}

pub fn generate_jwt(user_id: i32, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::days(30))
        .expect("valid timestamp")
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id,
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

fn decode_jwt(token: &str, secret: &str) -> Result<i32, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims.sub)
    .map_err(|_| ApiError::Unauthenticated)
}

/// Resolves `Authorization: Bearer <jwt>` to a user id. Used by routes that
/// live outside the JWT-guarded scope but still take an optional token.
pub fn authenticate_bearer(req: &HttpRequest, secret: &str) -> Result<i32, ApiError> {
    let auth_header = req
        .headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthenticated)?;

    decode_jwt(token, secret)
}

/// Middleware that validates the bearer JWT and stores the `i32` user id in
/// request extensions. The signing secret comes from `Config`, captured at
/// construction.
pub struct JwtMiddleware {
    secret: String,
}

impl JwtMiddleware {
    pub fn new(secret: String) -> JwtMiddleware {
        JwtMiddleware { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = JwtMiddlewareInner<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtMiddlewareInner {
            service,
            secret: self.secret.clone(),
        }))
    }
}

pub struct JwtMiddlewareInner<S> {
    service: S,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareInner<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let auth_header = req
            .headers()
            .get(actix_web::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("");

        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            match decode_jwt(token, &self.secret) {
                Ok(user_id) => {
                    req.extensions_mut().insert(user_id);
                    let fut = self.service.call(req);
                    return Box::pin(async move { fut.await });
                }
                Err(_) => {
                    return Box::pin(async move {
                        Err(actix_web::error::ErrorUnauthorized("Invalid token"))
                    });
                }
            }
        }

        Box::pin(async move {
            Err(actix_web::error::ErrorUnauthorized(
                "Missing or invalid Authorization header",
            ))
        })
    }
}
