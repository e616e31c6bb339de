// src/config.rs

use std::env;

/// Immutable process configuration, loaded once at startup and injected
/// through `AppState`. Request paths never read the environment directly.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub jwt_secret: String,
    pub s3_bucket: String,
    pub s3_endpoint: Option<String>,
    pub s3_public_base_url: String,
    pub kie_api_key: String,
    pub kie_api_base_url: String,
    pub callback_base_url: String,
    pub app_base_url: String,
    pub admin_api_key: String,
}

impl Config {
    pub fn from_env() -> Config {
        let s3_bucket = env::var("S3_BUCKET").expect("S3_BUCKET required");
        let s3_public_base_url = env::var("S3_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("https://{s3_bucket}.s3.amazonaws.com"));

        Config {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET required"),
            s3_bucket,
            s3_endpoint: env::var("S3_ENDPOINT").ok(),
            s3_public_base_url,
            kie_api_key: env::var("KIE_API_KEY").expect("KIE_API_KEY required"),
            kie_api_base_url: env::var("KIE_API_BASE_URL")
                .unwrap_or_else(|_| "https://api.kie.ai".to_string()),
            callback_base_url: env::var("CALLBACK_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            admin_api_key: env::var("ADMIN_API_KEY").expect("ADMIN_API_KEY required"),
        }
    }
}
