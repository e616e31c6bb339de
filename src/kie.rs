// src/kie.rs
//
// Minimal client for the KIE generation API (createTask). Task completion
// arrives through the callback route; this module only submits jobs.

use serde_json::{Value, json};
use std::fmt;

use crate::error::ApiError;

#[derive(Debug)]
pub enum KieError {
    Http(reqwest::Error),
    Api { status: u16, body: String },
    InvalidResponse(String),
}

impl fmt::Display for KieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KieError::Http(e) => write!(f, "http error: {e}"),
            KieError::Api { status, body } => {
                write!(f, "kie api error status={status} body={body}")
            }
            KieError::InvalidResponse(e) => write!(f, "invalid response: {e}"),
        }
    }
}

impl From<reqwest::Error> for KieError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<KieError> for ApiError {
    fn from(e: KieError) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

/// Submits a generation job and returns the provider task id.
pub async fn create_task(
    api_key: &str,
    base_url: &str,
    model: &str,
    input: Value,
    callback_url: &str,
) -> Result<String, KieError> {
    let client = reqwest::Client::new();
    let body = json!({
        "model": model,
        "input": input,
        "callBackUrl": callback_url
    });

    let resp = client
        .post(format!("{}/api/v1/jobs/createTask", base_url.trim_end_matches('/')))
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&body)
        .send()
        .await?;

    let status = resp.status();
    let text = resp.text().await?;

    if !status.is_success() {
        return Err(KieError::Api {
            status: status.as_u16(),
            body: text,
        });
    }

    let json: Value = serde_json::from_str(&text)
        .map_err(|e| KieError::InvalidResponse(format!("{e}; body={text}")))?;

    json["data"]["taskId"]
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| KieError::InvalidResponse("no taskId in response".to_string()))
}
