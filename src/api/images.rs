// src/api/images.rs

use actix_multipart::Multipart;
use actix_web::web::ReqData;
use actix_web::{HttpRequest, HttpResponse, get, post, web};
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::Row;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::AppState;
use crate::api::auth::authenticate_bearer;
use crate::credits::{self, ORIGINAL_DOWNLOAD_COST, TransactionType};
use crate::error::ApiError;
use crate::s3_utils::{build_public_url, sanitize_filename};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadImageRequest {
    pub image_url: String,
    #[serde(rename = "type")]
    pub variant: Option<String>,
    pub filename: Option<String>,
}

/// Proxies an image download with attachment headers. The original-quality
/// variant costs one credit and therefore needs a bearer token; all other
/// variants stream without auth.
#[utoipa::path(
    post,
    path = "/download-image",
    tag = "images",
    request_body = DownloadImageRequest,
    responses(
        (status = 200, description = "Image bytes with attachment disposition"),
        (status = 400, description = "Invalid URL"),
        (status = 401, description = "Original variant without a valid token"),
        (status = 402, description = "Original variant without credit")
    )
)]
#[post("/download-image")]
pub async fn download_image(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<DownloadImageRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();

    if !payload.image_url.starts_with("http://") && !payload.image_url.starts_with("https://") {
        return Err(ApiError::Validation("imageUrl must be http(s)".to_string()));
    }

    let charged_user = if payload.variant.as_deref() == Some("original") {
        let user_id = authenticate_bearer(&req, &state.config.jwt_secret)?;
        let remaining = credits::deduct(
            &state.pool,
            user_id,
            ORIGINAL_DOWNLOAD_COST,
            "Original quality download",
        )
        .await?;
        log::info!("original download user_id={user_id} remaining={remaining}");
        Some(user_id)
    } else {
        None
    };

    let fetched = match reqwest::Client::new().get(&payload.image_url).send().await {
        Ok(resp) if resp.status().is_success() => Ok(resp),
        Ok(resp) => Err(ApiError::Upstream(format!(
            "image fetch failed status={}",
            resp.status()
        ))),
        Err(e) => Err(e.into()),
    };

    let resp = match fetched {
        Ok(resp) => resp,
        Err(e) => {
            // The user paid for a download that never happened; give it back.
            if let Some(user_id) = charged_user {
                if let Err(refund_err) = credits::award(
                    &state.pool,
                    user_id,
                    ORIGINAL_DOWNLOAD_COST,
                    TransactionType::Refund,
                    "Refund: original download fetch failed",
                )
                .await
                {
                    log::error!("download refund failed user_id={user_id}: {refund_err}");
                }
            }
            return Err(e);
        }
    };

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let filename = sanitize_filename(payload.filename.as_deref().unwrap_or("image.png"));

    Ok(HttpResponse::Ok()
        .content_type(content_type)
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{filename}\""),
        ))
        .streaming(resp.bytes_stream()))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    #[serde(rename = "type")]
    pub image_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryImage {
    pub id: i32,
    pub image_type: String,
    pub status: String,
    pub cost: i32,
    pub result_url: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[utoipa::path(
    get,
    path = "/api/history",
    tag = "images",
    params(
        ("page" = Option<i64>, Query, description = "1-based page number"),
        ("limit" = Option<i64>, Query, description = "Page size, max 100"),
        ("type" = Option<String>, Query, description = "Filter by image type")
    ),
    responses(
        (status = 200, description = "Completed generations plus usage stats"),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[get("/history")]
pub async fn history(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    let offset = (page - 1) * limit;

    let rows = sqlx::query(
        r#"SELECT id, image_type, status, cost, result_url, created_at
           FROM images
           WHERE user_id = $1
             AND status = 'completed'
             AND ($2::text IS NULL OR image_type = $2)
           ORDER BY created_at DESC
           LIMIT $3 OFFSET $4"#,
    )
    .bind(user_id)
    .bind(query.image_type.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let images: Vec<HistoryImage> = rows
        .into_iter()
        .map(|r| HistoryImage {
            id: r.get("id"),
            image_type: r.get("image_type"),
            status: r.get("status"),
            cost: r.get("cost"),
            result_url: r.get("result_url"),
            created_at: r.get("created_at"),
        })
        .collect();

    let stats_row = sqlx::query(
        r#"SELECT COUNT(*) AS total, COALESCE(SUM(cost), 0)::bigint AS credits_used
           FROM images
           WHERE user_id = $1
             AND status = 'completed'
             AND ($2::text IS NULL OR image_type = $2)"#,
    )
    .bind(user_id)
    .bind(query.image_type.as_deref())
    .fetch_one(&state.pool)
    .await?;

    let total: i64 = stats_row.get("total");
    let credits_used: i64 = stats_row.get("credits_used");
    let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };

    Ok(HttpResponse::Ok().json(json!({
        "images": images,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "totalPages": total_pages,
        },
        "stats": {
            "totalGenerated": total,
            "totalCreditsUsed": credits_used,
        },
    })))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub url: String,
    pub key: String,
}

#[utoipa::path(
    post,
    path = "/api/upload-image",
    tag = "images",
    responses(
        (status = 200, description = "Public URL of the stored image", body = UploadResponse),
        (status = 400, description = "Empty upload"),
        (status = 401, description = "Missing or invalid token")
    )
)]
#[post("/upload-image")]
pub async fn upload_image(
    mut payload: Multipart,
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();

    let mut file_bytes: Vec<u8> = Vec::new();
    let mut original_filename = "image.png".to_string();
    let mut content_type = "image/png".to_string();

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| ApiError::Validation(format!("invalid multipart payload: {e}")))?;

        let cd = field.content_disposition();
        if let Some(name) = cd.get_filename() {
            original_filename = sanitize_filename(name);
        }
        if let Some(mime) = field.content_type() {
            content_type = mime.to_string();
        }

        // A chunk error means the body is truncated; storing what arrived so
        // far would upload a corrupt file.
        while let Some(chunk) = field.next().await {
            let data = chunk
                .map_err(|e| ApiError::Validation(format!("multipart read failed: {e}")))?;
            file_bytes.extend_from_slice(&data);
        }
    }

    if file_bytes.is_empty() {
        return Err(ApiError::Validation("no file uploaded".to_string()));
    }

    let key = format!("uploads/{}/{}-{}", user_id, Uuid::new_v4(), original_filename);

    state
        .s3_client
        .put_object()
        .bucket(&state.config.s3_bucket)
        .key(&key)
        .content_type(&content_type)
        .body(ByteStream::from(file_bytes))
        .send()
        .await
        .map_err(|e| ApiError::Upstream(format!("s3 upload failed: {e}")))?;

    let url = build_public_url(&state.config.s3_public_base_url, &state.config.s3_bucket, &key);
    log::info!("image uploaded user_id={user_id} key={key}");

    Ok(HttpResponse::Ok().json(UploadResponse { url, key }))
}
