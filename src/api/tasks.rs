// src/api/tasks.rs

use actix_web::web::ReqData;
use actix_web::{HttpResponse, get, post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::AppState;
use crate::credits::{self, TransactionType};
use crate::error::ApiError;
use crate::kie;
use crate::task_store::{TaskMetadata, TaskMetadataPatch, TaskStatus};

#[derive(Debug, Deserialize)]
pub struct TaskStatusQuery {
    #[serde(rename = "taskId")]
    pub task_id: String,
}

/// Polled by the client until the task reaches a terminal state.
#[utoipa::path(
    get,
    path = "/kie/task-status",
    tag = "tasks",
    params(("taskId" = String, Query, description = "KIE task id")),
    responses(
        (status = 200, description = "Current task metadata", body = TaskMetadata),
        (status = 400, description = "Missing task id"),
        (status = 404, description = "Task not found")
    )
)]
#[get("/kie/task-status")]
pub async fn task_status(
    state: web::Data<AppState>,
    query: web::Query<TaskStatusQuery>,
) -> Result<HttpResponse, ApiError> {
    if query.task_id.trim().is_empty() {
        return Err(ApiError::Validation("taskId is required".to_string()));
    }

    let meta = state
        .tasks
        .get(&query.task_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound("Task".to_string()))?;

    Ok(HttpResponse::Ok().json(meta))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(rename = "imageType")]
    pub image_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub credits_remaining: i32,
}

fn generation_cost(image_type: &str) -> i32 {
    match image_type {
        "background-removal" => 1,
        "clothes" | "hairstyle" | "body" => 2,
        _ => 1,
    }
}

fn model_for_type(image_type: &str) -> &'static str {
    match image_type {
        "background-removal" => "background-remover",
        "clothes" => "clothes-transform",
        "hairstyle" => "hairstyle-transform",
        "body" => "body-transform",
        _ => "image-edit",
    }
}

/// Deducts the generation cost, submits the KIE job and records a pending
/// task blob plus a history row. A failed submission refunds the deduction.
#[utoipa::path(
    post,
    path = "/api/kie/generate",
    tag = "tasks",
    request_body = GenerateRequest,
    responses(
        (status = 200, description = "Task submitted", body = GenerateResponse),
        (status = 400, description = "Missing prompt"),
        (status = 401, description = "Missing or invalid token"),
        (status = 402, description = "Insufficient credits")
    )
)]
#[post("/kie/generate")]
pub async fn generate(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<GenerateRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = user_id.into_inner();
    let payload = payload.into_inner();

    if payload.prompt.trim().is_empty() {
        return Err(ApiError::Validation("prompt is required".to_string()));
    }

    let image_type = payload.image_type.as_deref().unwrap_or("image-edit");
    let cost = generation_cost(image_type);

    let remaining = credits::deduct(
        &state.pool,
        user_id,
        cost,
        &format!("AI generation ({image_type})"),
    )
    .await?;

    let mut input = json!({ "prompt": payload.prompt });
    if let Some(url) = &payload.image_url {
        input["image_url"] = json!(url);
    }

    let callback_url = format!("{}/api/kie/callback", state.config.callback_base_url);
    let task_id = match kie::create_task(
        &state.config.kie_api_key,
        &state.config.kie_api_base_url,
        model_for_type(image_type),
        input,
        &callback_url,
    )
    .await
    {
        Ok(id) => id,
        Err(e) => {
            // Undo the deduction when the provider never accepted the job.
            if let Err(refund_err) = credits::award(
                &state.pool,
                user_id,
                cost,
                TransactionType::Refund,
                "Refund: generation submission failed",
            )
            .await
            {
                log::error!("refund failed user_id={user_id}: {refund_err}");
            }
            return Err(e.into());
        }
    };

    let inserted = sqlx::query(
        r#"INSERT INTO images (user_id, task_id, image_type, status, cost)
           VALUES ($1, $2, $3, 'processing', $4)"#,
    )
    .bind(user_id)
    .bind(&task_id)
    .bind(image_type)
    .bind(cost)
    .execute(&state.pool)
    .await;
    if let Err(e) = inserted {
        log::error!("history insert failed task_id={task_id}: {e}");
    }

    let meta = TaskMetadata::pending(task_id.clone(), Some(payload.prompt), cost);
    state.tasks.save(&meta).await.map_err(ApiError::from)?;

    log::info!("kie task submitted user_id={user_id} task_id={task_id} cost={cost}");

    Ok(HttpResponse::Ok().json(GenerateResponse {
        task_id,
        status: TaskStatus::Pending,
        credits_remaining: remaining,
    }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackPayload {
    pub code: i32,
    #[allow(dead_code)]
    pub msg: Option<String>,
    pub data: CallbackData,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackData {
    #[serde(rename = "taskId")]
    pub task_id: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "outputUrl")]
    pub output_url: Option<String>,
    #[serde(rename = "resultJson")]
    pub result_json: Option<String>,
    #[serde(rename = "costTime")]
    pub cost_time: Option<i64>,
}

/// Pulls result URLs out of the callback: either a flat `outputUrl` or the
/// provider's nested `resultJson.resultUrls` array.
pub fn extract_result_urls(data: &CallbackData) -> Vec<String> {
    if let Some(url) = &data.output_url {
        return vec![url.clone()];
    }

    if let Some(raw) = data.result_json.as_deref() {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => {
                return value
                    .get("resultUrls")
                    .and_then(|v| v.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str().map(|s| s.to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
            }
            Err(e) => log::warn!("kie callback resultJson parse error: {e}"),
        }
    }

    Vec::new()
}

fn callback_succeeded(payload: &CallbackPayload) -> bool {
    if payload.code != 200 {
        return false;
    }
    if let Some(status) = payload.data.status.as_deref() {
        if status != "success" {
            return false;
        }
    }
    if let Some(state) = payload.data.state.as_deref() {
        if state != "success" {
            return false;
        }
    }
    true
}

#[utoipa::path(
    post,
    path = "/api/kie/callback",
    tag = "tasks",
    request_body = CallbackPayload,
    responses(
        (status = 200, description = "Callback processed"),
        (status = 404, description = "Unknown task")
    )
)]
#[post("/api/kie/callback")]
pub async fn kie_callback(
    state: web::Data<AppState>,
    payload: web::Json<CallbackPayload>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    let task_id = payload.data.task_id.clone();

    let succeeded = callback_succeeded(&payload);
    let result_urls = extract_result_urls(&payload.data);

    let patch = if succeeded && !result_urls.is_empty() {
        TaskMetadataPatch {
            status: Some(TaskStatus::Completed),
            result_urls: Some(result_urls.clone()),
            cost_time: payload.data.cost_time,
            ..Default::default()
        }
    } else {
        log::warn!("kie callback reported failure task_id={task_id}");
        TaskMetadataPatch {
            status: Some(TaskStatus::Failed),
            error: Some(
                payload
                    .msg
                    .unwrap_or_else(|| "generation failed".to_string()),
            ),
            cost_time: payload.data.cost_time,
            ..Default::default()
        }
    };

    let meta = state
        .tasks
        .update(&task_id, patch)
        .await
        .map_err(ApiError::from)?;

    // History bookkeeping is best effort; the task blob is the authority.
    let history = sqlx::query(
        r#"UPDATE images SET status = $1, result_url = $2 WHERE task_id = $3"#,
    )
    .bind(if meta.status == TaskStatus::Completed {
        "completed"
    } else {
        "failed"
    })
    .bind(result_urls.first())
    .bind(&task_id)
    .execute(&state.pool)
    .await;
    if let Err(e) = history {
        log::error!("history update failed task_id={task_id}: {e}");
    }

    log::info!("kie callback processed task_id={task_id} status={:?}", meta.status);
    Ok(HttpResponse::Ok().body("OK"))
}
