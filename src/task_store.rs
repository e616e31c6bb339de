// src/task_store.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Durable record of one external AI-generation job, stored as a JSON blob
/// keyed by task id. Field names follow the stored wire format.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetadata {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default)]
    pub result_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub consume_credits: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_time: Option<i64>,
}

impl TaskMetadata {
    pub fn pending(task_id: String, prompt: Option<String>, consume_credits: i32) -> TaskMetadata {
        let now = Utc::now();
        TaskMetadata {
            task_id,
            status: TaskStatus::Pending,
            prompt,
            result_urls: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            consume_credits,
            cost_time: None,
        }
    }
}

/// Partial update applied over an existing record; unset fields are kept.
#[derive(Debug, Default, Clone)]
pub struct TaskMetadataPatch {
    pub status: Option<TaskStatus>,
    pub result_urls: Option<Vec<String>>,
    pub error: Option<String>,
    pub cost_time: Option<i64>,
}

#[derive(Debug)]
pub enum TaskStoreError {
    NotFound(String),
    Storage(String),
    Serde(serde_json::Error),
}

impl fmt::Display for TaskStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStoreError::NotFound(id) => write!(f, "task not found: {id}"),
            TaskStoreError::Storage(e) => write!(f, "storage error: {e}"),
            TaskStoreError::Serde(e) => write!(f, "serde error: {e}"),
        }
    }
}

impl From<serde_json::Error> for TaskStoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serde(value)
    }
}

impl From<TaskStoreError> for ApiError {
    fn from(e: TaskStoreError) -> Self {
        match e {
            TaskStoreError::NotFound(_) => ApiError::NotFound("Task".to_string()),
            other => ApiError::Upstream(other.to_string()),
        }
    }
}

/// Key-value store for task metadata. Production uses the object storage
/// bucket; tests use the in-memory backend.
#[derive(Clone)]
pub struct TaskStore {
    backend: Backend,
}

#[derive(Clone)]
enum Backend {
    S3 { client: S3Client, bucket: String },
    Memory(Arc<Mutex<HashMap<String, TaskMetadata>>>),
}

fn object_key(task_id: &str) -> String {
    format!("kie-tasks/{task_id}.json")
}

impl TaskStore {
    pub fn s3(client: S3Client, bucket: String) -> TaskStore {
        TaskStore {
            backend: Backend::S3 { client, bucket },
        }
    }

    pub fn in_memory() -> TaskStore {
        TaskStore {
            backend: Backend::Memory(Arc::new(Mutex::new(HashMap::new()))),
        }
    }

    /// Writes the record, overwriting any previous blob for the same task id.
    pub async fn save(&self, meta: &TaskMetadata) -> Result<(), TaskStoreError> {
        match &self.backend {
            Backend::S3 { client, bucket } => {
                let body = serde_json::to_vec(meta)?;
                client
                    .put_object()
                    .bucket(bucket)
                    .key(object_key(&meta.task_id))
                    .content_type("application/json")
                    .body(ByteStream::from(body))
                    .send()
                    .await
                    .map_err(|e| TaskStoreError::Storage(e.to_string()))?;
                Ok(())
            }
            Backend::Memory(map) => {
                map.lock()
                    .expect("task store lock")
                    .insert(meta.task_id.clone(), meta.clone());
                Ok(())
            }
        }
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<TaskMetadata>, TaskStoreError> {
        match &self.backend {
            Backend::S3 { client, bucket } => {
                let resp = client
                    .get_object()
                    .bucket(bucket)
                    .key(object_key(task_id))
                    .send()
                    .await;

                let output = match resp {
                    Ok(o) => o,
                    Err(e) => {
                        if e.as_service_error().map(|se| se.is_no_such_key()) == Some(true) {
                            return Ok(None);
                        }
                        return Err(TaskStoreError::Storage(e.to_string()));
                    }
                };

                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| TaskStoreError::Storage(e.to_string()))?
                    .into_bytes();

                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Backend::Memory(map) => Ok(map
                .lock()
                .expect("task store lock")
                .get(task_id)
                .cloned()),
        }
    }

    /// Read-modify-write merge. Fields absent from the patch are preserved;
    /// `updatedAt` always advances. Assumes a single producer per task id.
    pub async fn update(
        &self,
        task_id: &str,
        patch: TaskMetadataPatch,
    ) -> Result<TaskMetadata, TaskStoreError> {
        let mut meta = self
            .get(task_id)
            .await?
            .ok_or_else(|| TaskStoreError::NotFound(task_id.to_string()))?;

        if let Some(status) = patch.status {
            meta.status = status;
        }
        if let Some(urls) = patch.result_urls {
            meta.result_urls = urls;
        }
        if let Some(error) = patch.error {
            meta.error = Some(error);
        }
        if let Some(cost_time) = patch.cost_time {
            meta.cost_time = Some(cost_time);
        }
        meta.updated_at = Utc::now();

        self.save(&meta).await?;
        Ok(meta)
    }
}
