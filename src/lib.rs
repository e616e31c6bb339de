pub mod api;
pub mod config;
pub mod credits;
pub mod docs;
pub mod error;
pub mod kie;
pub mod referrals;
pub mod s3_utils;
pub mod task_store;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::task_store::TaskStore;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub s3_client: S3Client,
    pub tasks: TaskStore,
    pub config: Config,
}
