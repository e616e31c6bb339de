use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::credits::deduct_credits,
        crate::api::credits::referral_overview,
        crate::api::credits::social_share,
        crate::api::referrals::validate_referral_code,
        crate::api::tasks::task_status,
        crate::api::tasks::generate,
        crate::api::tasks::kie_callback,
        crate::api::images::download_image,
        crate::api::images::history,
        crate::api::images::upload_image
    ),
    components(
        schemas(
            crate::api::auth::RegisterRequest,
            crate::api::auth::LoginRequest,
            crate::api::auth::AuthResponse,
            crate::api::credits::DeductRequest,
            crate::api::credits::DeductResponse,
            crate::api::credits::SocialShareRequest,
            crate::api::credits::SocialShareResponse,
            crate::api::tasks::GenerateRequest,
            crate::api::tasks::GenerateResponse,
            crate::api::tasks::CallbackPayload,
            crate::api::tasks::CallbackData,
            crate::api::images::DownloadImageRequest,
            crate::api::images::HistoryImage,
            crate::api::images::UploadResponse,
            crate::task_store::TaskMetadata,
            crate::task_store::TaskStatus
        )
    ),
    tags(
        (name = "auth", description = "Authentication"),
        (name = "credits", description = "Credit ledger and rewards"),
        (name = "referrals", description = "Referral validation"),
        (name = "tasks", description = "KIE generation tasks"),
        (name = "images", description = "Upload, download and history")
    )
)]
pub struct ApiDoc;
