// src/main.rs
use actix_web::{App, HttpResponse, HttpServer, Responder, web};
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::Client as S3Client;
use dotenvy::dotenv;
use sqlx::PgPool;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use retouch_backend::config::Config;
use retouch_backend::task_store::TaskStore;
use retouch_backend::{AppState, api, docs};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    let pool = PgPool::connect(&config.database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let region_provider = RegionProviderChain::default_provider().or_else("us-east-1");
    let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;
    let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&aws_config);

    // Allow custom S3-compatible endpoints (e.g. R2, MinIO)
    if let Some(endpoint) = &config.s3_endpoint {
        s3_config_builder = s3_config_builder
            .endpoint_url(endpoint)
            .force_path_style(true);
    }

    let s3_client = S3Client::from_conf(s3_config_builder.build());
    let tasks = TaskStore::s3(s3_client.clone(), config.s3_bucket.clone());

    let bind_addr = config.bind_addr.clone();
    let jwt_secret = config.jwt_secret.clone();

    let state = web::Data::new(AppState {
        pool,
        s3_client,
        tasks,
        config,
    });

    log::info!("starting server on {bind_addr}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            // Public routes
            .service(api::auth::register)
            .service(api::auth::login)
            .service(api::referrals::validate_referral_code)
            .service(api::tasks::task_status)
            .service(api::tasks::kie_callback)
            .service(api::images::download_image)
            // Authenticated routes
            .service(
                web::scope("/api")
                    .wrap(api::auth::JwtMiddleware::new(jwt_secret.clone()))
                    .service(api::credits::deduct_credits)
                    .service(api::credits::referral_overview)
                    .service(api::credits::social_share)
                    .service(api::tasks::generate)
                    .service(api::images::history)
                    .service(api::images::upload_image),
            )
            // Operator routes (X-Admin-Key checked per handler)
            .service(
                web::scope("/admin")
                    .service(api::admin::create_test_referral)
                    .service(api::admin::demo_referral_data)
                    .service(api::admin::init_check_in_rewards),
            )
    })
    .bind(bind_addr)?
    .run()
    .await
}
