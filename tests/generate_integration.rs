use actix_web::dev::Service;
use actix_web::test::TestRequest;
use actix_web::{App, HttpMessage, test, web};
use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;
use sqlx::Row;

use retouch_backend::api::tasks::generate;
use retouch_backend::credits;
use retouch_backend::task_store::TaskStatus;

mod support;

#[actix_web::test]
async fn generate_submits_kie_task_and_records_pending_metadata() {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/api/v1/jobs/createTask")
            .header("Authorization", "Bearer test-kie");
        then.status(200).json_body(json!({
            "data": { "taskId": "task-gen-1" }
        }));
    });

    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();

    let user_id = support::insert_user(&pool, "artist@example.com", 5, "ARTIST01").await;

    let mut config = support::test_config();
    config.kie_api_base_url = server.url("");
    let state = web::Data::new(support::build_state_with_config(pool.clone(), config).await);

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .wrap_fn(move |req, srv| {
                req.extensions_mut().insert(user_id);
                let fut = srv.call(req);
                async move { fut.await }
            })
            .service(generate),
    )
    .await;

    let resp = test::call_service(
        &app,
        TestRequest::post()
            .uri("/kie/generate")
            .set_json(json!({
                "prompt": "change hairstyle to bob",
                "imageUrl": "https://cdn.example/in.png",
                "imageType": "hairstyle"
            }))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["taskId"], "task-gen-1");
    assert_eq!(body["status"], "pending");
    assert_eq!(body["creditsRemaining"], 3); // hairstyle costs 2
    mock.assert();

    assert_eq!(credits::get_balance(&pool, user_id).await.expect("balance"), 3);

    let image_row = sqlx::query("SELECT image_type, status, cost FROM images WHERE task_id = $1")
        .bind("task-gen-1")
        .fetch_one(&pool)
        .await
        .expect("history row");
    assert_eq!(image_row.get::<String, _>("image_type"), "hairstyle");
    assert_eq!(image_row.get::<String, _>("status"), "processing");
    assert_eq!(image_row.get::<i32, _>("cost"), 2);

    let meta = state
        .tasks
        .get("task-gen-1")
        .await
        .expect("get")
        .expect("metadata saved");
    assert_eq!(meta.status, TaskStatus::Pending);
    assert_eq!(meta.consume_credits, 2);
}

#[actix_web::test]
async fn generate_without_credits_is_402_and_never_calls_kie() {
    let server = MockServer::start_async().await;
    let mock = server.mock(|when, then| {
        when.method(POST).path("/api/v1/jobs/createTask");
        then.status(200).json_body(json!({ "data": { "taskId": "unused" } }));
    });

    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();

    let user_id = support::insert_user(&pool, "empty@example.com", 0, "EMPTY001").await;

    let mut config = support::test_config();
    config.kie_api_base_url = server.url("");
    let state = web::Data::new(support::build_state_with_config(pool.clone(), config).await);

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .wrap_fn(move |req, srv| {
                req.extensions_mut().insert(user_id);
                let fut = srv.call(req);
                async move { fut.await }
            })
            .service(generate),
    )
    .await;

    let resp = test::call_service(
        &app,
        TestRequest::post()
            .uri("/kie/generate")
            .set_json(json!({ "prompt": "anything" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 402);
    mock.assert_hits(0);
}

#[actix_web::test]
async fn failed_submission_refunds_the_deduction() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/api/v1/jobs/createTask");
        then.status(500).body("upstream down");
    });

    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();

    let user_id = support::insert_user(&pool, "unlucky@example.com", 4, "UNLUCK01").await;

    let mut config = support::test_config();
    config.kie_api_base_url = server.url("");
    let state = web::Data::new(support::build_state_with_config(pool.clone(), config).await);

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .wrap_fn(move |req, srv| {
                req.extensions_mut().insert(user_id);
                let fut = srv.call(req);
                async move { fut.await }
            })
            .service(generate),
    )
    .await;

    let resp = test::call_service(
        &app,
        TestRequest::post()
            .uri("/kie/generate")
            .set_json(json!({ "prompt": "a castle", "imageType": "background-removal" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 500);

    // usage + refund cancel out
    assert_eq!(credits::get_balance(&pool, user_id).await.expect("balance"), 4);

    let types: Vec<String> = sqlx::query(
        "SELECT transaction_type FROM credit_transactions WHERE user_id = $1 ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await
    .expect("transactions")
    .into_iter()
    .map(|r| r.get("transaction_type"))
    .collect();
    assert_eq!(types, vec!["usage".to_string(), "refund".to_string()]);
}
