use actix_web::test::TestRequest;
use actix_web::{App, test, web};
use sqlx::Row;

use retouch_backend::api::admin::{
    create_test_referral, demo_referral_data, init_check_in_rewards,
};
use retouch_backend::credits;

mod support;

#[actix_web::test]
async fn admin_routes_require_the_operator_key() {
    let test_db = support::init_test_db().await;
    let state = web::Data::new(support::build_state(test_db.pool.clone()).await);
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .service(init_check_in_rewards),
    )
    .await;

    let resp = test::call_service(
        &app,
        TestRequest::post().uri("/init-check-in-rewards").to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 401);

    let resp = test::call_service(
        &app,
        TestRequest::post()
            .uri("/init-check-in-rewards")
            .insert_header(("X-Admin-Key", "wrong"))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 401);
}

#[actix_web::test]
async fn init_check_in_rewards_seeds_seven_tiers() {
    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();
    let state = web::Data::new(support::build_state(pool.clone()).await);
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .service(init_check_in_rewards),
    )
    .await;

    let resp = test::call_service(
        &app,
        TestRequest::post()
            .uri("/init-check-in-rewards")
            .insert_header(("X-Admin-Key", "test-admin-key"))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM check_in_rewards")
        .fetch_one(&pool)
        .await
        .expect("count")
        .get("n");
    assert_eq!(count, 7);

    // idempotent re-run
    let resp = test::call_service(
        &app,
        TestRequest::post()
            .uri("/init-check-in-rewards")
            .insert_header(("X-Admin-Key", "test-admin-key"))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn create_test_referral_links_two_users_by_email() {
    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();

    support::insert_user(&pool, "mentor@example.com", 0, "MENTOR01").await;
    let referee = support::insert_user(&pool, "student@example.com", 0, "STUDNT01").await;

    let state = web::Data::new(support::build_state(pool.clone()).await);
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .service(create_test_referral),
    )
    .await;

    let resp = test::call_service(
        &app,
        TestRequest::post()
            .uri("/create-test-referral")
            .insert_header(("X-Admin-Key", "test-admin-key"))
            .set_json(serde_json::json!({
                "referrerEmail": "mentor@example.com",
                "refereeEmail": "student@example.com"
            }))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());
    let json: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(json["newlyCompleted"], true);

    assert_eq!(credits::get_balance(&pool, referee).await.expect("balance"), 20);
}

#[actix_web::test]
async fn demo_referral_data_seeds_three_completed_referrals() {
    let test_db = support::init_test_db().await;
    let pool = test_db.pool.clone();

    let referrer = support::insert_user(&pool, "demo@example.com", 0, "DEMO0001").await;

    let state = web::Data::new(support::build_state(pool.clone()).await);
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .service(demo_referral_data),
    )
    .await;

    let resp = test::call_service(
        &app,
        TestRequest::post()
            .uri("/demo-referral-data")
            .insert_header(("X-Admin-Key", "test-admin-key"))
            .set_json(serde_json::json!({ "email": "demo@example.com" }))
            .to_request(),
    )
    .await;
    assert!(resp.status().is_success());

    let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM referrals WHERE referrer_id = $1")
        .bind(referrer)
        .fetch_one(&pool)
        .await
        .expect("count")
        .get("n");
    assert_eq!(count, 3);

    // 3 completed referrals at 50 credits each
    assert_eq!(
        credits::get_balance(&pool, referrer).await.expect("balance"),
        150
    );
}
