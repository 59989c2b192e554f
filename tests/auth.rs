use actix_web::{test, App};
use quill::auth::{create_jwt, Role};
use quill::models::*;
use quill::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use quill::repo::inmem::InMemRepo;
use quill::repo::UserRepo;
use quill::{config, AppState, SiteSettings};
use std::sync::Arc;

fn ensure_secret() {
    if std::env::var("JWT_SECRET").is_err() {
        std::env::set_var("JWT_SECRET", "testsecret-testsecret-testsecret");
    }
}

fn state(repo: InMemRepo) -> AppState {
    AppState {
        repo: Arc::new(repo),
        rate: RateLimiterFacade::new(InMemoryRateLimiter::new(false), RateLimitConfig::from_env()),
        settings: SiteSettings { auto_approve_comments: false },
    }
}

#[actix_web::test]
#[serial_test::serial]
async fn missing_token_is_unauthorized() {
    ensure_secret();
    let repo = InMemRepo::new();
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo))).configure(config),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/auth/me").to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial_test::serial]
async fn garbage_token_is_unauthorized() {
    ensure_secret();
    let repo = InMemRepo::new();
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo))).configure(config),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", "Bearer not.a.jwt"))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 401);
}

#[actix_web::test]
#[serial_test::serial]
async fn non_admin_is_forbidden_from_report_queue() {
    ensure_secret();
    let repo = InMemRepo::new();
    let user = repo
        .create_user(NewUser { username: "user".into(), role: Role::User })
        .await
        .unwrap();
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo))).configure(config),
    )
    .await;
    let tok = create_jwt(user.id, vec![Role::User]).unwrap();

    for uri in ["/api/v1/reports", "/api/v1/reports/stats", "/api/v1/audit-logs"] {
        let req = test::TestRequest::get()
            .uri(uri)
            .insert_header(("Authorization", format!("Bearer {tok}")))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), 403, "{uri}");
    }
}

#[actix_web::test]
#[serial_test::serial]
async fn me_reflects_the_stored_user() {
    ensure_secret();
    let repo = InMemRepo::new();
    let user = repo
        .create_user(NewUser { username: "casey".into(), role: Role::User })
        .await
        .unwrap();
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo))).configure(config),
    )
    .await;
    let tok = create_jwt(user.id, vec![Role::User]).unwrap();

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", format!("Bearer {tok}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["id"], user.id);
    assert_eq!(body["username"], "casey");
    assert_eq!(body["role"], "user");
    assert_eq!(body["status"], "active");
}

#[actix_web::test]
#[serial_test::serial]
async fn refresh_issues_a_token_with_the_same_identity() {
    ensure_secret();
    let repo = InMemRepo::new();
    let user = repo
        .create_user(NewUser { username: "casey".into(), role: Role::User })
        .await
        .unwrap();
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo))).configure(config),
    )
    .await;
    let tok = create_jwt(user.id, vec![Role::User]).unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/refresh")
        .insert_header(("Authorization", format!("Bearer {tok}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let fresh = body["token"].as_str().unwrap().to_string();

    // the refreshed token works against an authenticated route
    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", format!("Bearer {fresh}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["id"], user.id);
}

#[actix_web::test]
#[serial_test::serial]
async fn notifications_are_scoped_to_the_caller() {
    ensure_secret();
    let repo = InMemRepo::new();
    let a = repo
        .create_user(NewUser { username: "a".into(), role: Role::User })
        .await
        .unwrap();
    let b = repo
        .create_user(NewUser { username: "b".into(), role: Role::User })
        .await
        .unwrap();
    use quill::repo::{CreateNotification, NotificationRepo};
    let mine = repo
        .create_notification(CreateNotification {
            user_id: a.id,
            kind: "report_update".into(),
            title: "For A".into(),
            message: "hello".into(),
            data: serde_json::json!({}),
        })
        .await
        .unwrap();
    repo.create_notification(CreateNotification {
        user_id: b.id,
        kind: "report_update".into(),
        title: "For B".into(),
        message: "hello".into(),
        data: serde_json::json!({}),
    })
    .await
    .unwrap();

    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone()))).configure(config),
    )
    .await;
    let tok = create_jwt(a.id, vec![Role::User]).unwrap();

    let req = test::TestRequest::get()
        .uri("/api/v1/notifications")
        .insert_header(("Authorization", format!("Bearer {tok}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    let items: Vec<Notification> = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "For A");

    // marking read is idempotent and owner-scoped
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/notifications/{}/read", mine.id))
        .insert_header(("Authorization", format!("Bearer {tok}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 200);
    let n: Notification = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert!(n.read_at.is_some());

    let other_tok = create_jwt(b.id, vec![Role::User]).unwrap();
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/notifications/{}/read", mine.id))
        .insert_header(("Authorization", format!("Bearer {other_tok}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 404);
}
