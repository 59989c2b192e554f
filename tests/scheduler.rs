use actix_web::{test, App};
use chrono::{Duration, Utc};
use quill::auth::{create_jwt, Role};
use quill::models::*;
use quill::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use quill::repo::inmem::InMemRepo;
use quill::repo::{PostRepo, Repo, UserRepo};
use quill::scheduler;
use quill::{config, AppState, SiteSettings};
use std::sync::Arc;

fn ensure_secret() {
    if std::env::var("JWT_SECRET").is_err() {
        std::env::set_var("JWT_SECRET", "testsecret-testsecret-testsecret");
    }
}

/// Put a post directly into scheduled state with the given publish time.
async fn scheduled_post(repo: &dyn Repo, owner: Id, title: &str, at: chrono::DateTime<Utc>) -> Post {
    let post = quill::moderation::create_post(
        repo,
        owner,
        NewPost {
            title: title.into(),
            body: "body".into(),
            excerpt: None,
            category: None,
            tags: vec![],
            status: None,
            scheduled_at: None,
        },
    )
    .await
    .unwrap();
    let mut post = repo.get_post(post.id).await.unwrap();
    post.status = PostStatus::Scheduled;
    post.scheduled_at = Some(at);
    repo.update_post(post).await.unwrap()
}

#[actix_web::test]
#[serial_test::serial]
async fn sweep_promotes_due_posts_and_backdates_published_at() {
    let repo = InMemRepo::new();
    let owner = repo
        .create_user(NewUser { username: "writer".into(), role: Role::User })
        .await
        .unwrap();
    let due_at = Utc::now() - Duration::minutes(5);
    let post = scheduled_post(&repo, owner.id, "Due Now", due_at).await;

    assert_eq!(scheduler::publish_due(&repo).await, 1);

    let post = repo.get_post(post.id).await.unwrap();
    assert_eq!(post.status, PostStatus::Published);
    // publish time is the promised time, not the sweep time
    assert_eq!(post.published_at, Some(due_at));
    assert!(post.scheduled_at.is_none());
}

#[actix_web::test]
#[serial_test::serial]
async fn sweep_is_idempotent() {
    let repo = InMemRepo::new();
    let owner = repo
        .create_user(NewUser { username: "writer".into(), role: Role::User })
        .await
        .unwrap();
    scheduled_post(&repo, owner.id, "Once Only", Utc::now() - Duration::seconds(1)).await;

    assert_eq!(scheduler::publish_due(&repo).await, 1);
    assert_eq!(scheduler::publish_due(&repo).await, 0);
}

#[actix_web::test]
#[serial_test::serial]
async fn future_posts_are_left_alone() {
    let repo = InMemRepo::new();
    let owner = repo
        .create_user(NewUser { username: "writer".into(), role: Role::User })
        .await
        .unwrap();
    let post =
        scheduled_post(&repo, owner.id, "Tomorrow", Utc::now() + Duration::hours(24)).await;

    assert_eq!(scheduler::publish_due(&repo).await, 0);
    let post = repo.get_post(post.id).await.unwrap();
    assert_eq!(post.status, PostStatus::Scheduled);
    assert!(post.scheduled_at.is_some());
}

#[actix_web::test]
#[serial_test::serial]
async fn sweep_writes_no_audit_entry() {
    let repo = InMemRepo::new();
    let owner = repo
        .create_user(NewUser { username: "writer".into(), role: Role::User })
        .await
        .unwrap();
    scheduled_post(&repo, owner.id, "Quiet Publish", Utc::now() - Duration::seconds(1)).await;

    scheduler::publish_due(&repo).await;

    use quill::repo::AuditRepo;
    let (entries, total) = repo.list_audit(AuditQuery::default()).await.unwrap();
    assert!(entries.is_empty());
    assert_eq!(total, 0);
}

#[actix_web::test]
#[serial_test::serial]
async fn manual_trigger_is_admin_only_and_reports_the_count() {
    ensure_secret();
    let repo = InMemRepo::new();
    let owner = repo
        .create_user(NewUser { username: "writer".into(), role: Role::User })
        .await
        .unwrap();
    let admin = repo
        .create_user(NewUser { username: "admin".into(), role: Role::Admin })
        .await
        .unwrap();
    scheduled_post(&repo, owner.id, "Pending Promotion", Utc::now() - Duration::seconds(1)).await;

    let state = AppState {
        repo: Arc::new(repo.clone()),
        rate: RateLimiterFacade::new(InMemoryRateLimiter::new(false), RateLimitConfig::from_env()),
        settings: SiteSettings { auto_approve_comments: false },
    };
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state)).configure(config),
    )
    .await;

    let user_tok = create_jwt(owner.id, vec![Role::User]).unwrap();
    let req = test::TestRequest::post()
        .uri("/api/v1/admin/scheduler/run")
        .insert_header(("Authorization", format!("Bearer {user_tok}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 403);

    let admin_tok = create_jwt(admin.id, vec![Role::Admin]).unwrap();
    let req = test::TestRequest::post()
        .uri("/api/v1/admin/scheduler/run")
        .insert_header(("Authorization", format!("Bearer {admin_tok}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(body["published"], 1);
}
