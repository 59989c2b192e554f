use actix_web::{test, App};
use quill::auth::{create_jwt, Role};
use quill::models::*;
use quill::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use quill::repo::inmem::InMemRepo;
use quill::repo::{NotificationRepo, PostRepo, Repo, ReportRepo, UserRepo};
use quill::{config, AppState, SiteSettings};
use serde_json::json;
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

fn token(id: Id, role: Role) -> String {
    ensure_secret();
    create_jwt(id, vec![role]).unwrap()
}

/// author + reporter + admin, plus one published post by the author.
async fn seed(repo: &dyn Repo) -> (User, User, User, Post) {
    let author = repo
        .create_user(NewUser { username: "author".into(), role: Role::User })
        .await
        .unwrap();
    let reporter = repo
        .create_user(NewUser { username: "reporter".into(), role: Role::User })
        .await
        .unwrap();
    let admin = repo
        .create_user(NewUser { username: "admin".into(), role: Role::Admin })
        .await
        .unwrap();
    let post = quill::moderation::create_post(
        repo,
        author.id,
        NewPost {
            title: "Reported Post".into(),
            body: "content".into(),
            excerpt: None,
            category: None,
            tags: vec![],
            status: Some(PostStatus::Review),
            scheduled_at: None,
        },
    )
    .await
    .unwrap();
    let post = quill::moderation::approve(repo, post.id, admin.id).await.unwrap();
    (author, reporter, admin, post)
}

#[actix_web::test]
#[serial_test::serial]
async fn self_report_is_forbidden() {
    let repo = InMemRepo::new();
    let (author, _, _, post) = seed(&repo).await;
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone()))).configure(config),
    )
    .await;
    let tok = token(author.id, Role::User);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{}/report", post.slug))
        .insert_header(("Authorization", format!("Bearer {tok}")))
        .set_json(&json!({"reason": "spam"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
#[serial_test::serial]
async fn duplicate_report_is_conflict() {
    let repo = InMemRepo::new();
    let (_, reporter, _, post) = seed(&repo).await;
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone()))).configure(config),
    )
    .await;
    let tok = token(reporter.id, Role::User);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{}/report", post.slug))
        .insert_header(("Authorization", format!("Bearer {tok}")))
        .set_json(&json!({"reason": "spam", "description": "looks spammy"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 201);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{}/report", post.slug))
        .insert_header(("Authorization", format!("Bearer {tok}")))
        .set_json(&json!({"reason": "harassment"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 409);
}

#[actix_web::test]
#[serial_test::serial]
async fn delete_post_action_archives_and_notifies() {
    let repo = InMemRepo::new();
    let (author, reporter, admin, post) = seed(&repo).await;
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone()))).configure(config),
    )
    .await;
    let reporter_tok = token(reporter.id, Role::User);
    let admin_tok = token(admin.id, Role::Admin);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{}/report", post.slug))
        .insert_header(("Authorization", format!("Bearer {reporter_tok}")))
        .set_json(&json!({"reason": "spam", "description": "junk"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let report_id = body["report"]["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{report_id}/action"))
        .insert_header(("Authorization", format!("Bearer {admin_tok}")))
        .set_json(&json!({"action": "delete_post", "admin_notes": "spam"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 200);

    let report = repo.get_report(report_id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Resolved);
    assert_eq!(report.admin_action, AdminAction::PostDeleted);
    assert_eq!(report.reviewed_by, Some(admin.id));
    assert!(report.reviewed_at.is_some());

    let stored = repo.get_post(post.id).await.unwrap();
    assert_eq!(stored.status, PostStatus::Archived);

    // exactly one notification per party, notes appended verbatim
    let to_author = repo.list_notifications(author.id).await.unwrap();
    let to_reporter = repo.list_notifications(reporter.id).await.unwrap();
    assert_eq!(to_author.len(), 1);
    assert_eq!(to_reporter.len(), 1);
    assert_eq!(to_author[0].title, "Post removed");
    assert!(to_author[0].message.ends_with("Note: spam"));
    assert_eq!(to_reporter[0].title, "Report resolved");
    assert_eq!(to_reporter[0].data["action"], "delete_post");
    assert_eq!(to_reporter[0].data["post_id"], post.id);

    // one audit entry for the decision
    let req = test::TestRequest::get()
        .uri("/api/v1/audit-logs?action=report_action")
        .insert_header(("Authorization", format!("Bearer {admin_tok}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    let logs: AuditListResponse = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(logs.total, 1);
    assert_eq!(logs.items[0].metadata["action"], "delete_post");
    assert_eq!(logs.items[0].metadata["reported_user_id"], author.id);
}

#[actix_web::test]
#[serial_test::serial]
async fn ban_user_action_bans_the_post_owner() {
    let repo = InMemRepo::new();
    let (author, reporter, admin, post) = seed(&repo).await;
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone()))).configure(config),
    )
    .await;
    let reporter_tok = token(reporter.id, Role::User);
    let admin_tok = token(admin.id, Role::Admin);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{}/report", post.slug))
        .insert_header(("Authorization", format!("Bearer {reporter_tok}")))
        .set_json(&json!({"reason": "hate_speech"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let report_id = body["report"]["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{report_id}/action"))
        .insert_header(("Authorization", format!("Bearer {admin_tok}")))
        .set_json(&json!({"action": "ban_user"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 200);

    assert_eq!(repo.get_user(author.id).await.unwrap().status, UserStatus::Banned);
    let report = repo.get_report(report_id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Resolved);
    assert_eq!(report.admin_action, AdminAction::UserBanned);
    assert_eq!(repo.list_notifications(author.id).await.unwrap().len(), 1);
    assert_eq!(repo.list_notifications(reporter.id).await.unwrap().len(), 1);

    // banned author can no longer create posts
    let author_tok = token(author.id, Role::User);
    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(("Authorization", format!("Bearer {author_tok}")))
        .set_json(&json!({"title": "After Ban", "body": "b"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 403);
}

#[actix_web::test]
#[serial_test::serial]
async fn dismiss_terminates_at_dismissed() {
    let repo = InMemRepo::new();
    let (_, reporter, admin, post) = seed(&repo).await;
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone()))).configure(config),
    )
    .await;
    let reporter_tok = token(reporter.id, Role::User);
    let admin_tok = token(admin.id, Role::Admin);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{}/report", post.slug))
        .insert_header(("Authorization", format!("Bearer {reporter_tok}")))
        .set_json(&json!({"reason": "other"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let report_id = body["report"]["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{report_id}/action"))
        .insert_header(("Authorization", format!("Bearer {admin_tok}")))
        .set_json(&json!({"action": "dismiss"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 200);

    let report = repo.get_report(report_id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Dismissed);
    assert_eq!(report.admin_action, AdminAction::None);

    // terminal: a second decision is rejected
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{report_id}/action"))
        .insert_header(("Authorization", format!("Bearer {admin_tok}")))
        .set_json(&json!({"action": "warning"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 409);
}

#[actix_web::test]
#[serial_test::serial]
async fn warning_touches_nothing_but_the_report() {
    let repo = InMemRepo::new();
    let (author, reporter, admin, post) = seed(&repo).await;
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone()))).configure(config),
    )
    .await;
    let reporter_tok = token(reporter.id, Role::User);
    let admin_tok = token(admin.id, Role::Admin);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/posts/{}/report", post.slug))
        .insert_header(("Authorization", format!("Bearer {reporter_tok}")))
        .set_json(&json!({"reason": "misinformation"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let report_id = body["report"]["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/reports/{report_id}/action"))
        .insert_header(("Authorization", format!("Bearer {admin_tok}")))
        .set_json(&json!({"action": "warning"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 200);

    let report = repo.get_report(report_id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Resolved);
    assert_eq!(report.admin_action, AdminAction::Warning);
    // post and owner untouched
    assert_eq!(repo.get_post(post.id).await.unwrap().status, PostStatus::Published);
    assert_eq!(repo.get_user(author.id).await.unwrap().status, UserStatus::Active);
}

#[actix_web::test]
#[serial_test::serial]
async fn unknown_action_is_rejected_before_the_workflow() {
    let repo = InMemRepo::new();
    let (_, _, admin, _) = seed(&repo).await;
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone()))).configure(config),
    )
    .await;
    let admin_tok = token(admin.id, Role::Admin);

    let req = test::TestRequest::post()
        .uri("/api/v1/reports/1/action")
        .insert_header(("Authorization", format!("Bearer {admin_tok}")))
        .set_json(&json!({"action": "obliterate"}))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
#[serial_test::serial]
async fn list_and_stats_reflect_filters() {
    let repo = InMemRepo::new();
    let (_, reporter, admin, post) = seed(&repo).await;
    let second = repo
        .create_user(NewUser { username: "reporter2".into(), role: Role::User })
        .await
        .unwrap();
    let mut app = test::init_service(
        App::new().app_data(actix_web::web::Data::new(state(repo.clone()))).configure(config),
    )
    .await;
    let admin_tok = token(admin.id, Role::Admin);

    for (uid, reason) in [(reporter.id, "spam"), (second.id, "violence")] {
        let tok = token(uid, Role::User);
        let req = test::TestRequest::post()
            .uri(&format!("/api/v1/posts/{}/report", post.slug))
            .insert_header(("Authorization", format!("Bearer {tok}")))
            .set_json(&json!({"reason": reason, "description": format!("{reason} here")}))
            .to_request();
        let resp = test::call_service(&mut app, req).await;
        assert_eq!(resp.status(), 201);
    }

    let req = test::TestRequest::get()
        .uri("/api/v1/reports?reason=spam")
        .insert_header(("Authorization", format!("Bearer {admin_tok}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    let list: ReportListResponse = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(list.total, 1);
    assert_eq!(list.items[0].reason, ReportReason::Spam);

    let req = test::TestRequest::get()
        .uri("/api/v1/reports?search=violence")
        .insert_header(("Authorization", format!("Bearer {admin_tok}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    let list: ReportListResponse = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(list.total, 1);

    let req = test::TestRequest::get()
        .uri("/api/v1/reports/stats")
        .insert_header(("Authorization", format!("Bearer {admin_tok}")))
        .to_request();
    let resp = test::call_service(&mut app, req).await;
    let stats: ReportStats = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.by_reason.len(), 2);
}
