use std::sync::Arc;

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::{PostFilter, Repo};
use crate::{audit, moderation, reports, scheduler};

/// Site-level behavior toggles, read once at startup.
#[derive(Clone, Debug)]
pub struct SiteSettings {
    /// When set, new comments skip the pending queue.
    pub auto_approve_comments: bool,
}

impl SiteSettings {
    pub fn from_env() -> Self {
        let auto = std::env::var("AUTO_APPROVE_COMMENTS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self { auto_approve_comments: auto }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub rate: RateLimiterFacade,
    pub settings: SiteSettings,
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::patch().to(edit_post))
                    .route(web::put().to(admin_update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(web::resource("/posts/{id}/submit").route(web::post().to(submit_post)))
            .service(web::resource("/posts/{id}/approve").route(web::post().to(approve_post)))
            .service(web::resource("/posts/{id}/reject").route(web::post().to(reject_post)))
            .service(web::resource("/posts/{id}/unpublish").route(web::post().to(unpublish_post)))
            .service(web::resource("/posts/{slug}/report").route(web::post().to(report_post)))
            .service(
                web::resource("/posts/{id}/comments")
                    .route(web::get().to(list_comments))
                    .route(web::post().to(create_comment)),
            )
            // literal segment first, or the {id} resource swallows it
            .service(web::resource("/comments/bulk").route(web::post().to(bulk_comments)))
            .service(web::resource("/comments/{id}/approve").route(web::post().to(approve_comment)))
            .service(web::resource("/comments/{id}/hide").route(web::post().to(hide_comment)))
            .service(web::resource("/comments/{id}/reject").route(web::post().to(reject_comment)))
            .service(web::resource("/comments/{id}").route(web::delete().to(delete_comment)))
            .service(web::resource("/reports").route(web::get().to(list_reports)))
            .service(web::resource("/reports/stats").route(web::get().to(report_stats)))
            .service(web::resource("/reports/{id}/action").route(web::post().to(report_action)))
            .service(web::resource("/audit-logs").route(web::get().to(list_audit_logs)))
            .service(web::resource("/notifications").route(web::get().to(list_notifications)))
            .service(
                web::resource("/notifications/{id}/read").route(web::post().to(read_notification)),
            )
            .service(
                web::resource("/admin/scheduler/run").route(web::post().to(run_scheduler)),
            )
            .service(web::resource("/auth/me").route(web::get().to(auth_me)))
            .service(web::resource("/auth/refresh").route(web::post().to(refresh_token))),
    );
}

// ---------------- posts -------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created (draft or review)", body = Post),
        (status = 403, description = "Banned or unknown user"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn create_post(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    let actor = auth.user_id();
    if !data.rate.allow_post(actor) {
        return Err(ApiError::RateLimited);
    }
    let post = moderation::create_post(data.repo.as_ref(), actor, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    params(PostQuery),
    responses((status = 200, description = "List posts", body = [Post]))
)]
pub async fn list_posts(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    query: web::Query<PostQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner();
    let is_admin = auth.as_ref().map(|a| a.is_admin()).unwrap_or(false);
    let filter = if q.mine.unwrap_or(false) {
        let auth = auth.as_ref().ok_or(ApiError::Forbidden)?;
        PostFilter { status: q.status, owner_id: Some(auth.user_id()), category: q.category, tag: q.tag }
    } else if is_admin {
        PostFilter { status: q.status, owner_id: None, category: q.category, tag: q.tag }
    } else {
        // public view only ever sees published posts
        PostFilter { status: Some(PostStatus::Published), owner_id: None, category: q.category, tag: q.tag }
    };
    let posts = data.repo.list_posts(filter).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = Post),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn get_post(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    let is_admin = auth.as_ref().map(|a| a.is_admin()).unwrap_or(false);
    let is_owner = auth.as_ref().map(|a| a.user_id() == post.owner_id).unwrap_or(false);
    if post.status != PostStatus::Published && !is_admin && !is_owner {
        return Err(ApiError::NotFound);
    }
    if post.status == PostStatus::Published {
        let _ = data.repo.increment_views(post.id).await;
    }
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    patch,
    path = "/api/v1/posts/{id}",
    request_body = UpdatePost,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post updated", body = Post),
        (status = 403, description = "Not the owner"),
        (status = 409, description = "Post no longer editable by its owner")
    )
)]
pub async fn edit_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePost>,
) -> Result<HttpResponse, ApiError> {
    let post = moderation::edit(
        data.repo.as_ref(),
        path.into_inner(),
        auth.user_id(),
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}",
    request_body = AdminUpdatePost,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post updated"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<AdminUpdatePost>,
) -> Result<HttpResponse, ApiError> {
    crate::require_admin!(auth);
    let post = moderation::admin_update(
        data.repo.as_ref(),
        path.into_inner(),
        auth.user_id(),
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "post updated", "post": post })))
}

pub async fn delete_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    moderation::delete_post(data.repo.as_ref(), path.into_inner(), auth.user_id()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/submit",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Draft submitted for review"),
        (status = 409, description = "Not a draft")
    )
)]
pub async fn submit_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = moderation::submit(data.repo.as_ref(), path.into_inner(), auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "post submitted for review", "post": post })))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/approve",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Published now, or scheduled when a future publish time is set"),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Post is not in review")
    )
)]
pub async fn approve_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    crate::require_admin!(auth);
    let post = moderation::approve(data.repo.as_ref(), path.into_inner(), auth.user_id()).await?;
    let message = match post.status {
        PostStatus::Scheduled => "post scheduled",
        _ => "post published",
    };
    Ok(HttpResponse::Ok().json(json!({ "message": message, "post": post })))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct RejectRequest {
    #[serde(default)]
    pub rejection_reason: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/reject",
    request_body = RejectRequest,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post archived with reason"),
        (status = 422, description = "Missing rejection reason"),
        (status = 409, description = "Post is not in review")
    )
)]
pub async fn reject_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<RejectRequest>,
) -> Result<HttpResponse, ApiError> {
    crate::require_admin!(auth);
    let post = moderation::reject(
        data.repo.as_ref(),
        path.into_inner(),
        auth.user_id(),
        &payload.rejection_reason,
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "post rejected", "post": post })))
}

pub async fn unpublish_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    crate::require_admin!(auth);
    let post = moderation::unpublish(data.repo.as_ref(), path.into_inner(), auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "post unpublished", "post": post })))
}

// ---------------- reports ------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/posts/{slug}/report",
    request_body = NewReport,
    params(("slug" = String, Path, description = "Post slug")),
    responses(
        (status = 201, description = "Report filed", body = Report),
        (status = 403, description = "Cannot report your own post"),
        (status = 409, description = "Already reported by this user")
    )
)]
pub async fn report_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<NewReport>,
) -> Result<HttpResponse, ApiError> {
    let actor = auth.user_id();
    if !data.rate.allow_report(actor) {
        return Err(ApiError::RateLimited);
    }
    let post = data.repo.get_post_by_slug(&path.into_inner()).await?;
    let report = reports::submit(data.repo.as_ref(), actor, post.id, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(json!({ "message": "report submitted", "report": report })))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports",
    params(ReportQuery),
    responses(
        (status = 200, description = "Paginated reports", body = ReportListResponse),
        (status = 403, description = "Admins only")
    )
)]
pub async fn list_reports(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, ApiError> {
    crate::require_admin!(auth);
    let (items, total) = data.repo.list_reports(query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ReportListResponse { items, total }))
}

#[utoipa::path(
    get,
    path = "/api/v1/reports/stats",
    responses(
        (status = 200, description = "Counts by status and reason", body = ReportStats),
        (status = 403, description = "Admins only")
    )
)]
pub async fn report_stats(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    crate::require_admin!(auth);
    let stats = data.repo.report_stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}

#[utoipa::path(
    post,
    path = "/api/v1/reports/{id}/action",
    request_body = ReportActionRequest,
    params(("id" = Id, Path, description = "Report id")),
    responses(
        (status = 200, description = "Action applied", body = Report),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Report already reviewed")
    )
)]
pub async fn report_action(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ReportActionRequest>,
) -> Result<HttpResponse, ApiError> {
    crate::require_admin!(auth);
    let report = reports::take_action(
        data.repo.as_ref(),
        path.into_inner(),
        auth.user_id(),
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "action applied", "report": report })))
}

// ---------------- comments ----------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/comments",
    request_body = NewComment,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 403, description = "Banned user, or non-owner reply"),
        (status = 404, description = "Post not published")
    )
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let actor = auth.user_id();
    if !data.rate.allow_comment(actor) {
        return Err(ApiError::RateLimited);
    }
    let comment = moderation::create_comment(
        data.repo.as_ref(),
        path.into_inner(),
        actor,
        payload.into_inner(),
        data.settings.auto_approve_comments,
    )
    .await?;
    Ok(HttpResponse::Created().json(comment))
}

pub async fn list_comments(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let post = data.repo.get_post(path.into_inner()).await?;
    let is_admin = auth.as_ref().map(|a| a.is_admin()).unwrap_or(false);
    if post.status != PostStatus::Published && !is_admin {
        return Err(ApiError::NotFound);
    }
    let status = if is_admin { None } else { Some(CommentStatus::Approved) };
    let comments = data.repo.list_comments(post.id, status).await?;
    Ok(HttpResponse::Ok().json(comments))
}

macro_rules! comment_moderation_handler {
    ($name:ident, $status:expr) => {
        pub async fn $name(
            auth: Auth,
            data: web::Data<AppState>,
            path: web::Path<Id>,
        ) -> Result<HttpResponse, ApiError> {
            crate::require_admin!(auth);
            let comment = moderation::moderate_comment(
                data.repo.as_ref(),
                path.into_inner(),
                auth.user_id(),
                $status,
            )
            .await?;
            Ok(HttpResponse::Ok().json(json!({ "message": "comment updated", "comment": comment })))
        }
    };
}

comment_moderation_handler!(approve_comment, CommentStatus::Approved);
comment_moderation_handler!(hide_comment, CommentStatus::Hidden);
comment_moderation_handler!(reject_comment, CommentStatus::Rejected);

pub async fn delete_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    moderation::delete_comment(
        data.repo.as_ref(),
        path.into_inner(),
        auth.user_id(),
        auth.is_admin(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "comment deleted" })))
}

#[utoipa::path(
    post,
    path = "/api/v1/comments/bulk",
    request_body = BulkCommentRequest,
    responses(
        (status = 200, description = "Batch applied, one audit entry written"),
        (status = 403, description = "Admins only"),
        (status = 422, description = "Empty id list")
    )
)]
pub async fn bulk_comments(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<BulkCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    crate::require_admin!(auth);
    let affected =
        moderation::bulk_comments(data.repo.as_ref(), auth.user_id(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "bulk action applied", "affected": affected })))
}

// ---------------- audit / notifications / ops ----------------------------

#[utoipa::path(
    get,
    path = "/api/v1/audit-logs",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries, target_title resolved at read time", body = AuditListResponse),
        (status = 403, description = "Admins only")
    )
)]
pub async fn list_audit_logs(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<AuditQuery>,
) -> Result<HttpResponse, ApiError> {
    crate::require_admin!(auth);
    let (items, total) = audit::list(data.repo.as_ref(), query.into_inner()).await?;
    Ok(HttpResponse::Ok().json(AuditListResponse { items, total }))
}

pub async fn list_notifications(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let items = data.repo.list_notifications(auth.user_id()).await?;
    Ok(HttpResponse::Ok().json(items))
}

pub async fn read_notification(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let n = data
        .repo
        .mark_notification_read(path.into_inner(), auth.user_id())
        .await?;
    Ok(HttpResponse::Ok().json(n))
}

/// Manual trigger for the sweep that normally runs on a timer.
pub async fn run_scheduler(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    crate::require_admin!(auth);
    let published = scheduler::publish_due(data.repo.as_ref()).await;
    Ok(HttpResponse::Ok().json(json!({ "published": published })))
}

// ---------------- auth ----------------------------------------------------

#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct MeResponse {
    pub id: Id,
    pub username: String,
    pub role: String,
    pub status: UserStatus,
}

pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(auth.user_id()).await?;
    let role = if auth.is_admin() { "admin" } else { "user" };
    Ok(HttpResponse::Ok().json(MeResponse {
        id: user.id,
        username: user.username,
        role: role.to_string(),
        status: user.status,
    }))
}

pub async fn refresh_token(auth: Auth) -> Result<HttpResponse, ApiError> {
    let jwt = crate::auth::create_jwt(auth.user_id(), auth.0.roles.clone())
        .map_err(|_| ApiError::Internal)?;
    Ok(HttpResponse::Ok().json(json!({ "token": jwt })))
}
