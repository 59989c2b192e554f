use utoipa::OpenApi;

use crate::auth::Role;
use crate::models::{
    AdminAction, AdminUpdatePost, AuditListResponse, AuditLogEntry, AuditLogView,
    BulkCommentRequest, Comment, CommentBulkAction, CommentStatus, NewComment, NewPost, NewReport,
    Notification, Post, PostStatus, ReasonCount, Report, ReportActionKind, ReportActionRequest,
    ReportListResponse, ReportReason, ReportStats, ReportStatus, UpdatePost, User, UserStatus,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::create_post,
        crate::routes::list_posts,
        crate::routes::get_post,
        crate::routes::edit_post,
        crate::routes::admin_update_post,
        crate::routes::submit_post,
        crate::routes::approve_post,
        crate::routes::reject_post,
        crate::routes::report_post,
        crate::routes::list_reports,
        crate::routes::report_stats,
        crate::routes::report_action,
        crate::routes::create_comment,
        crate::routes::bulk_comments,
        crate::routes::list_audit_logs,
    ),
    components(schemas(
        Post, NewPost, UpdatePost, AdminUpdatePost, Comment, NewComment, BulkCommentRequest,
        Report, NewReport, ReportActionRequest, ReportListResponse, ReportStats, ReasonCount,
        AuditLogEntry, AuditLogView, AuditListResponse, Notification, User,
        PostStatus, CommentStatus, CommentBulkAction, ReportStatus, ReportReason,
        ReportActionKind, AdminAction, UserStatus, Role,
        crate::routes::RejectRequest, crate::routes::MeResponse
    )),
    tags(
        (name = "posts", description = "Post lifecycle and publishing"),
        (name = "comments", description = "Comment creation and moderation"),
        (name = "reports", description = "Abuse reports and enforcement"),
        (name = "audit", description = "Admin action trail"),
    )
)]
pub struct ApiDoc;
