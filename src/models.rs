use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::auth::Role;

// Always Postgres-compatible ids
pub type Id = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "post_status", rename_all = "snake_case")]
pub enum PostStatus {
    Draft,
    Review,
    Scheduled,
    Published,
    Archived,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Review => "review",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "comment_status", rename_all = "snake_case")]
pub enum CommentStatus {
    Pending,
    Approved,
    Hidden,
    Rejected,
    Spam,
}

impl CommentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentStatus::Pending => "pending",
            CommentStatus::Approved => "approved",
            CommentStatus::Hidden => "hidden",
            CommentStatus::Rejected => "rejected",
            CommentStatus::Spam => "spam",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "report_status", rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Reviewed => "reviewed",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "report_reason", rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Harassment,
    HateSpeech,
    InappropriateContent,
    CopyrightViolation,
    Misinformation,
    Violence,
    Other,
}

impl ReportReason {
    pub const ALL: [ReportReason; 8] = [
        ReportReason::Spam,
        ReportReason::Harassment,
        ReportReason::HateSpeech,
        ReportReason::InappropriateContent,
        ReportReason::CopyrightViolation,
        ReportReason::Misinformation,
        ReportReason::Violence,
        ReportReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportReason::Spam => "spam",
            ReportReason::Harassment => "harassment",
            ReportReason::HateSpeech => "hate_speech",
            ReportReason::InappropriateContent => "inappropriate_content",
            ReportReason::CopyrightViolation => "copyright_violation",
            ReportReason::Misinformation => "misinformation",
            ReportReason::Violence => "violence",
            ReportReason::Other => "other",
        }
    }
}

/// Enforcement outcome stored on a reviewed report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "admin_action", rename_all = "snake_case")]
pub enum AdminAction {
    None,
    Warning,
    PostDeleted,
    UserBanned,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::None => "none",
            AdminAction::Warning => "warning",
            AdminAction::PostDeleted => "post_deleted",
            AdminAction::UserBanned => "user_banned",
        }
    }
}

/// The action an admin selects when resolving a report. A closed set: anything
/// else fails to deserialize before the workflow runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReportActionKind {
    Dismiss,
    Warning,
    DeletePost,
    BanUser,
}

impl ReportActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportActionKind::Dismiss => "dismiss",
            ReportActionKind::Warning => "warning",
            ReportActionKind::DeletePost => "delete_post",
            ReportActionKind::BanUser => "ban_user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "user_status", rename_all = "snake_case")]
pub enum UserStatus {
    Active,
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommentBulkAction {
    Approve,
    Hide,
    Delete,
}

impl CommentBulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentBulkAction::Approve => "approve",
            CommentBulkAction::Hide => "hide",
            CommentBulkAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub role: Role,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub owner_id: Id,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub excerpt: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub view_count: i64,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub excerpt: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// draft (default) or review
    pub status: Option<PostStatus>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Owner-side partial edit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdatePost {
    pub title: Option<String>,
    pub body: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Admin-side general edit, may move the post between states.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AdminUpdatePost {
    pub title: Option<String>,
    pub body: Option<String>,
    pub excerpt: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<PostStatus>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    pub author_id: Id,
    pub body: String,
    pub parent_id: Option<Id>,
    pub status: CommentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub body: String,
    pub parent_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BulkCommentRequest {
    pub action: CommentBulkAction,
    pub ids: Vec<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Report {
    pub id: Id,
    pub reporter_id: Id,
    pub reported_user_id: Id,
    pub post_id: Id,
    pub reason: ReportReason,
    pub description: Option<String>,
    pub status: ReportStatus,
    pub admin_action: AdminAction,
    pub admin_notes: Option<String>,
    pub reviewed_by: Option<Id>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewReport {
    pub reason: ReportReason,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportActionRequest {
    pub action: ReportActionKind,
    pub admin_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct AuditLogEntry {
    pub id: Id,
    pub admin_id: Id,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<Id>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Audit entry as served to the admin UI: `target_title` is resolved against
/// the live tables at read time and is null when the target no longer exists.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditLogView {
    pub id: Id,
    pub admin_id: Id,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<Id>,
    pub metadata: Value,
    pub target_title: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogView {
    pub fn new(entry: AuditLogEntry, target_title: Option<String>) -> Self {
        Self {
            id: entry.id,
            admin_id: entry.admin_id,
            action: entry.action,
            target_type: entry.target_type,
            target_id: entry.target_id,
            metadata: entry.metadata,
            target_title,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Notification {
    pub id: Id,
    pub user_id: Id,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Value,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---- query/filter types -------------------------------------------------

fn default_page() -> i64 {
    1
}
fn default_per_page() -> i64 {
    20
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct PostQuery {
    pub status: Option<PostStatus>,
    pub category: Option<String>,
    pub tag: Option<String>,
    /// restrict to the caller's own posts
    pub mine: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct ReportQuery {
    pub status: Option<ReportStatus>,
    pub reason: Option<ReportReason>,
    /// substring match against the report description
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

impl Default for ReportQuery {
    fn default() -> Self {
        Self { status: None, reason: None, search: None, page: 1, per_page: 20 }
    }
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub target_type: Option<String>,
    pub limit: Option<i64>,
}

// ---- list / stats responses --------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportListResponse {
    pub items: Vec<Report>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReasonCount {
    pub reason: ReportReason,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReportStats {
    pub total: i64,
    pub pending: i64,
    pub reviewed: i64,
    pub resolved: i64,
    pub dismissed: i64,
    pub by_reason: Vec<ReasonCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuditListResponse {
    pub items: Vec<AuditLogView>,
    pub total: i64,
}
