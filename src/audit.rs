//! Append-only trail of admin actions. Writes are best-effort: a failed or
//! skipped audit insert must never fail the moderation action that caused it.

use serde_json::Value;

use crate::models::{AuditLogView, AuditQuery, Id};
use crate::repo::{CreateAudit, Repo, RepoResult};

pub mod actions {
    pub const PUBLISH_POST: &str = "publish_post";
    pub const SCHEDULE_POST: &str = "schedule_post";
    pub const REJECT_POST: &str = "reject_post";
    pub const UNPUBLISH_POST: &str = "unpublish_post";
    pub const UPDATE_POST: &str = "update_post";
    pub const APPROVE_COMMENT: &str = "approve_comment";
    pub const REJECT_COMMENT: &str = "reject_comment";
    pub const HIDE_COMMENT: &str = "hide_comment";
    pub const DELETE_COMMENT: &str = "delete_comment";
    pub const BULK_COMMENT_ACTION: &str = "bulk_comment_action";
    pub const REPORT_ACTION: &str = "report_action";
}

pub mod targets {
    pub const POST: &str = "post";
    pub const COMMENT: &str = "comment";
    pub const USER: &str = "user";
    pub const REPORT: &str = "report";
}

/// Append one entry. `actor = None` (no admin on the call path) is a silent
/// no-op; a storage failure is logged and swallowed.
pub async fn record(
    repo: &dyn Repo,
    actor: Option<Id>,
    action: &str,
    target_type: &str,
    target_id: Option<Id>,
    metadata: Value,
) {
    let Some(admin_id) = actor else { return };
    if let Err(e) = repo
        .append_audit(CreateAudit {
            admin_id,
            action: action.to_string(),
            target_type: target_type.to_string(),
            target_id,
            metadata,
        })
        .await
    {
        tracing::warn!(action, %e, "audit write failed");
    }
}

/// Read back entries, enriching each with a display title resolved against the
/// live tables. Deleted targets resolve to None; the title is not snapshotted.
pub async fn list(repo: &dyn Repo, q: AuditQuery) -> RepoResult<(Vec<AuditLogView>, i64)> {
    let (entries, total) = repo.list_audit(q).await?;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let title = resolve_title(repo, &entry).await;
        out.push(AuditLogView::new(entry, title));
    }
    Ok((out, total))
}

async fn resolve_title(repo: &dyn Repo, entry: &crate::models::AuditLogEntry) -> Option<String> {
    let id = entry.target_id?;
    match entry.target_type.as_str() {
        targets::POST => repo.get_post(id).await.ok().map(|p| p.title),
        targets::COMMENT => repo.get_comment(id).await.ok().map(|c| snippet(&c.body)),
        targets::USER => repo.get_user(id).await.ok().map(|u| u.username),
        targets::REPORT => repo
            .get_report(id)
            .await
            .ok()
            .map(|r| r.reason.as_str().to_string()),
        _ => None,
    }
}

fn snippet(body: &str) -> String {
    let mut s: String = body.chars().take(80).collect();
    if body.chars().count() > 80 {
        s.push('…');
    }
    s
}
