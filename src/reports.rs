//! Abuse report intake and the admin decision workflow that turns a report
//! into an enforcement action, notifications for both parties, and an audit
//! entry.

use chrono::Utc;
use serde_json::json;

use crate::audit;
use crate::error::ApiError;
use crate::models::*;
use crate::moderation::ensure_active_user;
use crate::repo::{CreateNotification, CreateReport, Repo};

pub const NOTIFICATION_KIND: &str = "report_update";

/// File a report against a post. One report per (reporter, post); reporting
/// your own post is forbidden.
pub async fn submit(
    repo: &dyn Repo,
    reporter: Id,
    post_id: Id,
    new: NewReport,
) -> Result<Report, ApiError> {
    ensure_active_user(repo, reporter).await?;
    let post = repo.get_post(post_id).await?;
    if post.owner_id == reporter {
        return Err(ApiError::Forbidden);
    }
    let report = repo
        .create_report(CreateReport {
            reporter_id: reporter,
            reported_user_id: post.owner_id,
            post_id: post.id,
            reason: new.reason,
            description: new.description,
        })
        .await?; // duplicate -> Conflict
    Ok(report)
}

/// Title/message pair for one recipient.
struct Template {
    title: &'static str,
    message: &'static str,
}

fn reported_user_template(action: ReportActionKind) -> Template {
    match action {
        ReportActionKind::Dismiss => Template {
            title: "Report dismissed",
            message: "A report against your account was dismissed after review.",
        },
        ReportActionKind::Warning => Template {
            title: "Warning issued",
            message: "An admin issued a warning related to a reported post or account.",
        },
        ReportActionKind::DeletePost => Template {
            title: "Post removed",
            message: "Your reported post was removed by an admin.",
        },
        ReportActionKind::BanUser => Template {
            title: "Account action taken",
            message: "Your account was banned by an admin.",
        },
    }
}

fn reporter_template(action: ReportActionKind) -> Template {
    match action {
        ReportActionKind::Dismiss => Template {
            title: "Report dismissed",
            message: "Your report was reviewed and dismissed.",
        },
        ReportActionKind::Warning => Template {
            title: "Report reviewed",
            message: "Your report was reviewed and a warning was issued.",
        },
        ReportActionKind::DeletePost => Template {
            title: "Report resolved",
            message: "Your report was reviewed and the post was removed.",
        },
        ReportActionKind::BanUser => Template {
            title: "Report resolved",
            message: "Your report was reviewed and action was taken against the account.",
        },
    }
}

fn render_message(tpl: &Template, notes: Option<&str>) -> String {
    match notes.filter(|n| !n.trim().is_empty()) {
        Some(n) => format!("{} Note: {n}", tpl.message),
        None => tpl.message.to_string(),
    }
}

/// Apply an admin decision to a pending report.
///
/// Dismiss terminates at `dismissed`; every other action terminates at
/// `resolved`. Both states are terminal.
pub async fn take_action(
    repo: &dyn Repo,
    report_id: Id,
    admin_id: Id,
    req: ReportActionRequest,
) -> Result<Report, ApiError> {
    let mut report = repo.get_report(report_id).await?;
    if report.status != ReportStatus::Pending {
        return Err(ApiError::InvalidTransition(format!(
            "report is already {}",
            report.status.as_str()
        )));
    }
    let notes = req
        .admin_notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from);

    report.reviewed_by = Some(admin_id);
    report.reviewed_at = Some(Utc::now());
    report.admin_notes = notes.clone();
    report.status = ReportStatus::Reviewed;

    match req.action {
        ReportActionKind::Dismiss => {
            report.admin_action = AdminAction::None;
            report.status = ReportStatus::Dismissed;
        }
        ReportActionKind::Warning => {
            // Advisory only: no warning counter or suspension threshold exists.
            report.admin_action = AdminAction::Warning;
            report.status = ReportStatus::Resolved;
        }
        ReportActionKind::DeletePost => {
            if let Ok(mut post) = repo.get_post(report.post_id).await {
                post.status = PostStatus::Archived;
                post.published_at = None;
                post.scheduled_at = None;
                repo.update_post(post).await?;
            }
            report.admin_action = AdminAction::PostDeleted;
            report.status = ReportStatus::Resolved;
        }
        ReportActionKind::BanUser => {
            if repo.get_user(report.reported_user_id).await.is_ok() {
                repo.set_user_status(report.reported_user_id, UserStatus::Banned)
                    .await?;
            }
            report.admin_action = AdminAction::UserBanned;
            report.status = ReportStatus::Resolved;
        }
    }

    let report = repo.update_report(report).await?;
    metrics::counter!("quill_reports_actioned_total", 1);

    let post_slug = repo
        .get_post(report.post_id)
        .await
        .map(|p| p.slug)
        .unwrap_or_default();
    let data = json!({
        "report_id": report.id,
        "action": req.action.as_str(),
        "post_id": report.post_id,
        "post_slug": post_slug,
    });

    notify(repo, report.reported_user_id, reported_user_template(req.action), notes.as_deref(), &data).await;
    notify(repo, report.reporter_id, reporter_template(req.action), notes.as_deref(), &data).await;

    audit::record(
        repo,
        Some(admin_id),
        audit::actions::REPORT_ACTION,
        audit::targets::REPORT,
        Some(report.id),
        json!({
            "action": req.action.as_str(),
            "reported_user_id": report.reported_user_id,
            "post_id": report.post_id,
            "admin_notes": report.admin_notes,
        }),
    )
    .await;

    Ok(report)
}

async fn notify(
    repo: &dyn Repo,
    user_id: Id,
    tpl: Template,
    notes: Option<&str>,
    data: &serde_json::Value,
) {
    let res = repo
        .create_notification(CreateNotification {
            user_id,
            kind: NOTIFICATION_KIND.to_string(),
            title: tpl.title.to_string(),
            message: render_message(&tpl, notes),
            data: data.clone(),
        })
        .await;
    if let Err(e) = res {
        tracing::warn!(user_id, %e, "notification insert failed");
    }
}
