//! Periodic promotion of scheduled posts whose publish time has passed.
//! Stateless and idempotent: the select predicate only matches scheduled
//! rows, so a rerun over already-published posts is a no-op. Unlike a manual
//! approve, this automatic transition writes no audit entry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::models::PostStatus;
use crate::repo::Repo;

/// One sweep. Returns the number of posts promoted. A single row failing to
/// update is logged and skipped; the rest of the batch proceeds.
pub async fn publish_due(repo: &dyn Repo) -> usize {
    let now = Utc::now();
    let due = match repo.list_due_scheduled(now).await {
        Ok(v) => v,
        Err(e) => {
            tracing::error!(%e, "scheduler select failed");
            return 0;
        }
    };
    let mut promoted = 0;
    for mut post in due {
        let id = post.id;
        post.status = PostStatus::Published;
        post.published_at = Some(post.scheduled_at.unwrap_or(now));
        post.scheduled_at = None;
        post.rejection_reason = None;
        match repo.update_post(post).await {
            Ok(_) => promoted += 1,
            Err(e) => tracing::warn!(post_id = id, %e, "scheduled publish failed, skipping"),
        }
    }
    if promoted > 0 {
        metrics::counter!("quill_posts_published_total", promoted as u64);
        tracing::info!(promoted, "scheduler sweep published posts");
    }
    promoted
}

/// Run the sweep on a fixed interval until the process exits.
pub fn spawn(repo: Arc<dyn Repo>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            publish_due(repo.as_ref()).await;
        }
    });
}
