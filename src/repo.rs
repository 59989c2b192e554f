use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")]
    NotFound,
    #[error("conflict")]
    Conflict,
    #[error("storage error: {0}")]
    Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

/// Row-shaped creation inputs. These are assembled by the domain layer
/// (slug/excerpt/status decisions live there); the repo only assigns ids and
/// timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePost {
    pub owner_id: Id,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub excerpt: String,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub status: PostStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateComment {
    pub post_id: Id,
    pub author_id: Id,
    pub body: String,
    pub parent_id: Option<Id>,
    pub status: CommentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReport {
    pub reporter_id: Id,
    pub reported_user_id: Id,
    pub post_id: Id,
    pub reason: ReportReason,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotification {
    pub user_id: Id,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub data: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAudit {
    pub admin_id: Id,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<Id>,
    pub metadata: Value,
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub owner_id: Option<Id>,
    pub category: Option<String>,
    pub tag: Option<String>,
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn set_user_status(&self, id: Id, status: UserStatus) -> RepoResult<User>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    async fn create_post(&self, new: CreatePost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post>;
    async fn list_posts(&self, filter: PostFilter) -> RepoResult<Vec<Post>>;
    /// Whole-row save keyed by `post.id`; bumps `updated_at`. Last write wins,
    /// there is no optimistic locking at this scale.
    async fn update_post(&self, post: Post) -> RepoResult<Post>;
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
    async fn slug_exists(&self, slug: &str) -> RepoResult<bool>;
    /// Posts with status=scheduled whose scheduled_at has passed.
    async fn list_due_scheduled(&self, now: DateTime<Utc>) -> RepoResult<Vec<Post>>;
    async fn increment_views(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn create_comment(&self, new: CreateComment) -> RepoResult<Comment>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    async fn list_comments(&self, post_id: Id, status: Option<CommentStatus>) -> RepoResult<Vec<Comment>>;
    async fn set_comment_status(&self, id: Id, status: CommentStatus) -> RepoResult<Comment>;
    /// Removes the comment and its direct replies.
    async fn delete_comment(&self, id: Id) -> RepoResult<()>;
    /// Set-wise status change; unknown ids are skipped. Returns affected count.
    async fn set_comments_status(&self, ids: &[Id], status: CommentStatus) -> RepoResult<usize>;
    /// Set-wise delete (replies included); unknown ids are skipped.
    async fn delete_comments(&self, ids: &[Id]) -> RepoResult<usize>;
}

#[async_trait]
pub trait ReportRepo: Send + Sync {
    /// Fails with Conflict when a (reporter, post) report already exists.
    async fn create_report(&self, new: CreateReport) -> RepoResult<Report>;
    async fn get_report(&self, id: Id) -> RepoResult<Report>;
    async fn update_report(&self, report: Report) -> RepoResult<Report>;
    async fn list_reports(&self, q: ReportQuery) -> RepoResult<(Vec<Report>, i64)>;
    async fn report_stats(&self) -> RepoResult<ReportStats>;
}

#[async_trait]
pub trait NotificationRepo: Send + Sync {
    async fn create_notification(&self, new: CreateNotification) -> RepoResult<Notification>;
    async fn list_notifications(&self, user_id: Id) -> RepoResult<Vec<Notification>>;
    async fn mark_notification_read(&self, id: Id, user_id: Id) -> RepoResult<Notification>;
}

#[async_trait]
pub trait AuditRepo: Send + Sync {
    async fn append_audit(&self, new: CreateAudit) -> RepoResult<AuditLogEntry>;
    async fn list_audit(&self, q: AuditQuery) -> RepoResult<(Vec<AuditLogEntry>, i64)>;
}

pub trait Repo:
    UserRepo + PostRepo + CommentRepo + ReportRepo + NotificationRepo + AuditRepo
{
}

impl<T> Repo for T where
    T: UserRepo + PostRepo + CommentRepo + ReportRepo + NotificationRepo + AuditRepo
{
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock};

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        posts: HashMap<Id, Post>,
        comments: HashMap<Id, Comment>,
        reports: HashMap<Id, Report>,
        notifications: HashMap<Id, Notification>,
        audit: Vec<AuditLogEntry>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Ephemeral store, used by tests and as a dev fallback.
        pub fn new() -> Self {
            Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
        }

        /// Store backed by a JSON snapshot, reloaded on startup.
        pub fn with_snapshot(dir: impl Into<PathBuf>) -> Self {
            let mut path: PathBuf = dir.into();
            path.push("state.json");
            let state = Self::load_state_from(&path);
            Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!(path = %path.display(), "loaded snapshot");
                        s
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), %e, "snapshot parse failed, starting empty");
                        State::default()
                    }
                },
                Err(e) => {
                    tracing::info!(path = %path.display(), %e, "no snapshot, starting empty");
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let Some(path) = &self.snapshot_path else { return };
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&**path, s) {
                    tracing::warn!(path = %path.display(), %e, "snapshot write failed");
                }
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users.values().any(|u| u.username == new.username) {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                username: new.username,
                role: new.role,
                status: UserStatus::Active,
                created_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn set_user_status(&self, id: Id, status: UserStatus) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
            user.status = status;
            let updated = user.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, new: CreatePost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            if s.posts.values().any(|p| p.slug == new.slug) {
                return Err(RepoError::Conflict);
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let post = Post {
                id,
                owner_id: new.owner_id,
                title: new.title,
                slug: new.slug,
                body: new.body,
                excerpt: new.excerpt,
                category: new.category,
                tags: new.tags,
                status: new.status,
                scheduled_at: new.scheduled_at,
                published_at: None,
                rejection_reason: None,
                view_count: 0,
                like_count: 0,
                created_at: now,
                updated_at: now,
            };
            s.posts.insert(id, post.clone());
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts
                .values()
                .find(|p| p.slug == slug)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn list_posts(&self, filter: PostFilter) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .posts
                .values()
                .filter(|p| filter.status.map_or(true, |st| p.status == st))
                .filter(|p| filter.owner_id.map_or(true, |o| p.owner_id == o))
                .filter(|p| filter.category.as_deref().map_or(true, |c| p.category.as_deref() == Some(c)))
                .filter(|p| filter.tag.as_deref().map_or(true, |t| p.tags.iter().any(|x| x == t)))
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn update_post(&self, mut post: Post) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            if !s.posts.contains_key(&post.id) {
                return Err(RepoError::NotFound);
            }
            if s.posts.values().any(|p| p.slug == post.slug && p.id != post.id) {
                return Err(RepoError::Conflict);
            }
            post.updated_at = Utc::now();
            s.posts.insert(post.id, post.clone());
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.posts.remove(&id).ok_or(RepoError::NotFound)?;
            s.comments.retain(|_, c| c.post_id != id);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn slug_exists(&self, slug: &str) -> RepoResult<bool> {
            let s = self.state.read().unwrap();
            Ok(s.posts.values().any(|p| p.slug == slug))
        }

        async fn list_due_scheduled(&self, now: DateTime<Utc>) -> RepoResult<Vec<Post>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .posts
                .values()
                .filter(|p| p.status == PostStatus::Scheduled)
                .filter(|p| p.scheduled_at.map_or(false, |t| t <= now))
                .cloned()
                .collect();
            v.sort_by_key(|p| p.id);
            Ok(v)
        }

        async fn increment_views(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.view_count += 1;
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn create_comment(&self, new: CreateComment) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            if !s.posts.contains_key(&new.post_id) {
                return Err(RepoError::NotFound);
            }
            let id = Self::next_id(&mut s);
            let comment = Comment {
                id,
                post_id: new.post_id,
                author_id: new.author_id,
                body: new.body,
                parent_id: new.parent_id,
                status: new.status,
                created_at: Utc::now(),
            };
            s.comments.insert(id, comment.clone());
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            let s = self.state.read().unwrap();
            s.comments.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_comments(&self, post_id: Id, status: Option<CommentStatus>) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.post_id == post_id)
                .filter(|c| status.map_or(true, |st| c.status == st))
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }

        async fn set_comment_status(&self, id: Id, status: CommentStatus) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
            comment.status = status;
            let updated = comment.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.comments.remove(&id).ok_or(RepoError::NotFound)?;
            s.comments.retain(|_, c| c.parent_id != Some(id));
            drop(s);
            self.persist();
            Ok(())
        }

        async fn set_comments_status(&self, ids: &[Id], status: CommentStatus) -> RepoResult<usize> {
            let mut s = self.state.write().unwrap();
            let mut n = 0;
            for id in ids {
                if let Some(c) = s.comments.get_mut(id) {
                    c.status = status;
                    n += 1;
                }
            }
            drop(s);
            self.persist();
            Ok(n)
        }

        async fn delete_comments(&self, ids: &[Id]) -> RepoResult<usize> {
            let mut s = self.state.write().unwrap();
            let mut n = 0;
            for id in ids {
                if s.comments.remove(id).is_some() {
                    n += 1;
                    s.comments.retain(|_, c| c.parent_id != Some(*id));
                }
            }
            drop(s);
            self.persist();
            Ok(n)
        }
    }

    #[async_trait]
    impl ReportRepo for InMemRepo {
        async fn create_report(&self, new: CreateReport) -> RepoResult<Report> {
            let mut s = self.state.write().unwrap();
            if s.reports
                .values()
                .any(|r| r.reporter_id == new.reporter_id && r.post_id == new.post_id)
            {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let report = Report {
                id,
                reporter_id: new.reporter_id,
                reported_user_id: new.reported_user_id,
                post_id: new.post_id,
                reason: new.reason,
                description: new.description,
                status: ReportStatus::Pending,
                admin_action: AdminAction::None,
                admin_notes: None,
                reviewed_by: None,
                reviewed_at: None,
                created_at: Utc::now(),
            };
            s.reports.insert(id, report.clone());
            drop(s);
            self.persist();
            Ok(report)
        }

        async fn get_report(&self, id: Id) -> RepoResult<Report> {
            let s = self.state.read().unwrap();
            s.reports.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn update_report(&self, report: Report) -> RepoResult<Report> {
            let mut s = self.state.write().unwrap();
            if !s.reports.contains_key(&report.id) {
                return Err(RepoError::NotFound);
            }
            s.reports.insert(report.id, report.clone());
            drop(s);
            self.persist();
            Ok(report)
        }

        async fn list_reports(&self, q: ReportQuery) -> RepoResult<(Vec<Report>, i64)> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .reports
                .values()
                .filter(|r| q.status.map_or(true, |st| r.status == st))
                .filter(|r| q.reason.map_or(true, |re| r.reason == re))
                .filter(|r| {
                    q.search.as_deref().map_or(true, |needle| {
                        r.description
                            .as_deref()
                            .map_or(false, |d| d.to_lowercase().contains(&needle.to_lowercase()))
                    })
                })
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let total = v.len() as i64;
            let per_page = q.per_page.max(1);
            let offset = (q.page.max(1) - 1) * per_page;
            let items = v
                .into_iter()
                .skip(offset as usize)
                .take(per_page as usize)
                .collect();
            Ok((items, total))
        }

        async fn report_stats(&self) -> RepoResult<ReportStats> {
            let s = self.state.read().unwrap();
            let count = |st: ReportStatus| s.reports.values().filter(|r| r.status == st).count() as i64;
            let by_reason = ReportReason::ALL
                .iter()
                .map(|&reason| ReasonCount {
                    reason,
                    count: s.reports.values().filter(|r| r.reason == reason).count() as i64,
                })
                .filter(|rc| rc.count > 0)
                .collect();
            Ok(ReportStats {
                total: s.reports.len() as i64,
                pending: count(ReportStatus::Pending),
                reviewed: count(ReportStatus::Reviewed),
                resolved: count(ReportStatus::Resolved),
                dismissed: count(ReportStatus::Dismissed),
                by_reason,
            })
        }
    }

    #[async_trait]
    impl NotificationRepo for InMemRepo {
        async fn create_notification(&self, new: CreateNotification) -> RepoResult<Notification> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let n = Notification {
                id,
                user_id: new.user_id,
                kind: new.kind,
                title: new.title,
                message: new.message,
                data: new.data,
                read_at: None,
                created_at: Utc::now(),
            };
            s.notifications.insert(id, n.clone());
            drop(s);
            self.persist();
            Ok(n)
        }

        async fn list_notifications(&self, user_id: Id) -> RepoResult<Vec<Notification>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .notifications
                .values()
                .filter(|n| n.user_id == user_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }

        async fn mark_notification_read(&self, id: Id, user_id: Id) -> RepoResult<Notification> {
            let mut s = self.state.write().unwrap();
            let n = s.notifications.get_mut(&id).ok_or(RepoError::NotFound)?;
            if n.user_id != user_id {
                return Err(RepoError::NotFound);
            }
            if n.read_at.is_none() {
                n.read_at = Some(Utc::now());
            }
            let updated = n.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl AuditRepo for InMemRepo {
        async fn append_audit(&self, new: CreateAudit) -> RepoResult<AuditLogEntry> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let entry = AuditLogEntry {
                id,
                admin_id: new.admin_id,
                action: new.action,
                target_type: new.target_type,
                target_id: new.target_id,
                metadata: new.metadata,
                created_at: Utc::now(),
            };
            s.audit.push(entry.clone());
            drop(s);
            self.persist();
            Ok(entry)
        }

        async fn list_audit(&self, q: AuditQuery) -> RepoResult<(Vec<AuditLogEntry>, i64)> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .audit
                .iter()
                .filter(|e| q.action.as_deref().map_or(true, |a| e.action == a))
                .filter(|e| q.target_type.as_deref().map_or(true, |t| e.target_type == t))
                .cloned()
                .collect();
            v.sort_by(|a, b| b.id.cmp(&a.id));
            let total = v.len() as i64;
            let limit = q.limit.unwrap_or(50).clamp(1, 500) as usize;
            v.truncate(limit);
            Ok((v, total))
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    fn db_err(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(d) if d.is_unique_violation() => RepoError::Conflict,
            _ => RepoError::Internal(e.to_string()),
        }
    }

    const POST_COLS: &str = "id, owner_id, title, slug, body, excerpt, category, tags, status, \
                             scheduled_at, published_at, rejection_reason, view_count, like_count, \
                             created_at, updated_at";

    const REPORT_COLS: &str = "id, reporter_id, reported_user_id, post_id, reason, description, \
                               status, admin_action, admin_notes, reviewed_by, reviewed_at, created_at";

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "INSERT INTO users (username, role, status) VALUES ($1, $2, 'active') \
                 RETURNING id, username, role, status, created_at",
            )
            .bind(&new.username)
            .bind(new.role)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "SELECT id, username, role, status, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn set_user_status(&self, id: Id, status: UserStatus) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "UPDATE users SET status = $2 WHERE id = $1 \
                 RETURNING id, username, role, status, created_at",
            )
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, new: CreatePost) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!(
                "INSERT INTO posts (owner_id, title, slug, body, excerpt, category, tags, status, scheduled_at) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9) RETURNING {POST_COLS}"
            ))
            .bind(new.owner_id)
            .bind(&new.title)
            .bind(&new.slug)
            .bind(&new.body)
            .bind(&new.excerpt)
            .bind(&new.category)
            .bind(&new.tags)
            .bind(new.status)
            .bind(new.scheduled_at)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLS} FROM posts WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!("SELECT {POST_COLS} FROM posts WHERE slug = $1"))
                .bind(slug)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn list_posts(&self, filter: PostFilter) -> RepoResult<Vec<Post>> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLS} FROM posts WHERE \
                 ($1::post_status IS NULL OR status = $1) AND \
                 ($2::bigint IS NULL OR owner_id = $2) AND \
                 ($3::text IS NULL OR category = $3) AND \
                 ($4::text IS NULL OR $4 = ANY(tags)) \
                 ORDER BY created_at DESC"
            ))
            .bind(filter.status)
            .bind(filter.owner_id)
            .bind(&filter.category)
            .bind(&filter.tag)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn update_post(&self, post: Post) -> RepoResult<Post> {
            sqlx::query_as::<_, Post>(&format!(
                "UPDATE posts SET title=$2, slug=$3, body=$4, excerpt=$5, category=$6, tags=$7, \
                 status=$8, scheduled_at=$9, published_at=$10, rejection_reason=$11, \
                 updated_at=now() WHERE id=$1 RETURNING {POST_COLS}"
            ))
            .bind(post.id)
            .bind(&post.title)
            .bind(&post.slug)
            .bind(&post.body)
            .bind(&post.excerpt)
            .bind(&post.category)
            .bind(&post.tags)
            .bind(post.status)
            .bind(post.scheduled_at)
            .bind(post.published_at)
            .bind(&post.rejection_reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn slug_exists(&self, slug: &str) -> RepoResult<bool> {
            let n: (i64,) = sqlx::query_as("SELECT count(*) FROM posts WHERE slug = $1")
                .bind(slug)
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(n.0 > 0)
        }

        async fn list_due_scheduled(&self, now: DateTime<Utc>) -> RepoResult<Vec<Post>> {
            sqlx::query_as::<_, Post>(&format!(
                "SELECT {POST_COLS} FROM posts \
                 WHERE status = 'scheduled' AND scheduled_at <= $1 ORDER BY id"
            ))
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn increment_views(&self, id: Id) -> RepoResult<()> {
            sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(())
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn create_comment(&self, new: CreateComment) -> RepoResult<Comment> {
            sqlx::query_as::<_, Comment>(
                "INSERT INTO comments (post_id, author_id, body, parent_id, status) \
                 VALUES ($1,$2,$3,$4,$5) \
                 RETURNING id, post_id, author_id, body, parent_id, status, created_at",
            )
            .bind(new.post_id)
            .bind(new.author_id)
            .bind(&new.body)
            .bind(new.parent_id)
            .bind(new.status)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            sqlx::query_as::<_, Comment>(
                "SELECT id, post_id, author_id, body, parent_id, status, created_at \
                 FROM comments WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn list_comments(&self, post_id: Id, status: Option<CommentStatus>) -> RepoResult<Vec<Comment>> {
            sqlx::query_as::<_, Comment>(
                "SELECT id, post_id, author_id, body, parent_id, status, created_at \
                 FROM comments WHERE post_id = $1 AND ($2::comment_status IS NULL OR status = $2) \
                 ORDER BY created_at ASC",
            )
            .bind(post_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn set_comment_status(&self, id: Id, status: CommentStatus) -> RepoResult<Comment> {
            sqlx::query_as::<_, Comment>(
                "UPDATE comments SET status = $2 WHERE id = $1 \
                 RETURNING id, post_id, author_id, body, parent_id, status, created_at",
            )
            .bind(id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            // replies cascade via the parent_id FK
            let res = sqlx::query("DELETE FROM comments WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn set_comments_status(&self, ids: &[Id], status: CommentStatus) -> RepoResult<usize> {
            let res = sqlx::query("UPDATE comments SET status = $2 WHERE id = ANY($1)")
                .bind(ids)
                .bind(status)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(res.rows_affected() as usize)
        }

        async fn delete_comments(&self, ids: &[Id]) -> RepoResult<usize> {
            let res = sqlx::query("DELETE FROM comments WHERE id = ANY($1)")
                .bind(ids)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(res.rows_affected() as usize)
        }
    }

    #[async_trait]
    impl ReportRepo for PgRepo {
        async fn create_report(&self, new: CreateReport) -> RepoResult<Report> {
            // (reporter_id, post_id) carries a unique index; duplicates map to Conflict
            sqlx::query_as::<_, Report>(&format!(
                "INSERT INTO reports (reporter_id, reported_user_id, post_id, reason, description) \
                 VALUES ($1,$2,$3,$4,$5) RETURNING {REPORT_COLS}"
            ))
            .bind(new.reporter_id)
            .bind(new.reported_user_id)
            .bind(new.post_id)
            .bind(new.reason)
            .bind(&new.description)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn get_report(&self, id: Id) -> RepoResult<Report> {
            sqlx::query_as::<_, Report>(&format!("SELECT {REPORT_COLS} FROM reports WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?
                .ok_or(RepoError::NotFound)
        }

        async fn update_report(&self, report: Report) -> RepoResult<Report> {
            sqlx::query_as::<_, Report>(&format!(
                "UPDATE reports SET status=$2, admin_action=$3, admin_notes=$4, reviewed_by=$5, \
                 reviewed_at=$6 WHERE id=$1 RETURNING {REPORT_COLS}"
            ))
            .bind(report.id)
            .bind(report.status)
            .bind(report.admin_action)
            .bind(&report.admin_notes)
            .bind(report.reviewed_by)
            .bind(report.reviewed_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }

        async fn list_reports(&self, q: ReportQuery) -> RepoResult<(Vec<Report>, i64)> {
            let per_page = q.per_page.clamp(1, 100);
            let offset = (q.page.max(1) - 1) * per_page;
            let items = sqlx::query_as::<_, Report>(&format!(
                "SELECT {REPORT_COLS} FROM reports WHERE \
                 ($1::report_status IS NULL OR status = $1) AND \
                 ($2::report_reason IS NULL OR reason = $2) AND \
                 ($3::text IS NULL OR description ILIKE '%' || $3 || '%') \
                 ORDER BY created_at DESC LIMIT $4 OFFSET $5"
            ))
            .bind(q.status)
            .bind(q.reason)
            .bind(&q.search)
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            let total: (i64,) = sqlx::query_as(
                "SELECT count(*) FROM reports WHERE \
                 ($1::report_status IS NULL OR status = $1) AND \
                 ($2::report_reason IS NULL OR reason = $2) AND \
                 ($3::text IS NULL OR description ILIKE '%' || $3 || '%')",
            )
            .bind(q.status)
            .bind(q.reason)
            .bind(&q.search)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            Ok((items, total.0))
        }

        async fn report_stats(&self) -> RepoResult<ReportStats> {
            let by_status: Vec<(ReportStatus, i64)> =
                sqlx::query_as("SELECT status, count(*) FROM reports GROUP BY status")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_err)?;
            let by_reason: Vec<(ReportReason, i64)> =
                sqlx::query_as("SELECT reason, count(*) FROM reports GROUP BY reason")
                    .fetch_all(&self.pool)
                    .await
                    .map_err(db_err)?;
            let pick = |st: ReportStatus| {
                by_status
                    .iter()
                    .find(|(s, _)| *s == st)
                    .map(|(_, n)| *n)
                    .unwrap_or(0)
            };
            Ok(ReportStats {
                total: by_status.iter().map(|(_, n)| n).sum(),
                pending: pick(ReportStatus::Pending),
                reviewed: pick(ReportStatus::Reviewed),
                resolved: pick(ReportStatus::Resolved),
                dismissed: pick(ReportStatus::Dismissed),
                by_reason: by_reason
                    .into_iter()
                    .map(|(reason, count)| ReasonCount { reason, count })
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl NotificationRepo for PgRepo {
        async fn create_notification(&self, new: CreateNotification) -> RepoResult<Notification> {
            sqlx::query_as::<_, Notification>(
                "INSERT INTO notifications (user_id, kind, title, message, data) \
                 VALUES ($1,$2,$3,$4,$5) \
                 RETURNING id, user_id, kind, title, message, data, read_at, created_at",
            )
            .bind(new.user_id)
            .bind(&new.kind)
            .bind(&new.title)
            .bind(&new.message)
            .bind(&new.data)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn list_notifications(&self, user_id: Id) -> RepoResult<Vec<Notification>> {
            sqlx::query_as::<_, Notification>(
                "SELECT id, user_id, kind, title, message, data, read_at, created_at \
                 FROM notifications WHERE user_id = $1 ORDER BY created_at DESC",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn mark_notification_read(&self, id: Id, user_id: Id) -> RepoResult<Notification> {
            sqlx::query_as::<_, Notification>(
                "UPDATE notifications SET read_at = COALESCE(read_at, now()) \
                 WHERE id = $1 AND user_id = $2 \
                 RETURNING id, user_id, kind, title, message, data, read_at, created_at",
            )
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(RepoError::NotFound)
        }
    }

    #[async_trait]
    impl AuditRepo for PgRepo {
        async fn append_audit(&self, new: CreateAudit) -> RepoResult<AuditLogEntry> {
            sqlx::query_as::<_, AuditLogEntry>(
                "INSERT INTO audit_log (admin_id, action, target_type, target_id, metadata) \
                 VALUES ($1,$2,$3,$4,$5) \
                 RETURNING id, admin_id, action, target_type, target_id, metadata, created_at",
            )
            .bind(new.admin_id)
            .bind(&new.action)
            .bind(&new.target_type)
            .bind(new.target_id)
            .bind(&new.metadata)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
        }

        async fn list_audit(&self, q: AuditQuery) -> RepoResult<(Vec<AuditLogEntry>, i64)> {
            let limit = q.limit.unwrap_or(50).clamp(1, 500);
            let items = sqlx::query_as::<_, AuditLogEntry>(
                "SELECT id, admin_id, action, target_type, target_id, metadata, created_at \
                 FROM audit_log WHERE \
                 ($1::text IS NULL OR action = $1) AND ($2::text IS NULL OR target_type = $2) \
                 ORDER BY id DESC LIMIT $3",
            )
            .bind(&q.action)
            .bind(&q.target_type)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            let total: (i64,) = sqlx::query_as(
                "SELECT count(*) FROM audit_log WHERE \
                 ($1::text IS NULL OR action = $1) AND ($2::text IS NULL OR target_type = $2)",
            )
            .bind(&q.action)
            .bind(&q.target_type)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
            Ok((items, total.0))
        }
    }
}
