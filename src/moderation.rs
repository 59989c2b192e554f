//! Post lifecycle state machine and comment moderation. Every operation takes
//! the acting user id explicitly; role checks happen at the route layer, actor
//! and ownership checks happen here.

use chrono::Utc;
use serde_json::json;

use crate::audit;
use crate::error::ApiError;
use crate::models::*;
use crate::repo::{CreateComment, CreatePost, Repo, RepoError};

/// Fetch the actor and reject banned or unknown users.
pub async fn ensure_active_user(repo: &dyn Repo, id: Id) -> Result<User, ApiError> {
    let user = repo.get_user(id).await.map_err(|e| match e {
        RepoError::NotFound => ApiError::Forbidden,
        other => other.into(),
    })?;
    if user.status == UserStatus::Banned {
        return Err(ApiError::Forbidden);
    }
    Ok(user)
}

pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut prev_dash = true; // suppress leading dash
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            prev_dash = false;
        } else if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("post");
    }
    out
}

/// Probe for collisions, appending an incrementing numeric suffix.
pub async fn unique_slug(repo: &dyn Repo, title: &str) -> Result<String, ApiError> {
    let base = slugify(title);
    if !repo.slug_exists(&base).await? {
        return Ok(base);
    }
    let mut n = 2u32;
    loop {
        let candidate = format!("{base}-{n}");
        if !repo.slug_exists(&candidate).await? {
            return Ok(candidate);
        }
        n += 1;
    }
}

pub fn derive_excerpt(body: &str) -> String {
    let mut s: String = body.chars().take(200).collect();
    if body.chars().count() > 200 {
        s.push('…');
    }
    s
}

pub async fn create_post(repo: &dyn Repo, actor: Id, new: NewPost) -> Result<Post, ApiError> {
    ensure_active_user(repo, actor).await?;
    if new.title.trim().is_empty() {
        return Err(ApiError::Validation("title must not be empty".into()));
    }
    if new.body.trim().is_empty() {
        return Err(ApiError::Validation("body must not be empty".into()));
    }
    let status = new.status.unwrap_or(PostStatus::Draft);
    if !matches!(status, PostStatus::Draft | PostStatus::Review) {
        return Err(ApiError::Validation(
            "a post starts in draft or review".into(),
        ));
    }
    if let Some(at) = new.scheduled_at {
        if at <= Utc::now() {
            return Err(ApiError::Validation("scheduled_at must be in the future".into()));
        }
    }
    let slug = unique_slug(repo, &new.title).await?;
    let excerpt = match new.excerpt.filter(|e| !e.trim().is_empty()) {
        Some(e) => e,
        None => derive_excerpt(&new.body),
    };
    let post = repo
        .create_post(CreatePost {
            owner_id: actor,
            title: new.title,
            slug,
            body: new.body,
            excerpt,
            category: new.category,
            tags: new.tags,
            status,
            scheduled_at: new.scheduled_at,
        })
        .await?;
    Ok(post)
}

/// draft → review, owner only.
pub async fn submit(repo: &dyn Repo, post_id: Id, actor: Id) -> Result<Post, ApiError> {
    let mut post = repo.get_post(post_id).await?;
    if post.owner_id != actor {
        return Err(ApiError::Forbidden);
    }
    if post.status != PostStatus::Draft {
        return Err(ApiError::InvalidTransition(format!(
            "cannot submit a {} post",
            post.status.as_str()
        )));
    }
    post.status = PostStatus::Review;
    Ok(repo.update_post(post).await?)
}

/// review → published, or review → scheduled when a future publish time is set.
pub async fn approve(repo: &dyn Repo, post_id: Id, admin_id: Id) -> Result<Post, ApiError> {
    let mut post = repo.get_post(post_id).await?;
    if post.status != PostStatus::Review {
        return Err(ApiError::InvalidTransition(format!(
            "cannot approve a {} post",
            post.status.as_str()
        )));
    }
    let before = post.status;
    let now = Utc::now();
    let action = match post.scheduled_at {
        Some(at) if at > now => {
            post.status = PostStatus::Scheduled;
            post.published_at = None;
            audit::actions::SCHEDULE_POST
        }
        _ => {
            post.status = PostStatus::Published;
            post.published_at = Some(now);
            post.scheduled_at = None;
            post.rejection_reason = None;
            metrics::counter!("quill_posts_published_total", 1);
            audit::actions::PUBLISH_POST
        }
    };
    let post = repo.update_post(post).await?;
    audit::record(
        repo,
        Some(admin_id),
        action,
        audit::targets::POST,
        Some(post.id),
        json!({ "from": before.as_str(), "to": post.status.as_str() }),
    )
    .await;
    Ok(post)
}

/// review → archived with a mandatory reason.
pub async fn reject(
    repo: &dyn Repo,
    post_id: Id,
    admin_id: Id,
    reason: &str,
) -> Result<Post, ApiError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(ApiError::Validation("rejection_reason must not be empty".into()));
    }
    let mut post = repo.get_post(post_id).await?;
    if post.status != PostStatus::Review {
        return Err(ApiError::InvalidTransition(format!(
            "cannot reject a {} post",
            post.status.as_str()
        )));
    }
    post.status = PostStatus::Archived;
    post.published_at = None;
    post.scheduled_at = None;
    post.rejection_reason = Some(reason.to_string());
    let post = repo.update_post(post).await?;
    audit::record(
        repo,
        Some(admin_id),
        audit::actions::REJECT_POST,
        audit::targets::POST,
        Some(post.id),
        json!({ "reason": reason }),
    )
    .await;
    Ok(post)
}

/// Owner edit. Allowed only while the post is still in the owner's hands
/// (draft or review); anything later is admin territory.
pub async fn edit(
    repo: &dyn Repo,
    post_id: Id,
    actor: Id,
    upd: UpdatePost,
) -> Result<Post, ApiError> {
    let mut post = repo.get_post(post_id).await?;
    if post.owner_id != actor {
        return Err(ApiError::Forbidden);
    }
    if !matches!(post.status, PostStatus::Draft | PostStatus::Review) {
        return Err(ApiError::InvalidTransition(format!(
            "cannot edit a {} post",
            post.status.as_str()
        )));
    }
    if let Some(at) = upd.scheduled_at {
        if at <= Utc::now() {
            return Err(ApiError::Validation("scheduled_at must be in the future".into()));
        }
        post.scheduled_at = Some(at);
    }
    if let Some(title) = upd.title {
        // Slugs are stable once persisted; only a post that somehow lost its
        // slug gets a fresh one on retitle.
        if title != post.title && post.slug.is_empty() {
            post.slug = unique_slug(repo, &title).await?;
        }
        post.title = title;
    }
    if let Some(body) = upd.body {
        post.body = body;
    }
    if let Some(excerpt) = upd.excerpt {
        post.excerpt = excerpt;
    }
    if let Some(category) = upd.category {
        post.category = Some(category);
    }
    if let Some(tags) = upd.tags {
        post.tags = tags;
    }
    if post.excerpt.trim().is_empty() {
        post.excerpt = derive_excerpt(&post.body);
    }
    Ok(repo.update_post(post).await?)
}

/// Admin general edit, including status moves. Field invariants are restored
/// after the patch: published_at iff published, rejection_reason only on
/// archived posts, scheduled posts need a publish time.
pub async fn admin_update(
    repo: &dyn Repo,
    post_id: Id,
    admin_id: Id,
    upd: AdminUpdatePost,
) -> Result<Post, ApiError> {
    let mut post = repo.get_post(post_id).await?;
    let before = post.status;
    if let Some(title) = upd.title {
        post.title = title;
    }
    if let Some(body) = upd.body {
        post.body = body;
    }
    if let Some(excerpt) = upd.excerpt {
        post.excerpt = excerpt;
    }
    if let Some(category) = upd.category {
        post.category = Some(category);
    }
    if let Some(tags) = upd.tags {
        post.tags = tags;
    }
    if let Some(at) = upd.scheduled_at {
        if at <= Utc::now() {
            return Err(ApiError::Validation("scheduled_at must be in the future".into()));
        }
        post.scheduled_at = Some(at);
    }
    if let Some(reason) = upd.rejection_reason {
        post.rejection_reason = Some(reason);
    }
    if let Some(status) = upd.status {
        post.status = status;
        match status {
            PostStatus::Published => {
                if post.published_at.is_none() {
                    post.published_at = Some(Utc::now());
                }
                post.scheduled_at = None;
            }
            PostStatus::Scheduled => {
                match post.scheduled_at {
                    Some(at) if at > Utc::now() => {}
                    Some(_) => {
                        return Err(ApiError::Validation(
                            "scheduled_at must be in the future".into(),
                        ))
                    }
                    None => {
                        return Err(ApiError::Validation(
                            "scheduled status requires scheduled_at".into(),
                        ))
                    }
                }
                post.published_at = None;
            }
            _ => {
                post.published_at = None;
            }
        }
    }
    if post.status != PostStatus::Archived {
        post.rejection_reason = None;
    }
    let post = repo.update_post(post).await?;
    audit::record(
        repo,
        Some(admin_id),
        audit::actions::UPDATE_POST,
        audit::targets::POST,
        Some(post.id),
        json!({ "from": before.as_str(), "to": post.status.as_str() }),
    )
    .await;
    Ok(post)
}

/// published → draft.
pub async fn unpublish(repo: &dyn Repo, post_id: Id, admin_id: Id) -> Result<Post, ApiError> {
    let mut post = repo.get_post(post_id).await?;
    if post.status != PostStatus::Published {
        return Err(ApiError::InvalidTransition(format!(
            "cannot unpublish a {} post",
            post.status.as_str()
        )));
    }
    post.status = PostStatus::Draft;
    post.published_at = None;
    let post = repo.update_post(post).await?;
    audit::record(
        repo,
        Some(admin_id),
        audit::actions::UNPUBLISH_POST,
        audit::targets::POST,
        Some(post.id),
        json!({ "from": "published", "to": "draft" }),
    )
    .await;
    Ok(post)
}

pub async fn delete_post(repo: &dyn Repo, post_id: Id, actor: Id) -> Result<(), ApiError> {
    let post = repo.get_post(post_id).await?;
    if post.owner_id != actor {
        return Err(ApiError::Forbidden);
    }
    repo.delete_post(post_id).await?;
    Ok(())
}

// ---- comments -----------------------------------------------------------

pub async fn create_comment(
    repo: &dyn Repo,
    post_id: Id,
    actor: Id,
    new: NewComment,
    auto_approve: bool,
) -> Result<Comment, ApiError> {
    ensure_active_user(repo, actor).await?;
    if new.body.trim().is_empty() {
        return Err(ApiError::Validation("comment body must not be empty".into()));
    }
    let post = repo.get_post(post_id).await?;
    if post.status != PostStatus::Published {
        return Err(ApiError::NotFound);
    }
    if let Some(parent_id) = new.parent_id {
        // Replies are an author feature: only the post owner may answer a
        // commenter, and only one level deep.
        if actor != post.owner_id {
            return Err(ApiError::Forbidden);
        }
        let parent = repo.get_comment(parent_id).await?;
        if parent.post_id != post.id {
            return Err(ApiError::Validation("parent comment belongs to another post".into()));
        }
        if parent.parent_id.is_some() {
            return Err(ApiError::Validation("replies cannot be nested".into()));
        }
    }
    let status = if auto_approve {
        CommentStatus::Approved
    } else {
        CommentStatus::Pending
    };
    let comment = repo
        .create_comment(CreateComment {
            post_id: post.id,
            author_id: actor,
            body: new.body,
            parent_id: new.parent_id,
            status,
        })
        .await?;
    Ok(comment)
}

/// Admin single-comment transition; writes one audit entry.
pub async fn moderate_comment(
    repo: &dyn Repo,
    comment_id: Id,
    admin_id: Id,
    status: CommentStatus,
) -> Result<Comment, ApiError> {
    let action = match status {
        CommentStatus::Approved => audit::actions::APPROVE_COMMENT,
        CommentStatus::Rejected => audit::actions::REJECT_COMMENT,
        CommentStatus::Hidden => audit::actions::HIDE_COMMENT,
        _ => return Err(ApiError::Validation("unsupported moderation status".into())),
    };
    let comment = repo.set_comment_status(comment_id, status).await?;
    audit::record(
        repo,
        Some(admin_id),
        action,
        audit::targets::COMMENT,
        Some(comment.id),
        json!({ "status": status.as_str() }),
    )
    .await;
    Ok(comment)
}

/// Delete by the author or an admin; replies go with the comment.
pub async fn delete_comment(
    repo: &dyn Repo,
    comment_id: Id,
    actor: Id,
    is_admin: bool,
) -> Result<(), ApiError> {
    let comment = repo.get_comment(comment_id).await?;
    if !is_admin && comment.author_id != actor {
        return Err(ApiError::Forbidden);
    }
    repo.delete_comment(comment_id).await?;
    if is_admin {
        audit::record(
            repo,
            Some(actor),
            audit::actions::DELETE_COMMENT,
            audit::targets::COMMENT,
            Some(comment_id),
            json!({ "post_id": comment.post_id }),
        )
        .await;
    }
    Ok(())
}

/// Set-wise bulk action; one audit entry summarizing the batch.
pub async fn bulk_comments(
    repo: &dyn Repo,
    admin_id: Id,
    req: BulkCommentRequest,
) -> Result<usize, ApiError> {
    if req.ids.is_empty() {
        return Err(ApiError::Validation("ids must not be empty".into()));
    }
    let affected = match req.action {
        CommentBulkAction::Approve => {
            repo.set_comments_status(&req.ids, CommentStatus::Approved).await?
        }
        CommentBulkAction::Hide => {
            repo.set_comments_status(&req.ids, CommentStatus::Hidden).await?
        }
        CommentBulkAction::Delete => repo.delete_comments(&req.ids).await?,
    };
    audit::record(
        repo,
        Some(admin_id),
        audit::actions::BULK_COMMENT_ACTION,
        audit::targets::COMMENT,
        None,
        json!({ "action": req.action.as_str(), "ids": req.ids, "affected": affected }),
    )
    .await;
    Ok(affected)
}
