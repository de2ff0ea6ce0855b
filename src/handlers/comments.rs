use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use super::find_review;
use crate::{
    AppState,
    error::{AppResult, OptionExt},
    models::{Comment, CreateCommentRequest, Page, PageQuery, UpdateCommentRequest},
    policy::{Policy, RequestContext},
    validation::JsonPayload,
};

/// Path of a single comment: `/titles/{title_id}/reviews/{review_id}/comments/{comment_id}`.
type CommentPath = Path<(i64, i64, i64)>;

/// Loads a comment through its full path. The review must belong to the title
/// and the comment to the review, else 404.
async fn find_comment(
    state: &AppState,
    title_id: i64,
    review_id: i64,
    comment_id: i64,
) -> AppResult<Comment> {
    find_review(state.repo.as_ref(), title_id, review_id).await?;
    state
        .repo
        .get_comment(review_id, comment_id)
        .await?
        .ok_or_not_found()
}

/// list_comments
///
/// [Public] Comments on one review, newest first.
#[utoipa::path(
    get,
    path = "/titles/{title_id}/reviews/{review_id}/comments",
    tag = "comments",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Comments", body = Page<Comment>),
        (status = 404, description = "Unknown title or review")
    )
)]
pub async fn list_comments(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<Comment>>> {
    Policy::AuthorModeratorAdmin.check_request(&ctx)?;
    find_review(state.repo.as_ref(), title_id, review_id).await?;
    let page = state
        .repo
        .list_comments(review_id, query.pagination())
        .await?;
    Ok(Json(page))
}

/// create_comment
///
/// [Authenticated] Comments on the review as the caller.
#[utoipa::path(
    post,
    path = "/titles/{title_id}/reviews/{review_id}/comments",
    tag = "comments",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Created", body = Comment),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Unknown title or review")
    )
)]
pub async fn create_comment(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    payload: JsonPayload<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    Policy::AuthorModeratorAdmin.check_request(&ctx)?;
    let actor = ctx.require_actor()?;
    find_review(state.repo.as_ref(), title_id, review_id).await?;
    let payload = payload.into_valid()?;

    let comment = state
        .repo
        .create_comment(review_id, actor.id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[utoipa::path(
    get,
    path = "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    tag = "comments",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id"),
        ("comment_id" = i64, Path, description = "Comment id")
    ),
    responses(
        (status = 200, description = "Comment", body = Comment),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_comment(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): CommentPath,
) -> AppResult<Json<Comment>> {
    Policy::AuthorModeratorAdmin.check_request(&ctx)?;
    let comment = find_comment(&state, title_id, review_id, comment_id).await?;
    Policy::AuthorModeratorAdmin.check_object(&ctx, &comment)?;
    Ok(Json(comment))
}

#[utoipa::path(
    patch,
    path = "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    tag = "comments",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id"),
        ("comment_id" = i64, Path, description = "Comment id")
    ),
    request_body = UpdateCommentRequest,
    responses(
        (status = 200, description = "Updated", body = Comment),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_comment(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): CommentPath,
    payload: JsonPayload<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    Policy::AuthorModeratorAdmin.check_request(&ctx)?;
    let comment = find_comment(&state, title_id, review_id, comment_id).await?;
    Policy::AuthorModeratorAdmin.check_object(&ctx, &comment)?;
    let payload = payload.into_valid()?;

    let updated = state
        .repo
        .update_comment(comment.id, payload)
        .await?
        .ok_or_not_found()?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    tag = "comments",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id"),
        ("comment_id" = i64, Path, description = "Comment id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_comment(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((title_id, review_id, comment_id)): CommentPath,
) -> AppResult<StatusCode> {
    Policy::AuthorModeratorAdmin.check_request(&ctx)?;
    let comment = find_comment(&state, title_id, review_id, comment_id).await?;
    Policy::AuthorModeratorAdmin.check_object(&ctx, &comment)?;

    state.repo.delete_comment(comment.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
