use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use super::{find_review, find_title};
use crate::{
    AppState,
    error::{AppResult, OptionExt},
    models::{CreateReviewRequest, Page, PageQuery, Review, UpdateReviewRequest},
    policy::{Policy, RequestContext},
    repository::duplicate_review,
    validation::JsonPayload,
};

/// list_reviews
///
/// [Public] Reviews of one title in the order they were written.
#[utoipa::path(
    get,
    path = "/titles/{title_id}/reviews",
    tag = "reviews",
    params(("title_id" = i64, Path, description = "Title id"), PageQuery),
    responses(
        (status = 200, description = "Reviews", body = Page<Review>),
        (status = 404, description = "Unknown title")
    )
)]
pub async fn list_reviews(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<Review>>> {
    Policy::AuthorModeratorAdmin.check_request(&ctx)?;
    find_title(state.repo.as_ref(), title_id).await?;
    let page = state
        .repo
        .list_reviews(title_id, query.pagination())
        .await?;
    Ok(Json(page))
}

/// create_review
///
/// [Authenticated] Reviews the title as the caller. One review per title and
/// author; a second attempt is a validation error.
#[utoipa::path(
    post,
    path = "/titles/{title_id}/reviews",
    tag = "reviews",
    params(("title_id" = i64, Path, description = "Title id")),
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Created", body = Review),
        (status = 400, description = "Invalid score or already reviewed"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Unknown title")
    )
)]
pub async fn create_review(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    payload: JsonPayload<CreateReviewRequest>,
) -> AppResult<(StatusCode, Json<Review>)> {
    Policy::AuthorModeratorAdmin.check_request(&ctx)?;
    let actor = ctx.require_actor()?;
    find_title(state.repo.as_ref(), title_id).await?;
    let payload = payload.into_valid()?;

    // The insert is authoritative; this only short-circuits the common case.
    if state.repo.has_review(title_id, actor.id).await? {
        return Err(duplicate_review());
    }

    let review = state
        .repo
        .create_review(title_id, actor.id, payload)
        .await?;
    tracing::info!(review_id = review.id, title_id, author_id = actor.id, "review created");
    Ok((StatusCode::CREATED, Json(review)))
}

#[utoipa::path(
    get,
    path = "/titles/{title_id}/reviews/{review_id}",
    tag = "reviews",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    responses(
        (status = 200, description = "Review", body = Review),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_review(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
) -> AppResult<Json<Review>> {
    Policy::AuthorModeratorAdmin.check_request(&ctx)?;
    let review = find_review(state.repo.as_ref(), title_id, review_id).await?;
    Policy::AuthorModeratorAdmin.check_object(&ctx, &review)?;
    Ok(Json(review))
}

/// update_review
///
/// [Author, moderator or admin] Partial update of text and score.
#[utoipa::path(
    patch,
    path = "/titles/{title_id}/reviews/{review_id}",
    tag = "reviews",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Updated", body = Review),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_review(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    payload: JsonPayload<UpdateReviewRequest>,
) -> AppResult<Json<Review>> {
    Policy::AuthorModeratorAdmin.check_request(&ctx)?;
    let review = find_review(state.repo.as_ref(), title_id, review_id).await?;
    Policy::AuthorModeratorAdmin.check_object(&ctx, &review)?;
    let payload = payload.into_valid()?;

    let updated = state
        .repo
        .update_review(review.id, payload)
        .await?
        .ok_or_not_found()?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/titles/{title_id}/reviews/{review_id}",
    tag = "reviews",
    params(
        ("title_id" = i64, Path, description = "Title id"),
        ("review_id" = i64, Path, description = "Review id")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_review(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    Policy::AuthorModeratorAdmin.check_request(&ctx)?;
    let review = find_review(state.repo.as_ref(), title_id, review_id).await?;
    Policy::AuthorModeratorAdmin.check_object(&ctx, &review)?;

    state.repo.delete_review(review.id).await?;
    tracing::info!(review_id, title_id, "review deleted");
    Ok(StatusCode::NO_CONTENT)
}
