use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use super::{find_title, today};
use crate::{
    AppState,
    error::{AppError, AppResult, OptionExt},
    models::{CreateTitleRequest, Page, Title, TitleFilter, UpdateTitleRequest},
    policy::{Policy, RequestContext},
    validation::{JsonPayload, validate_title_refs, validate_title_year},
};

/// list_titles
///
/// [Public] Titles, newest first, filterable by category slug, genre slug,
/// name substring and year.
#[utoipa::path(
    get,
    path = "/titles",
    tag = "catalog",
    params(TitleFilter),
    responses((status = 200, description = "Titles", body = Page<Title>))
)]
pub async fn list_titles(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(filter): Query<TitleFilter>,
) -> AppResult<Json<Page<Title>>> {
    Policy::ReadOnlyOrAdmin.check_request(&ctx)?;
    Ok(Json(state.repo.list_titles(&filter).await?))
}

#[utoipa::path(
    get,
    path = "/titles/{title_id}",
    tag = "catalog",
    params(("title_id" = i64, Path, description = "Title id")),
    responses(
        (status = 200, description = "Title", body = Title),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_title(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
) -> AppResult<Json<Title>> {
    Policy::ReadOnlyOrAdmin.check_request(&ctx)?;
    Ok(Json(find_title(state.repo.as_ref(), title_id).await?))
}

/// create_title
///
/// [Admin] Genres and category are given by slug and must exist. The year may
/// not lie in the future.
#[utoipa::path(
    post,
    path = "/titles",
    tag = "catalog",
    request_body = CreateTitleRequest,
    responses(
        (status = 201, description = "Created", body = Title),
        (status = 400, description = "Invalid payload or unknown genre/category"),
        (status = 409, description = "Name taken")
    )
)]
pub async fn create_title(
    ctx: RequestContext,
    State(state): State<AppState>,
    payload: JsonPayload<CreateTitleRequest>,
) -> AppResult<(StatusCode, Json<Title>)> {
    Policy::ReadOnlyOrAdmin.check_request(&ctx)?;
    let payload = payload.into_valid()?;
    validate_title_year(payload.year, today())?;
    validate_title_refs(
        state.repo.as_ref(),
        Some(payload.genre.as_slice()),
        payload.category.as_deref(),
    )
    .await?;

    let title = state.repo.create_title(payload).await?;
    tracing::info!(title_id = title.id, name = %title.name, "title created");
    Ok((StatusCode::CREATED, Json(title)))
}

/// update_title
///
/// [Admin] Partial update. A `genre` list, when present, replaces the current set.
#[utoipa::path(
    patch,
    path = "/titles/{title_id}",
    tag = "catalog",
    params(("title_id" = i64, Path, description = "Title id")),
    request_body = UpdateTitleRequest,
    responses(
        (status = 200, description = "Updated", body = Title),
        (status = 400, description = "Invalid payload or unknown genre/category"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_title(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    payload: JsonPayload<UpdateTitleRequest>,
) -> AppResult<Json<Title>> {
    Policy::ReadOnlyOrAdmin.check_request(&ctx)?;
    find_title(state.repo.as_ref(), title_id).await?;

    let payload = payload.into_valid()?;
    validate_title_year(payload.year, today())?;
    validate_title_refs(
        state.repo.as_ref(),
        payload.genre.as_deref(),
        payload.category.as_deref(),
    )
    .await?;

    let title = state
        .repo
        .update_title(title_id, payload)
        .await?
        .ok_or_not_found()?;
    Ok(Json(title))
}

/// delete_title
///
/// [Admin] Removes the title with all of its reviews and their comments.
#[utoipa::path(
    delete,
    path = "/titles/{title_id}",
    tag = "catalog",
    params(("title_id" = i64, Path, description = "Title id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_title(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
) -> AppResult<StatusCode> {
    Policy::ReadOnlyOrAdmin.check_request(&ctx)?;
    if !state.repo.delete_title(title_id).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(title_id, "title deleted");
    Ok(StatusCode::NO_CONTENT)
}
