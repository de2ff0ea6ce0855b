//! Categories and genres. Both are served by the same three operations,
//! parameterized by [`TaxonKind`].

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    error::{AppError, AppResult},
    models::{CreateTaxonRequest, ListQuery, Page, Taxon, TaxonKind},
    policy::{Policy, RequestContext},
    validation::JsonPayload,
};

async fn list(
    kind: TaxonKind,
    ctx: &RequestContext,
    state: &AppState,
    query: &ListQuery,
) -> AppResult<Json<Page<Taxon>>> {
    Policy::ReadOnlyOrAdmin.check_request(ctx)?;
    let page = state
        .repo
        .list_taxa(kind, query.search.as_deref(), query.pagination())
        .await?;
    Ok(Json(page))
}

async fn create(
    kind: TaxonKind,
    ctx: &RequestContext,
    state: &AppState,
    payload: JsonPayload<CreateTaxonRequest>,
) -> AppResult<(StatusCode, Json<Taxon>)> {
    Policy::ReadOnlyOrAdmin.check_request(ctx)?;
    let payload = payload.into_valid()?;
    let taxon = state.repo.create_taxon(kind, payload).await?;
    tracing::info!(kind = kind.label(), slug = %taxon.slug, "taxon created");
    Ok((StatusCode::CREATED, Json(taxon)))
}

async fn delete(
    kind: TaxonKind,
    ctx: &RequestContext,
    state: &AppState,
    slug: &str,
) -> AppResult<StatusCode> {
    Policy::ReadOnlyOrAdmin.check_request(ctx)?;
    if !state.repo.delete_taxon(kind, slug).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(kind = kind.label(), slug, "taxon deleted");
    Ok(StatusCode::NO_CONTENT)
}

// --- Categories ---

#[utoipa::path(
    get,
    path = "/categories",
    tag = "catalog",
    params(ListQuery),
    responses((status = 200, description = "Categories", body = Page<Taxon>))
)]
pub async fn list_categories(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<Taxon>>> {
    list(TaxonKind::Category, &ctx, &state, &query).await
}

/// create_category
///
/// [Admin] Adds a category. Name and slug must both be unused.
#[utoipa::path(
    post,
    path = "/categories",
    tag = "catalog",
    request_body = CreateTaxonRequest,
    responses(
        (status = 201, description = "Created", body = Taxon),
        (status = 400, description = "Invalid name or slug"),
        (status = 409, description = "Name or slug taken")
    )
)]
pub async fn create_category(
    ctx: RequestContext,
    State(state): State<AppState>,
    payload: JsonPayload<CreateTaxonRequest>,
) -> AppResult<(StatusCode, Json<Taxon>)> {
    create(TaxonKind::Category, &ctx, &state, payload).await
}

/// delete_category
///
/// [Admin] Titles in the category stay, with no category.
#[utoipa::path(
    delete,
    path = "/categories/{slug}",
    tag = "catalog",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_category(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<StatusCode> {
    delete(TaxonKind::Category, &ctx, &state, &slug).await
}

// --- Genres ---

#[utoipa::path(
    get,
    path = "/genres",
    tag = "catalog",
    params(ListQuery),
    responses((status = 200, description = "Genres", body = Page<Taxon>))
)]
pub async fn list_genres(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<Taxon>>> {
    list(TaxonKind::Genre, &ctx, &state, &query).await
}

#[utoipa::path(
    post,
    path = "/genres",
    tag = "catalog",
    request_body = CreateTaxonRequest,
    responses(
        (status = 201, description = "Created", body = Taxon),
        (status = 400, description = "Invalid name or slug"),
        (status = 409, description = "Name or slug taken")
    )
)]
pub async fn create_genre(
    ctx: RequestContext,
    State(state): State<AppState>,
    payload: JsonPayload<CreateTaxonRequest>,
) -> AppResult<(StatusCode, Json<Taxon>)> {
    create(TaxonKind::Genre, &ctx, &state, payload).await
}

/// delete_genre
///
/// [Admin] The genre is detached from every title that carried it.
#[utoipa::path(
    delete,
    path = "/genres/{slug}",
    tag = "catalog",
    params(("slug" = String, Path, description = "Genre slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_genre(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<StatusCode> {
    delete(TaxonKind::Genre, &ctx, &state, &slug).await
}
