use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    error::{AppResult, OptionExt},
    models::{CreateUserRequest, ListQuery, Page, UpdateUserRequest, UserProfile},
    policy::{Policy, RequestContext},
    validation::JsonPayload,
};

/// list_users
///
/// [Admin] All accounts ordered by username, optionally filtered by `?search=`.
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    params(ListQuery),
    responses(
        (status = 200, description = "Users", body = Page<UserProfile>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_users(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Page<UserProfile>>> {
    Policy::AdminOnly.check_request(&ctx)?;
    let page = state
        .repo
        .list_users(query.search.as_deref(), query.pagination())
        .await?;
    Ok(Json(page.map(UserProfile::from)))
}

/// create_user
///
/// [Admin] Provisions an account directly, with any role.
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserProfile),
        (status = 400, description = "Invalid payload"),
        (status = 409, description = "Username or email taken")
    )
)]
pub async fn create_user(
    ctx: RequestContext,
    State(state): State<AppState>,
    payload: JsonPayload<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    Policy::AdminOnly.check_request(&ctx)?;
    let payload = payload.into_valid()?;
    let user = state.repo.create_user(payload).await?;
    tracing::info!(user_id = user.id, role = %user.role, "user provisioned");
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    get,
    path = "/users/{username}",
    tag = "users",
    params(("username" = String, Path, description = "Account username")),
    responses(
        (status = 200, description = "User", body = UserProfile),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_user(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<UserProfile>> {
    Policy::AdminOnly.check_request(&ctx)?;
    let user = state
        .repo
        .get_user_by_username(&username)
        .await?
        .ok_or_not_found()?;
    Ok(Json(user.into()))
}

/// update_user
///
/// [Admin] Partial update, role included.
#[utoipa::path(
    patch,
    path = "/users/{username}",
    tag = "users",
    params(("username" = String, Path, description = "Account username")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 404, description = "Not found"),
        (status = 409, description = "Username or email taken")
    )
)]
pub async fn update_user(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(username): Path<String>,
    payload: JsonPayload<UpdateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    Policy::AdminOnly.check_request(&ctx)?;
    let user = state
        .repo
        .get_user_by_username(&username)
        .await?
        .ok_or_not_found()?;
    Policy::AdminOnly.check_object(&ctx, &user)?;
    let payload = payload.into_valid()?;

    let updated = state
        .repo
        .update_user(user.id, payload)
        .await?
        .ok_or_not_found()?;
    Ok(Json(updated.into()))
}

/// delete_user
///
/// [Admin] Removes the account along with its reviews and comments.
#[utoipa::path(
    delete,
    path = "/users/{username}",
    tag = "users",
    params(("username" = String, Path, description = "Account username")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_user(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<StatusCode> {
    Policy::AdminOnly.check_request(&ctx)?;
    let user = state
        .repo
        .get_user_by_username(&username)
        .await?
        .ok_or_not_found()?;

    state.repo.delete_user(user.id).await?;
    tracing::info!(user_id = user.id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// get_me
///
/// [Authenticated] The caller's own profile.
#[utoipa::path(
    get,
    path = "/users/me",
    tag = "users",
    responses(
        (status = 200, description = "Own profile", body = UserProfile),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn get_me(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> AppResult<Json<UserProfile>> {
    Policy::AuthorOrAdmin.check_request(&ctx)?;
    let actor = ctx.require_actor()?;
    let user = state.repo.get_user(actor.id).await?.ok_or_not_found()?;
    Policy::AuthorOrAdmin.check_object(&ctx, &user)?;
    Ok(Json(user.into()))
}

/// update_me
///
/// [Authenticated] Self-service profile edit. `role` is read-only here and is
/// dropped from the payload without an error.
#[utoipa::path(
    patch,
    path = "/users/me",
    tag = "users",
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 401, description = "Not authenticated"),
        (status = 409, description = "Username or email taken")
    )
)]
pub async fn update_me(
    ctx: RequestContext,
    State(state): State<AppState>,
    payload: JsonPayload<UpdateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    Policy::AuthorOrAdmin.check_request(&ctx)?;
    let actor = ctx.require_actor()?;
    let user = state.repo.get_user(actor.id).await?.ok_or_not_found()?;
    Policy::AuthorOrAdmin.check_object(&ctx, &user)?;

    let mut payload = payload.into_valid()?;
    payload.role = None;
    let updated = state
        .repo
        .update_user(user.id, payload)
        .await?
        .ok_or_not_found()?;
    Ok(Json(updated.into()))
}
