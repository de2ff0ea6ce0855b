use axum::{Json, extract::State};

use crate::{
    AppState,
    auth::{TokenType, decode_token, generate_confirmation_code, issue_token_pair},
    error::{AppError, AppResult},
    mailer::Email,
    models::{RefreshRequest, SignupRequest, TokenPair, TokenRequest},
    validation::JsonPayload,
};

/// signup
///
/// [Open] Registers `username`/`email` (or finds the existing account holding
/// both) and mails it a fresh confirmation code. Any previously issued code is
/// replaced. Responds with the submitted fields.
///
/// An account holding only one of the two is rejected with a field error on the
/// field that clashes.
#[utoipa::path(
    post,
    path = "/auth/signup",
    tag = "auth",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Code sent", body = SignupRequest),
        (status = 400, description = "Invalid or clashing username/email")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    payload: JsonPayload<SignupRequest>,
) -> AppResult<Json<SignupRequest>> {
    let payload = payload.into_valid()?;
    if let Some(existing) = state.repo.get_user_by_username(&payload.username).await? {
        if existing.email != payload.email {
            return Err(AppError::validation(
                "email",
                "does not match the email registered for this username",
            ));
        }
    }

    let user = state
        .repo
        .get_or_create_user(&payload.username, &payload.email)
        .await
        .map_err(|e| match e {
            AppError::Conflict(_) => {
                AppError::validation("email", "a user with this email already exists")
            }
            other => other,
        })?;

    let code = generate_confirmation_code();
    state.repo.set_confirmation_code(user.id, Some(&code)).await?;

    let email = Email::confirmation(&state.config.mail_from, &user.email, &user.username, &code);
    state.mailer.send(&email).await?;

    tracing::info!(user_id = user.id, username = %user.username, "confirmation code issued");
    Ok(Json(payload))
}

/// obtain_token
///
/// [Open] Exchanges a confirmation code for an access/refresh pair. The code is
/// single-use: it is cleared as soon as the exchange succeeds.
#[utoipa::path(
    post,
    path = "/auth/token",
    tag = "auth",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 400, description = "Missing or wrong confirmation code"),
        (status = 404, description = "Unknown username")
    )
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    payload: JsonPayload<TokenRequest>,
) -> AppResult<Json<TokenPair>> {
    let payload = payload.into_valid()?;
    let user = state
        .repo
        .get_user_by_username(&payload.username)
        .await?
        .ok_or(AppError::NotFound)?;

    // A missing code never matches.
    if user.confirmation_code.as_deref() != Some(payload.confirmation_code.as_str()) {
        tracing::debug!(user_id = user.id, "confirmation code mismatch");
        return Err(AppError::validation(
            "confirmation_code",
            "invalid confirmation code",
        ));
    }

    state.repo.set_confirmation_code(user.id, None).await?;
    let pair = issue_token_pair(user.id, &state.config)?;

    tracing::info!(user_id = user.id, "token pair issued");
    Ok(Json(pair))
}

/// refresh_token
///
/// [Open] Trades a valid refresh token for a new pair, provided its subject
/// still exists.
#[utoipa::path(
    post,
    path = "/auth/token/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token pair", body = TokenPair),
        (status = 401, description = "Invalid or expired refresh token")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    payload: JsonPayload<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let payload = payload.into_valid()?;
    let claims = decode_token(&payload.refresh, TokenType::Refresh, &state.config)?;
    let user = state
        .repo
        .get_user(claims.sub)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(issue_token_pair(user.id, &state.config)?))
}
