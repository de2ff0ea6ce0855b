use crate::{AppState, handlers::auth};
use axum::{Router, routing::post};

/// Auth Router Module
///
/// The two-step passwordless login: signup mails a confirmation code, the code
/// is traded for a token pair, and the refresh half renews the pair.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/signup
        // Creates the account on first use; always issues and mails a new code.
        .route("/auth/signup", post(auth::signup))
        // POST /auth/token
        // Consumes the confirmation code.
        .route("/auth/token", post(auth::obtain_token))
        // POST /auth/token/refresh
        .route("/auth/token/refresh", post(auth::refresh_token))
}
