//! Router Module Index
//!
//! Routes are grouped by resource. Access control is not applied per router:
//! each handler names its own `Policy` and evaluates it against the request's
//! `RequestContext`, so a resource can mix open reads with restricted writes on
//! the same path.

/// Signup and token exchange. Open to everyone.
pub mod auth;

/// Categories, genres and titles.
pub mod catalog;

/// Reviews and their comments.
pub mod community;

/// Account administration and self-service.
pub mod users;

use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Everything served under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(auth::auth_routes())
        .merge(catalog::catalog_routes())
        .merge(community::community_routes())
        .merge(users::user_routes())
}

/// Unversioned operational endpoints.
pub fn system_routes() -> Router<AppState> {
    // GET /health
    // Liveness probe for monitoring and load balancers.
    Router::new().route("/health", get(handlers::health))
}
