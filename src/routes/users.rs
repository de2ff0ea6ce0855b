use crate::{AppState, handlers::users};
use axum::{Router, routing::get};

/// Users Router Module
///
/// `/users/me` is matched before `/users/{username}`, which is why "me" can
/// never be a username.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /users?search=   (admin)
        .route("/users", get(users::list_users).post(users::create_user))
        // GET/PATCH /users/me   (any authenticated user; `role` is ignored on PATCH)
        .route("/users/me", get(users::get_me).patch(users::update_me))
        // GET/PATCH/DELETE /users/{username}   (admin)
        .route(
            "/users/{username}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
}
