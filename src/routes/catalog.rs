use crate::{
    AppState,
    handlers::{taxonomy, titles},
};
use axum::{
    Router,
    routing::{delete, get},
};

/// Catalog Router Module
///
/// Read access is public; every write requires an admin (`ReadOnlyOrAdmin`).
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /categories?search=
        .route(
            "/categories",
            get(taxonomy::list_categories).post(taxonomy::create_category),
        )
        // DELETE /categories/{slug}
        // Titles in the category lose their category but are kept.
        .route("/categories/{slug}", delete(taxonomy::delete_category))
        // GET/POST /genres?search=
        .route(
            "/genres",
            get(taxonomy::list_genres).post(taxonomy::create_genre),
        )
        // DELETE /genres/{slug}
        .route("/genres/{slug}", delete(taxonomy::delete_genre))
        // GET/POST /titles?category=&genre=&name=&year=
        .route("/titles", get(titles::list_titles).post(titles::create_title))
        // GET/PATCH/DELETE /titles/{title_id}
        // Deleting a title removes its reviews and their comments.
        .route(
            "/titles/{title_id}",
            get(titles::get_title)
                .patch(titles::update_title)
                .delete(titles::delete_title),
        )
}
