use crate::{
    AppState,
    handlers::{comments, reviews},
};
use axum::{Router, routing::get};

/// Community Router Module
///
/// Reviews nest under titles and comments under reviews. Anyone may read;
/// authenticated users may post; edits and deletions are limited to the author,
/// moderators and admins (`AuthorModeratorAdmin`).
pub fn community_routes() -> Router<AppState> {
    Router::new()
        // GET/POST /titles/{title_id}/reviews
        // One review per user and title.
        .route(
            "/titles/{title_id}/reviews",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        // GET/PATCH/DELETE /titles/{title_id}/reviews/{review_id}
        .route(
            "/titles/{title_id}/reviews/{review_id}",
            get(reviews::get_review)
                .patch(reviews::update_review)
                .delete(reviews::delete_review),
        )
        // GET/POST /titles/{title_id}/reviews/{review_id}/comments
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        // GET/PATCH/DELETE /titles/{title_id}/reviews/{review_id}/comments/{comment_id}
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
            get(comments::get_comment)
                .patch(comments::update_comment)
                .delete(comments::delete_comment),
        )
}
