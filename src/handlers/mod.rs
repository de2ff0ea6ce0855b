//! HTTP handlers, one module per resource.
//!
//! Every handler that touches a protected resource follows the same order:
//! request-level policy check, lookup of the target (404), object-level policy
//! check, then the operation itself.

pub mod auth;
pub mod comments;
pub mod reviews;
pub mod taxonomy;
pub mod titles;
pub mod users;

use chrono::{NaiveDate, Utc};

use crate::{
    error::{AppResult, OptionExt},
    models::{Review, Title},
    repository::Repository,
};

/// The calendar date year checks are evaluated against.
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) async fn find_title(repo: &dyn Repository, title_id: i64) -> AppResult<Title> {
    repo.get_title(title_id).await?.ok_or_not_found()
}

/// A review addressed through its title; a review under another title is a 404.
pub(crate) async fn find_review(
    repo: &dyn Repository,
    title_id: i64,
    review_id: i64,
) -> AppResult<Review> {
    find_title(repo, title_id).await?;
    repo.get_review(title_id, review_id).await?.ok_or_not_found()
}

/// Liveness probe.
pub async fn health() -> &'static str {
    "ok"
}
