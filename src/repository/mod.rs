use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    error::{AppError, AppResult},
    models::{
        Comment, CreateCommentRequest, CreateReviewRequest, CreateTaxonRequest,
        CreateTitleRequest, CreateUserRequest, Page, Pagination, Review, Taxon, TaxonKind, Title,
        TitleFilter, UpdateCommentRequest, UpdateReviewRequest, UpdateTitleRequest,
        UpdateUserRequest, User,
    },
};

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Repository
///
/// Persistence contract for the whole catalog. Implementations own the
/// integrity rules that must hold under concurrency: unique usernames, emails,
/// taxon names/slugs and title names; one review per (author, title); cascades
/// from titles, reviews and users; category references nulled on category
/// deletion.
///
/// Unique violations surface as `AppError::Conflict`, except a second review by
/// the same author on the same title, which surfaces as the validation error
/// returned by [`duplicate_review`].
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> AppResult<Option<User>>;
    async fn get_user_by_username(&self, username: &str) -> AppResult<Option<User>>;
    // Ordered by username; `search` is a case-insensitive substring of the username.
    async fn list_users(&self, search: Option<&str>, page: Pagination) -> AppResult<Page<User>>;
    async fn create_user(&self, req: CreateUserRequest) -> AppResult<User>;
    async fn update_user(&self, id: i64, req: UpdateUserRequest) -> AppResult<Option<User>>;
    // Cascades to the user's reviews and comments.
    async fn delete_user(&self, id: i64) -> AppResult<bool>;

    /// Returns the user matching both fields, creating it when neither is taken.
    /// A user matching only one of them is a `Conflict`.
    async fn get_or_create_user(&self, username: &str, email: &str) -> AppResult<User>;
    async fn set_confirmation_code(&self, id: i64, code: Option<&str>) -> AppResult<()>;
    /// Creates or promotes `username` to superuser.
    async fn ensure_superuser(&self, username: &str, email: &str) -> AppResult<User>;

    // --- Categories & Genres ---
    async fn list_taxa(
        &self,
        kind: TaxonKind,
        search: Option<&str>,
        page: Pagination,
    ) -> AppResult<Page<Taxon>>;
    async fn get_taxon(&self, kind: TaxonKind, slug: &str) -> AppResult<Option<Taxon>>;
    async fn create_taxon(&self, kind: TaxonKind, req: CreateTaxonRequest) -> AppResult<Taxon>;
    // Titles referencing a deleted category keep existing with no category.
    async fn delete_taxon(&self, kind: TaxonKind, slug: &str) -> AppResult<bool>;

    // --- Titles ---
    // Genre and category slugs in write requests must already exist.
    async fn list_titles(&self, filter: &TitleFilter) -> AppResult<Page<Title>>;
    async fn get_title(&self, id: i64) -> AppResult<Option<Title>>;
    async fn create_title(&self, req: CreateTitleRequest) -> AppResult<Title>;
    async fn update_title(&self, id: i64, req: UpdateTitleRequest) -> AppResult<Option<Title>>;
    // Cascades to reviews and their comments.
    async fn delete_title(&self, id: i64) -> AppResult<bool>;

    // --- Reviews ---
    async fn list_reviews(&self, title_id: i64, page: Pagination) -> AppResult<Page<Review>>;
    async fn get_review(&self, title_id: i64, id: i64) -> AppResult<Option<Review>>;
    async fn has_review(&self, title_id: i64, author_id: i64) -> AppResult<bool>;
    async fn create_review(
        &self,
        title_id: i64,
        author_id: i64,
        req: CreateReviewRequest,
    ) -> AppResult<Review>;
    async fn update_review(&self, id: i64, req: UpdateReviewRequest) -> AppResult<Option<Review>>;
    async fn delete_review(&self, id: i64) -> AppResult<bool>;

    // --- Comments ---
    async fn list_comments(&self, review_id: i64, page: Pagination) -> AppResult<Page<Comment>>;
    async fn get_comment(&self, review_id: i64, id: i64) -> AppResult<Option<Comment>>;
    async fn create_comment(
        &self,
        review_id: i64,
        author_id: i64,
        req: CreateCommentRequest,
    ) -> AppResult<Comment>;
    async fn update_comment(&self, id: i64, req: UpdateCommentRequest)
    -> AppResult<Option<Comment>>;
    async fn delete_comment(&self, id: i64) -> AppResult<bool>;
}

pub type RepositoryState = Arc<dyn Repository>;

/// The error for a second review by the same author on the same title.
pub fn duplicate_review() -> AppError {
    AppError::validation("non_field_errors", "only one review per title is allowed")
}

/// Case-insensitive substring match used by the in-memory search filters.
pub(crate) fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
