use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::AppError;
use crate::validation::{validate_slug, validate_username};

// --- Roles ---

/// Role
///
/// Closed set of account roles in ascending privilege. Every access decision goes
/// through `rank`/`at_least`, never through string comparison.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn rank(self) -> u8 {
        match self {
            Role::User => 0,
            Role::Moderator => 1,
            Role::Admin => 2,
        }
    }

    pub fn at_least(self, other: Role) -> bool {
        self.rank() >= other.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::internal(format!("unknown role in storage: {other}"))),
        }
    }
}

// --- Core Schemas ---

/// User
///
/// Account record as stored. Never serialized directly: clients see `UserProfile`,
/// which leaves out the id, the superuser flag and the confirmation code.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub bio: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_superuser: bool,
    /// `None` until a code is issued by signup; cleared once exchanged for tokens.
    pub confirmation_code: Option<String>,
}

/// Raw `users` row. `role` is kept as text in the database.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub role: String,
    pub bio: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_superuser: bool,
    pub confirmation_code: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            role: row.role.parse()?,
            bio: row.bio,
            first_name: row.first_name,
            last_name: row.last_name,
            is_superuser: row.is_superuser,
            confirmation_code: row.confirmation_code,
        })
    }
}

/// UserProfile
///
/// Public representation of an account (`/users`, `/users/me`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: Role,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            bio: user.bio,
            role: user.role,
        }
    }
}

/// TaxonKind
///
/// Categories and genres share one shape and one set of rules; this selects the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaxonKind {
    Category,
    Genre,
}

impl TaxonKind {
    pub fn table(self) -> &'static str {
        match self {
            TaxonKind::Category => "categories",
            TaxonKind::Genre => "genres",
        }
    }

    /// Name used for conflict messages and field errors.
    pub fn label(self) -> &'static str {
        match self {
            TaxonKind::Category => "category",
            TaxonKind::Genre => "genre",
        }
    }
}

/// Taxon
///
/// A category or genre entry: a unique display name plus a URL-safe slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Taxon {
    pub name: String,
    pub slug: String,
}

/// Title
///
/// Read representation of a reviewable work. `genre` and `category` are nested
/// objects; `rating` is the rounded mean of review scores, `None` without reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Title {
    pub id: i64,
    pub name: String,
    pub year: Option<i32>,
    pub description: Option<String>,
    /// Mean review score rounded half away from zero (7.5 gives 8, never
    /// truncated to 7). `None` while the title has no reviews.
    pub rating: Option<i32>,
    pub genre: Vec<Taxon>,
    pub category: Option<Taxon>,
}

/// Flat `titles` row joined with its category and rating aggregate.
/// Genres are loaded separately and attached.
#[derive(Debug, Clone, FromRow)]
pub struct TitleRow {
    pub id: i64,
    pub name: String,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub rating: Option<i32>,
    pub category_name: Option<String>,
    pub category_slug: Option<String>,
}

impl TitleRow {
    pub fn into_title(self, genre: Vec<Taxon>) -> Title {
        let category = match (self.category_name, self.category_slug) {
            (Some(name), Some(slug)) => Some(Taxon { name, slug }),
            _ => None,
        };
        Title {
            id: self.id,
            name: self.name,
            year: self.year,
            description: self.description,
            rating: self.rating,
            genre,
            category,
        }
    }
}

/// Review
///
/// One author's scored opinion of one title. `author` is the author's username;
/// `author_id` is kept for ownership checks and never leaves the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Review {
    pub id: i64,
    pub title: i64,
    pub author: String,
    #[serde(skip)]
    #[ts(skip)]
    pub author_id: i64,
    pub text: String,
    pub score: i32,
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
}

/// Comment
///
/// A remark on a review. Same attribution scheme as `Review`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub review: i64,
    pub author: String,
    #[serde(skip)]
    #[ts(skip)]
    pub author_id: i64,
    pub text: String,
    #[ts(type = "string")]
    pub pub_date: DateTime<Utc>,
}

// --- Auth Payloads ---

/// SignupRequest
///
/// Input for `POST /auth/signup`; echoed back unchanged on success.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct SignupRequest {
    #[validate(
        length(max = 255, message = "username must be at most 255 characters"),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(
        length(min = 1, message = "email is required"),
        email(message = "enter a valid email address")
    )]
    pub email: String,
}

/// TokenRequest
///
/// Input for `POST /auth/token`: the emailed confirmation code for `username`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct TokenRequest {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "confirmation_code is required"))]
    pub confirmation_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "refresh is required"))]
    pub refresh: String,
}

/// TokenPair
///
/// Output of a successful code or refresh exchange.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

// --- User Administration Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    #[validate(
        length(max = 255, message = "username must be at most 255 characters"),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[validate(email(message = "enter a valid email address"))]
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
    pub bio: Option<String>,
    #[validate(length(max = 150, message = "first_name must be at most 150 characters"))]
    pub first_name: Option<String>,
    #[validate(length(max = 150, message = "last_name must be at most 150 characters"))]
    pub last_name: Option<String>,
}

/// UpdateUserRequest
///
/// Partial update. On `/users/me` the `role` field is discarded before it reaches
/// the repository.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 255, message = "username must be at most 255 characters"),
        custom(function = "validate_username")
    )]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "enter a valid email address"))]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 150, message = "first_name must be at most 150 characters"))]
    pub first_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 150, message = "last_name must be at most 150 characters"))]
    pub last_name: Option<String>,
}

// --- Catalog Payloads ---

/// CreateTaxonRequest
///
/// Input for `POST /categories` and `POST /genres`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateTaxonRequest {
    #[validate(length(min = 1, max = 256, message = "name must be 1-256 characters"))]
    pub name: String,
    #[validate(custom(function = "validate_slug"))]
    pub slug: String,
}

/// CreateTitleRequest
///
/// Write representation of a title: genres and category are referenced by slug.
/// `year` is checked against the current date by the handler.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateTitleRequest {
    #[validate(length(min = 1, max = 256, message = "name must be 1-256 characters"))]
    pub name: String,
    pub year: Option<i32>,
    #[validate(length(max = 512, message = "description must be at most 512 characters"))]
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Vec<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateTitleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 256, message = "name must be 1-256 characters"))]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 512, message = "description must be at most 512 characters"))]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

// --- Review & Comment Payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateReviewRequest {
    #[validate(length(min = 1, message = "text is required"))]
    pub text: String,
    #[validate(range(min = 1, max = 10, message = "score must be 1–10"))]
    pub score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateReviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 10, message = "score must be 1–10"))]
    pub score: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, message = "text is required"))]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate, Default)]
#[ts(export)]
pub struct UpdateCommentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub text: Option<String>,
}

// --- Listing ---

/// Default page size when `limit` is omitted.
pub const DEFAULT_PAGE_SIZE: i64 = 10;
/// Upper bound applied to any requested `limit`.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Pagination
///
/// Normalized limit/offset window handed to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Pagination {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0).max(0),
        }
    }

    /// Applies the window to an already filtered, ordered collection.
    pub fn slice<T>(&self, items: Vec<T>) -> Page<T> {
        let count = items.len() as i64;
        let results = items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect();
        Page { count, results }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Page
///
/// Envelope for every list endpoint: total matches plus the requested window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Page<T> {
    pub count: i64,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

/// ListQuery
///
/// Query parameters for users, categories and genres.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListQuery {
    /// Case-insensitive substring match on the name (or username).
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset)
    }
}

/// TitleFilter
///
/// Query parameters accepted by `GET /titles`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TitleFilter {
    /// Category slug.
    pub category: Option<String>,
    /// Genre slug.
    pub genre: Option<String>,
    /// Case-insensitive substring of the title name.
    pub name: Option<String>,
    pub year: Option<i32>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TitleFilter {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset)
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset)
    }
}
