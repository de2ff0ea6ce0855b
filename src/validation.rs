//! Field and cross-field rules applied to incoming payloads.
//!
//! Simple shape rules (lengths, ranges, email syntax) are declared on the request
//! structs with `validator`; the rules below are the ones that need code: slug
//! syntax, the reserved username, the calendar-dependent year bound and the
//! title's taxonomy references.

use std::borrow::Cow;
use std::convert::Infallible;
use std::sync::LazyLock;

use axum::{
    Json,
    extract::{FromRequest, Request},
};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    error::{AppError, AppResult, FieldErrors},
    models::TaxonKind,
    repository::Repository,
};

pub const SLUG_MAX_LEN: usize = 50;
pub const RESERVED_USERNAME: &str = "me";

static SLUG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern is a valid regex")
});

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Slugs are `[-a-zA-Z0-9_]+`, at most 50 characters.
pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.len() > SLUG_MAX_LEN || !SLUG_PATTERN.is_match(slug) {
        return Err(rule(
            "invalid_slug",
            "slug must contain only latin letters, digits, '-' or '_' and be at most 50 characters",
        ));
    }
    Ok(())
}

/// "me" is reserved for the self-service endpoint, in any letter case.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(rule("required", "username is required"));
    }
    if username.eq_ignore_ascii_case(RESERVED_USERNAME) {
        return Err(rule("reserved_username", "username \"me\" is reserved"));
    }
    Ok(())
}

/// A release year must be positive and not after the year of `today`.
pub fn check_year(year: i32, today: NaiveDate) -> Result<(), String> {
    if year <= 0 || year > today.year() {
        return Err("invalid year".to_string());
    }
    Ok(())
}

/// Validates an optional year against `today`, producing a `year` field error.
pub fn validate_title_year(year: Option<i32>, today: NaiveDate) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();
    if let Some(year) = year {
        errors.check("year", check_year(year, today));
    }
    errors.into_result()
}

/// Every genre slug and the category slug of a title write must name an
/// existing taxon.
pub async fn validate_title_refs(
    repo: &dyn Repository,
    genre: Option<&[String]>,
    category: Option<&str>,
) -> AppResult<()> {
    let mut errors = FieldErrors::new();

    for slug in genre.unwrap_or_default() {
        if repo.get_taxon(TaxonKind::Genre, slug).await?.is_none() {
            errors.add("genre", format!("genre \"{slug}\" does not exist"));
        }
    }

    if let Some(slug) = category {
        if repo.get_taxon(TaxonKind::Category, slug).await?.is_none() {
            errors.add("category", format!("category \"{slug}\" does not exist"));
        }
    }

    errors.into_result()
}

/// Flattens `validator` output into the field map used by error responses.
pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    let mut out = FieldErrors::new();
    for (field, errs) in errors.field_errors() {
        for e in errs.iter() {
            let message = e
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("{} is invalid", field));
            out.add(field.to_string(), message);
        }
    }
    out
}

/// JsonPayload
///
/// JSON request body whose checks are deferred. The extractor only buffers and
/// parses the body; nothing is reported until the handler calls
/// [`JsonPayload::into_valid`] after its policy checks, so a caller without
/// access gets 401/403 instead of a description of the field rules.
pub struct JsonPayload<T> {
    body: Result<T, AppError>,
}

impl<T> JsonPayload<T> {
    pub fn new(value: T) -> Self {
        Self { body: Ok(value) }
    }
}

impl<T> From<T> for JsonPayload<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Validate> JsonPayload<T> {
    /// The parsed body once it has passed its `Validate` rules. A malformed body
    /// is a `BadRequest`, a rule violation a `Validation` with per-field messages.
    pub fn into_valid(self) -> AppResult<T> {
        let value = self.body?;
        value
            .validate()
            .map_err(|e| AppError::Validation(field_errors(&e)))?;
        Ok(value)
    }
}

impl<S, T> FromRequest<S> for JsonPayload<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| value)
            .map_err(|e| AppError::BadRequest(e.body_text()));
        Ok(Self { body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateReviewRequest, CreateTaxonRequest, SignupRequest};

    fn day(y: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, 6, 15).unwrap()
    }

    #[test]
    fn year_bounds() {
        let today = day(2024);
        assert!(check_year(2024, today).is_ok());
        assert!(check_year(1, today).is_ok());
        assert!(check_year(2025, today).is_err());
        assert!(check_year(0, today).is_err());
        assert!(check_year(-300, today).is_err());
        assert!(validate_title_year(None, today).is_ok());
    }

    #[test]
    fn slug_rules() {
        assert!(validate_slug("sci-fi_2").is_ok());
        assert!(validate_slug("").is_err());
        assert!(validate_slug("with space").is_err());
        assert!(validate_slug("кино").is_err());
        assert!(validate_slug(&"a".repeat(50)).is_ok());
        assert!(validate_slug(&"a".repeat(51)).is_err());
    }

    #[test]
    fn payload_rules_run_on_demand() {
        let payload = JsonPayload::new(CreateReviewRequest {
            text: "fine".to_string(),
            score: 11,
        });
        let Err(AppError::Validation(fields)) = payload.into_valid() else {
            panic!("expected a score validation error");
        };
        assert!(fields.get("score").is_some());

        let unparsed: JsonPayload<CreateReviewRequest> = JsonPayload {
            body: Err(AppError::BadRequest("bad json".to_string())),
        };
        assert!(matches!(unparsed.into_valid(), Err(AppError::BadRequest(_))));

        let review = JsonPayload::from(CreateReviewRequest {
            text: "fine".to_string(),
            score: 7,
        })
        .into_valid()
        .unwrap();
        assert_eq!(review.score, 7);
    }

    #[test]
    fn reserved_username_any_case() {
        for name in ["me", "ME", "Me", "mE"] {
            assert!(validate_username(name).is_err(), "{name} must be rejected");
        }
        assert!(validate_username("").is_err());
        assert!(validate_username("Director").is_ok());
        assert!(validate_username("meme").is_ok());
    }

    #[test]
    fn score_accepted_only_in_range() {
        for score in -1..=12 {
            let req = CreateReviewRequest {
                text: "text".to_string(),
                score,
            };
            assert_eq!(req.validate().is_ok(), (1..=10).contains(&score), "score {score}");
        }
    }

    #[test]
    fn signup_payload_rules() {
        let bad = SignupRequest {
            username: "ME".to_string(),
            email: String::new(),
        };
        let errors = field_errors(&bad.validate().unwrap_err());
        assert!(errors.get("username").is_some());
        assert!(errors.get("email").is_some());

        let good = SignupRequest {
            username: "Director".to_string(),
            email: "director@example.com".to_string(),
        };
        assert!(good.validate().is_ok());
    }

    #[test]
    fn taxon_name_length() {
        let long = CreateTaxonRequest {
            name: "n".repeat(257),
            slug: "ok".to_string(),
        };
        let errors = field_errors(&long.validate().unwrap_err());
        assert!(errors.get("name").is_some());
        assert!(errors.get("slug").is_none());
    }

    #[tokio::test]
    async fn title_refs_must_exist() {
        let repo = crate::repository::MemoryRepository::new();
        repo.create_taxon(
            TaxonKind::Genre,
            CreateTaxonRequest {
                name: "Drama".to_string(),
                slug: "drama".to_string(),
            },
        )
        .await
        .unwrap();

        let known = vec!["drama".to_string()];
        assert!(validate_title_refs(&repo, Some(known.as_slice()), None).await.is_ok());

        let unknown = vec!["drama".to_string(), "western".to_string()];
        let err = validate_title_refs(&repo, Some(unknown.as_slice()), Some("films"))
            .await
            .unwrap_err();
        let AppError::Validation(fields) = err else {
            panic!("expected a validation error");
        };
        assert_eq!(fields.get("genre").map(<[String]>::len), Some(1));
        assert!(fields.get("category").is_some());
    }
}
