use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode},
};
use reviewdb::{
    AppError, AppState, MemoryRepository,
    auth::AuthUser,
    config::AppConfig,
    handlers::{auth, comments, reviews, taxonomy, titles, users},
    mailer::{MailerState, MockMailer},
    models::{
        CreateCommentRequest, CreateReviewRequest, CreateTaxonRequest, CreateTitleRequest,
        CreateUserRequest, ListQuery, Role, SignupRequest, TokenRequest, UpdateReviewRequest,
        UpdateTitleRequest, UpdateUserRequest, User,
    },
    policy::RequestContext,
    repository::{Repository, RepositoryState},
    validation::JsonPayload,
};
use std::sync::Arc;

// --- Test Fixtures ---

fn create_test_state(repo: Arc<MemoryRepository>, mailer: MockMailer) -> AppState {
    AppState {
        repo: repo as RepositoryState,
        mailer: Arc::new(mailer) as MailerState,
        config: AppConfig::default(),
    }
}

async fn seed_user(repo: &MemoryRepository, username: &str, role: Role) -> User {
    repo.create_user(CreateUserRequest {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        role: Some(role),
        ..Default::default()
    })
    .await
    .unwrap()
}

fn as_actor(method: Method, user: &User) -> RequestContext {
    RequestContext::new(method, Some(AuthUser::from(user)))
}

/// One title with a review by `author`; returns (title_id, review_id).
async fn seed_review(repo: &MemoryRepository, author: &User) -> (i64, i64) {
    let title = repo
        .create_title(CreateTitleRequest {
            name: "Andrei Rublev".to_string(),
            year: Some(1966),
            ..Default::default()
        })
        .await
        .unwrap();
    let review = repo
        .create_review(
            title.id,
            author.id,
            CreateReviewRequest {
                text: "Epic".to_string(),
                score: 9,
            },
        )
        .await
        .unwrap();
    (title.id, review.id)
}

// --- Auth Handlers ---

#[tokio::test]
async fn test_signup_delivers_code_and_token_consumes_it() {
    let repo = Arc::new(MemoryRepository::new());
    let mailer = MockMailer::new();
    let state = create_test_state(repo.clone(), mailer.clone());

    let payload = SignupRequest {
        username: "Director".to_string(),
        email: "director@example.com".to_string(),
    };
    let echoed = auth::signup(State(state.clone()), JsonPayload::new(payload))
        .await
        .expect("signup succeeds");
    assert_eq!(echoed.0.username, "Director");

    let stored = repo.get_user_by_username("Director").await.unwrap().unwrap();
    let code = stored.confirmation_code.clone().expect("code stored");
    assert_eq!(mailer.last_code_for("director@example.com").await, Some(code.clone()));

    let pair = auth::obtain_token(
        State(state.clone()),
        JsonPayload::new(TokenRequest {
            username: "Director".to_string(),
            confirmation_code: code,
        }),
    )
    .await
    .expect("token issued");
    assert!(!pair.0.access.is_empty());

    let stored = repo.get_user(stored.id).await.unwrap().unwrap();
    assert!(stored.confirmation_code.is_none());
}

#[tokio::test]
async fn test_signup_reports_mail_failure() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo, MockMailer::new_failing());

    let result = auth::signup(
        State(state),
        JsonPayload::new(SignupRequest {
            username: "unlucky".to_string(),
            email: "unlucky@example.com".to_string(),
        }),
    )
    .await;

    let err = result.expect_err("mail failure surfaces");
    assert!(matches!(err, AppError::Mail(_)));
    assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

// --- Catalog Handlers ---

#[tokio::test]
async fn test_create_category_admin_only() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone(), MockMailer::new());
    let reader = seed_user(&repo, "reader", Role::User).await;
    let admin = seed_user(&repo, "boss", Role::Admin).await;
    let payload = CreateTaxonRequest {
        name: "Music".to_string(),
        slug: "music".to_string(),
    };

    let denied = taxonomy::create_category(
        as_actor(Method::POST, &reader),
        State(state.clone()),
        JsonPayload::new(payload.clone()),
    )
    .await;
    assert!(matches!(denied, Err(AppError::Forbidden)));

    let (status, created) = taxonomy::create_category(
        as_actor(Method::POST, &admin),
        State(state.clone()),
        JsonPayload::new(payload),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.0.slug, "music");

    let listed = taxonomy::list_categories(
        RequestContext::anonymous(Method::GET),
        State(state),
        Query(ListQuery::default()),
    )
    .await
    .unwrap();
    assert_eq!(listed.0.count, 1);
}

#[tokio::test]
async fn test_superuser_counts_as_admin() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone(), MockMailer::new());
    let root = repo
        .ensure_superuser("root", "root@example.com")
        .await
        .unwrap();

    let result = titles::create_title(
        as_actor(Method::POST, &root),
        State(state),
        JsonPayload::new(CreateTitleRequest {
            name: "Nostalghia".to_string(),
            year: Some(1983),
            ..Default::default()
        }),
    )
    .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_update_title_rejects_future_year_and_unknown_title() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone(), MockMailer::new());
    let admin = seed_user(&repo, "boss", Role::Admin).await;
    let (title_id, _) = seed_review(&repo, &admin).await;

    let future = titles::update_title(
        as_actor(Method::PATCH, &admin),
        State(state.clone()),
        Path(title_id),
        JsonPayload::new(UpdateTitleRequest {
            year: Some(9999),
            ..Default::default()
        }),
    )
    .await;
    let Err(AppError::Validation(fields)) = future else {
        panic!("expected a year validation error");
    };
    assert!(fields.get("year").is_some());

    let missing = titles::update_title(
        as_actor(Method::PATCH, &admin),
        State(state),
        Path(title_id + 1000),
        JsonPayload::new(UpdateTitleRequest::default()),
    )
    .await;
    assert!(matches!(missing, Err(AppError::NotFound)));
}

// --- Review & Comment Handlers ---

#[tokio::test]
async fn test_update_review_by_stranger_is_forbidden() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone(), MockMailer::new());
    let author = seed_user(&repo, "author", Role::User).await;
    let stranger = seed_user(&repo, "stranger", Role::User).await;
    let (title_id, review_id) = seed_review(&repo, &author).await;

    let result = reviews::update_review(
        as_actor(Method::PATCH, &stranger),
        State(state.clone()),
        Path((title_id, review_id)),
        JsonPayload::new(UpdateReviewRequest {
            score: Some(1),
            ..Default::default()
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden)));

    let review = repo.get_review(title_id, review_id).await.unwrap().unwrap();
    assert_eq!(review.score, 9);
}

#[tokio::test]
async fn test_access_denial_precedes_payload_errors() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone(), MockMailer::new());
    let author = seed_user(&repo, "author", Role::User).await;
    let stranger = seed_user(&repo, "stranger", Role::User).await;
    let (title_id, review_id) = seed_review(&repo, &author).await;

    let stranger_patch = reviews::update_review(
        as_actor(Method::PATCH, &stranger),
        State(state.clone()),
        Path((title_id, review_id)),
        JsonPayload::new(UpdateReviewRequest {
            score: Some(11),
            ..Default::default()
        }),
    )
    .await;
    assert!(matches!(stranger_patch, Err(AppError::Forbidden)));

    let anonymous_post = reviews::create_review(
        RequestContext::anonymous(Method::POST),
        State(state.clone()),
        Path(title_id),
        JsonPayload::new(CreateReviewRequest {
            text: "x".to_string(),
            score: 0,
        }),
    )
    .await;
    assert!(matches!(anonymous_post, Err(AppError::Unauthorized)));

    let bad_slug = taxonomy::create_category(
        as_actor(Method::POST, &stranger),
        State(state.clone()),
        JsonPayload::new(CreateTaxonRequest {
            name: "Bad".to_string(),
            slug: "bad slug".to_string(),
        }),
    )
    .await;
    assert!(matches!(bad_slug, Err(AppError::Forbidden)));

    // The same bad slug from an admin reaches the field rules.
    let admin = seed_user(&repo, "boss", Role::Admin).await;
    let rejected = taxonomy::create_category(
        as_actor(Method::POST, &admin),
        State(state),
        JsonPayload::new(CreateTaxonRequest {
            name: "Bad".to_string(),
            slug: "bad slug".to_string(),
        }),
    )
    .await;
    let Err(AppError::Validation(fields)) = rejected else {
        panic!("expected a slug validation error");
    };
    assert!(fields.get("slug").is_some());
}

#[tokio::test]
async fn test_update_review_by_author_succeeds() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone(), MockMailer::new());
    let author = seed_user(&repo, "author", Role::User).await;
    let (title_id, review_id) = seed_review(&repo, &author).await;

    let updated = reviews::update_review(
        as_actor(Method::PATCH, &author),
        State(state),
        Path((title_id, review_id)),
        JsonPayload::new(UpdateReviewRequest {
            score: Some(4),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(updated.0.score, 4);
    assert_eq!(updated.0.text, "Epic");
}

#[tokio::test]
async fn test_second_review_is_a_validation_error() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone(), MockMailer::new());
    let author = seed_user(&repo, "author", Role::User).await;
    let (title_id, _) = seed_review(&repo, &author).await;

    let result = reviews::create_review(
        as_actor(Method::POST, &author),
        State(state),
        Path(title_id),
        JsonPayload::new(CreateReviewRequest {
            text: "Changed my mind".to_string(),
            score: 2,
        }),
    )
    .await;
    let Err(AppError::Validation(fields)) = result else {
        panic!("expected a validation error");
    };
    assert!(fields.get("non_field_errors").is_some());
}

#[tokio::test]
async fn test_moderator_may_delete_any_comment() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone(), MockMailer::new());
    let author = seed_user(&repo, "author", Role::User).await;
    let moderator = seed_user(&repo, "mod", Role::Moderator).await;
    let (title_id, review_id) = seed_review(&repo, &author).await;
    let comment = repo
        .create_comment(
            review_id,
            author.id,
            CreateCommentRequest {
                text: "First".to_string(),
            },
        )
        .await
        .unwrap();

    let status = comments::delete_comment(
        as_actor(Method::DELETE, &moderator),
        State(state),
        Path((title_id, review_id, comment.id)),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(repo.get_comment(review_id, comment.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_anonymous_cannot_comment() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone(), MockMailer::new());
    let author = seed_user(&repo, "author", Role::User).await;
    let (title_id, review_id) = seed_review(&repo, &author).await;

    let result = comments::create_comment(
        RequestContext::anonymous(Method::POST),
        State(state),
        Path((title_id, review_id)),
        JsonPayload::new(CreateCommentRequest {
            text: "hi".to_string(),
        }),
    )
    .await;
    assert!(matches!(result, Err(AppError::Unauthorized)));
}

// --- User Handlers ---

#[tokio::test]
async fn test_update_me_ignores_role() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone(), MockMailer::new());
    let reader = seed_user(&repo, "reader", Role::User).await;

    let profile = users::update_me(
        as_actor(Method::PATCH, &reader),
        State(state),
        JsonPayload::new(UpdateUserRequest {
            role: Some(Role::Admin),
            first_name: Some("Rea".to_string()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(profile.0.role, Role::User);
    assert_eq!(profile.0.first_name.as_deref(), Some("Rea"));

    let stored = repo.get_user(reader.id).await.unwrap().unwrap();
    assert_eq!(stored.role, Role::User);
}

#[tokio::test]
async fn test_moderator_cannot_administer_users() {
    let repo = Arc::new(MemoryRepository::new());
    let state = create_test_state(repo.clone(), MockMailer::new());
    let moderator = seed_user(&repo, "mod", Role::Moderator).await;
    seed_user(&repo, "victim", Role::User).await;

    let result = users::delete_user(
        as_actor(Method::DELETE, &moderator),
        State(state),
        Path("victim".to_string()),
    )
    .await;
    assert!(matches!(result, Err(AppError::Forbidden)));
    assert!(repo.get_user_by_username("victim").await.unwrap().is_some());
}
