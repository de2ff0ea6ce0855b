//! PostgresRepository against a live database. Run with
//! `cargo test -- --ignored` and `DATABASE_URL` pointing at a scratch database.

use reviewdb::{
    AppError,
    models::{
        CreateCommentRequest, CreateReviewRequest, CreateTaxonRequest, CreateTitleRequest,
        Pagination, Role, TaxonKind, TitleFilter, UpdateTitleRequest, User,
    },
    repository::{PostgresRepository, Repository},
};
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
    // Keeps names unique across runs against the same database.
    tag: String,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext {
            pool,
            tag: Uuid::new_v4().simple().to_string()[..8].to_string(),
        }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }

    fn name(&self, base: &str) -> String {
        format!("{base}-{}", self.tag)
    }
}

// --- Test Data Helpers ---

async fn create_test_user(ctx: &DbTestContext, repo: &PostgresRepository, base: &str) -> User {
    let username = ctx.name(base);
    repo.get_or_create_user(&username, &format!("{username}@example.com"))
        .await
        .expect("Failed to create test user")
}

async fn create_test_taxa(ctx: &DbTestContext, repo: &PostgresRepository) -> (String, String) {
    let category = ctx.name("films");
    let genre = ctx.name("drama");
    repo.create_taxon(
        TaxonKind::Category,
        CreateTaxonRequest {
            name: category.clone(),
            slug: category.clone(),
        },
    )
    .await
    .expect("category");
    repo.create_taxon(
        TaxonKind::Genre,
        CreateTaxonRequest {
            name: genre.clone(),
            slug: genre.clone(),
        },
    )
    .await
    .expect("genre");
    (category, genre)
}

// --- Tests ---

#[tokio::test]
#[ignore]
async fn test_title_round_trip_with_taxa() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let (category, genre) = create_test_taxa(&ctx, &repo).await;

    let title = repo
        .create_title(CreateTitleRequest {
            name: ctx.name("Stalker"),
            year: Some(1979),
            description: Some("Zone".to_string()),
            genre: vec![genre.clone()],
            category: Some(category.clone()),
        })
        .await
        .unwrap();

    assert_eq!(title.genre.len(), 1);
    assert_eq!(title.category.as_ref().map(|c| c.slug.as_str()), Some(category.as_str()));
    assert!(title.rating.is_none());

    let filtered = repo
        .list_titles(&TitleFilter {
            genre: Some(genre),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(filtered.results.iter().any(|t| t.id == title.id));

    let updated = repo
        .update_title(
            title.id,
            UpdateTitleRequest {
                genre: Some(vec![]),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert!(updated.genre.is_empty());
    assert_eq!(updated.description.as_deref(), Some("Zone"));

    assert!(repo.delete_taxon(TaxonKind::Category, &category).await.unwrap());
    let orphan = repo.get_title(title.id).await.unwrap().unwrap();
    assert!(orphan.category.is_none());

    assert!(repo.delete_title(title.id).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_search_treats_wildcards_literally() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    create_test_user(&ctx, &repo, "searcher").await;
    let genre = ctx.name("sci-fi");
    repo.create_taxon(
        TaxonKind::Genre,
        CreateTaxonRequest {
            name: genre.clone(),
            slug: genre.clone(),
        },
    )
    .await
    .unwrap();
    let title = repo
        .create_title(CreateTitleRequest {
            name: ctx.name("Solaris"),
            ..Default::default()
        })
        .await
        .unwrap();

    let literal = repo
        .list_taxa(TaxonKind::Genre, Some(genre.as_str()), Pagination::default())
        .await
        .unwrap();
    assert_eq!(literal.count, 1);

    let underscore = ctx.name("sci_fi");
    let page = repo
        .list_taxa(TaxonKind::Genre, Some(underscore.as_str()), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.count, 0);

    let percent = format!("%{}", ctx.tag);
    let users = repo
        .list_users(Some(percent.as_str()), Pagination::default())
        .await
        .unwrap();
    assert_eq!(users.count, 0);

    let titles = repo
        .list_titles(&TitleFilter {
            name: Some(format!("Solaris_{}", ctx.tag)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(titles.results.iter().all(|t| t.id != title.id));

    assert!(repo.delete_title(title.id).await.unwrap());
    assert!(repo.delete_taxon(TaxonKind::Genre, &genre).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_unique_names_conflict() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let (category, _) = create_test_taxa(&ctx, &repo).await;

    let err = repo
        .create_taxon(
            TaxonKind::Category,
            CreateTaxonRequest {
                name: ctx.name("other"),
                slug: category,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
#[ignore]
async fn test_reviews_rating_and_cascade() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let alice = create_test_user(&ctx, &repo, "alice").await;
    let bob = create_test_user(&ctx, &repo, "bob").await;

    let title = repo
        .create_title(CreateTitleRequest {
            name: ctx.name("Mirror"),
            ..Default::default()
        })
        .await
        .unwrap();

    let review = repo
        .create_review(
            title.id,
            alice.id,
            CreateReviewRequest {
                text: "Dreamlike".to_string(),
                score: 8,
            },
        )
        .await
        .unwrap();
    assert_eq!(review.author, alice.username);
    repo.create_review(
        title.id,
        bob.id,
        CreateReviewRequest {
            text: "Better".to_string(),
            score: 9,
        },
    )
    .await
    .unwrap();

    // Second review by the same author hits the unique constraint.
    let duplicate = repo
        .create_review(
            title.id,
            alice.id,
            CreateReviewRequest {
                text: "Again".to_string(),
                score: 1,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(duplicate, AppError::Validation(_)));
    assert!(repo.has_review(title.id, alice.id).await.unwrap());

    let rated = repo.get_title(title.id).await.unwrap().unwrap();
    assert_eq!(rated.rating, Some(9));

    let comment = repo
        .create_comment(
            review.id,
            bob.id,
            CreateCommentRequest {
                text: "Agreed".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(comment.author, bob.username);

    assert!(repo.delete_title(title.id).await.unwrap());
    assert!(repo.get_review(title.id, review.id).await.unwrap().is_none());
    let comments = repo
        .list_comments(review.id, Pagination::default())
        .await
        .unwrap();
    assert_eq!(comments.count, 0);
}

#[tokio::test]
#[ignore]
async fn test_signup_user_lifecycle() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&ctx, &repo, "signup").await;
    assert_eq!(user.role, Role::User);
    assert!(user.confirmation_code.is_none());

    let again = create_test_user(&ctx, &repo, "signup").await;
    assert_eq!(again.id, user.id);

    let clash = repo
        .get_or_create_user(&user.username, "different@example.com")
        .await
        .unwrap_err();
    assert!(matches!(clash, AppError::Conflict(_)));

    repo.set_confirmation_code(user.id, Some("abc")).await.unwrap();
    let stored = repo.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(stored.confirmation_code.as_deref(), Some("abc"));

    let admin = repo
        .ensure_superuser(&user.username, &user.email)
        .await
        .unwrap();
    assert!(admin.is_superuser);
    assert_eq!(admin.role, Role::Admin);

    let page = repo
        .list_users(Some(ctx.tag.as_str()), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.count, 1);

    assert!(repo.delete_user(user.id).await.unwrap());
    assert!(repo.get_user(user.id).await.unwrap().is_none());
}
