use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod policy;
pub mod repository;
pub mod routes;
pub mod validation;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use mailer::MailerState;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// Every resource route is mounted below this prefix.
pub const API_PREFIX: &str = "/api/v1";

/// ApiDoc
///
/// OpenAPI document for the `/api/v1` surface, served at `/api-docs/openapi.json`.
/// Schemas referenced from the handlers' request and response bodies are collected
/// automatically; the list below adds the ones only reachable through nesting.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::signup, handlers::auth::obtain_token, handlers::auth::refresh_token,
        handlers::users::list_users, handlers::users::create_user, handlers::users::get_user,
        handlers::users::update_user, handlers::users::delete_user, handlers::users::get_me,
        handlers::users::update_me,
        handlers::taxonomy::list_categories, handlers::taxonomy::create_category,
        handlers::taxonomy::delete_category, handlers::taxonomy::list_genres,
        handlers::taxonomy::create_genre, handlers::taxonomy::delete_genre,
        handlers::titles::list_titles, handlers::titles::get_title, handlers::titles::create_title,
        handlers::titles::update_title, handlers::titles::delete_title,
        handlers::reviews::list_reviews, handlers::reviews::create_review,
        handlers::reviews::get_review, handlers::reviews::update_review,
        handlers::reviews::delete_review,
        handlers::comments::list_comments, handlers::comments::create_comment,
        handlers::comments::get_comment, handlers::comments::update_comment,
        handlers::comments::delete_comment
    ),
    components(schemas(models::Role, models::Taxon)),
    servers((url = "/api/v1")),
    tags(
        (name = "auth", description = "Signup and token exchange"),
        (name = "users", description = "Accounts"),
        (name = "catalog", description = "Categories, genres and titles"),
        (name = "reviews", description = "Scored reviews of titles"),
        (name = "comments", description = "Comments on reviews")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Shared, cloneable container for the collaborators every request may need.
#[derive(Clone)]
pub struct AppState {
    /// Persistence, behind the `Repository` trait.
    pub repo: RepositoryState,
    /// Outbound mail for confirmation codes.
    pub mailer: MailerState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Extractors (`RequestContext`, `AuthUser`) pull only what they need from the state.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Mounts the API under `/api/v1`, the health probe and Swagger UI at the root,
/// and wraps everything in the request-id, tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(routes::system_routes())
        .nest(API_PREFIX, routes::api_routes())
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Every request gets a UUID before the trace span is opened.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // Echo the id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with method, URI and `x-request-id` so every
/// log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
