use reviewdb::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    mailer::{HttpMailer, LogMailer, MailerState},
    repository::{PostgresRepository, RepositoryState},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Startup order: configuration, logging, database (with migrations), optional
/// superuser bootstrap, mail delivery, then the HTTP server.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    // Panics on a missing DATABASE_URL or production secrets.
    let config = AppConfig::load();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "reviewdb=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Database migrations failed.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    if let (Some(username), Some(email)) = (&config.admin_username, &config.admin_email) {
        let admin = repo
            .ensure_superuser(username, email)
            .await
            .expect("FATAL: Could not bootstrap the superuser.");
        tracing::info!(user_id = admin.id, username = %admin.username, "superuser ensured");
    }

    let mailer: MailerState = match &config.mail_api_url {
        Some(url) => Arc::new(
            HttpMailer::new(url.clone(), config.mail_api_key.clone(), config.mail_timeout())
                .expect("FATAL: Could not build the mail relay client."),
        ),
        None => {
            tracing::warn!("MAIL_API_URL not set; confirmation mails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState {
        repo,
        mailer,
        config,
    });

    let listener = TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("FATAL: Could not bind {bind_addr}: {e}"));

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
