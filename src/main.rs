//! PDF tutor web server
//!
//! (c) Softlandia 2025

use pdf_tutor_api::api::{self, AppState};
use pdf_tutor_api::config::Settings;
use pdf_tutor_api::core::assistant::Prompts;
use pdf_tutor_api::core::auth::AuthGateway;
use pdf_tutor_api::core::services::ChatManager;
use pdf_tutor_api::infrastructure::database::DatabaseConnection;
use pdf_tutor_api::infrastructure::gemini::GeminiGenerator;
use pdf_tutor_api::infrastructure::pdf::PdfExtractor;
use pdf_tutor_api::infrastructure::repositories::{DbCredentialRepository, DbSessionRepository};

use anyhow::Context;
use axum::http::{HeaderValue, Method, header};
use log::info;
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(web_server_task(settings))
}

async fn web_server_task(settings: Settings) -> anyhow::Result<()> {
    let database =
        DatabaseConnection::connect(&settings.database_url, settings.db_max_connections)
            .context("invalid DATABASE_URL")?;
    database.migrate().await.context("failed to migrate database")?;

    let prompts = Prompts::new(settings.system_prompt.clone()).context("invalid prompt template")?;
    let chats = ChatManager::new(
        Arc::new(DbSessionRepository::new(database.clone())),
        Arc::new(PdfExtractor::new()),
        Arc::new(GeminiGenerator::new(&settings.gemini).context("failed to build Gemini client")?),
        Arc::new(prompts),
        settings.stream_buffer,
    );
    let auth = AuthGateway::new(
        Arc::new(DbCredentialRepository::new(database)),
        settings.session_ttl,
    );

    let state = AppState {
        auth,
        chats,
        session_ttl: settings.session_ttl,
        max_upload_bytes: settings.max_upload_bytes,
    };

    let origins = settings
        .allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()
        .context("invalid ALLOWED_ORIGINS")?;

    let app = api::router(state)
        .nest_service(
            "/static",
            ServiceBuilder::new().service(ServeDir::new(&settings.static_dir)),
        )
        .layer(
            CorsLayer::new()
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_origin(origins)
                .allow_credentials(true),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(settings.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_address))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for shutdown signal: {e}");
    }
}
