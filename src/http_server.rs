use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::Config;
use crate::oauth::csrf::CookiePolicy;
use crate::oauth::endpoints::{authorize_handler, callback_handler};
use crate::oauth::provider::ProviderRegistry;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to assemble provider endpoints: {0}")]
    ProviderEndpoints(#[from] url::ParseError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shared application state. Everything here is immutable for the process
/// lifetime; per-flow state lives only in the browser's CSRF cookie.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ProviderRegistry>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Result<Self, ServerError> {
        let registry = Arc::new(ProviderRegistry::new(&config)?);
        let http = reqwest::Client::builder()
            .timeout(config.token_timeout)
            .build()?;

        Ok(AppState {
            config,
            registry,
            http,
        })
    }

    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy {
            secure: !self.config.insecure_cookies,
        }
    }
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Non-GET methods on the relay routes are not handled; they 404 like any
/// unmatched path.
async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// Create and configure the relay router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth", get(authorize_handler).fallback(not_found))
        .route("/oauth/auth", get(authorize_handler).fallback(not_found))
        .route(
            "/oauth/authorize",
            get(authorize_handler).fallback(not_found),
        )
        .route("/callback", get(callback_handler).fallback(not_found))
        .route("/oauth/redirect", get(callback_handler).fallback(not_found))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the relay server
pub async fn run_server(config: Config) -> Result<(), ServerError> {
    let port = config.port;
    let state = AppState::new(Arc::new(config))?;
    let app = create_app(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("OAuth relay listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
