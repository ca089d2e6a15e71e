mod auth;
mod context;
mod docs;
mod errors;
mod links;
mod schemas;
mod songs;

use axum::{
    routing::{get, post},
    Json, Router,
};
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tunelink_core::{parse_var, ConfigError};

pub use auth::API_KEY_HEADER;
pub use context::*;
pub use errors::*;

use schemas::HealthResponse;

/// The default address the server will listen on.
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5001;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: parse_var("TUNELINK_SERVER_HOST")?.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_var("TUNELINK_SERVER_PORT")?.unwrap_or(DEFAULT_PORT),
            api_key: parse_var::<String>("TUNELINK_API_KEY")?.filter(|k| !k.is_empty()),
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            api_key: None,
        }
    }
}

/// Reports that the server is up
#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "The server is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub fn router(context: ServerContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .route("/link_by_code", post(links::link_by_code))
        .route("/send_song_by_code", post(songs::send_song_by_code))
        .route("/send_song", post(songs::send_song));

    Router::new()
        .nest("/api", api_router)
        .route("/healthz", get(health))
        .route("/api.json", get(docs::docs))
        .layer(cors)
        .with_state(context)
}

/// Starts the tunelink server
pub async fn run_server(config: ServerConfig, context: ServerContext) -> std::io::Result<()> {
    let context = context.with_api_key(config.api_key);

    if context.api_key.is_none() {
        info!("No API key configured, the API is open to anyone who can reach it");
    }

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(context).into_make_service()).await
}
