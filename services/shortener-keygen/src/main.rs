//! Block-based id allocator. Callers request a block of ids via `/allocate`
//! and hand each id to the base62 short-code strategy, amortizing the cost
//! of synchronizing on a shared counter across a batch of creates instead of
//! paying it per request.
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone)]
struct Config {
    primary_redis_url: String,
    secondary_redis_url: String,
    id_allocator_key: String,
    id_block_size: i64,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Self {
            primary_redis_url: std::env::var("KEYGEN_PRIMARY_REDIS_URL")
                .unwrap_or_else(|_| "redis://keygen-redis-primary:6379/0".to_string()),
            secondary_redis_url: std::env::var("KEYGEN_SECONDARY_REDIS_URL")
                .unwrap_or_else(|_| "redis://keygen-redis-secondary:6379/0".to_string()),
            id_allocator_key: std::env::var("ID_ALLOCATOR_KEY")
                .unwrap_or_else(|_| "id_allocator:url".to_string()),
            id_block_size: std::env::var("ID_BLOCK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
        })
    }
}

#[derive(Debug, Deserialize)]
struct AllocateRequest {
    size: Option<i64>,
}

#[derive(Debug, Serialize)]
struct AllocateResponse {
    start: i64,
    end: i64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: HealthStatus,
    primary: HealthStatus,
    secondary: HealthStatus,
}

/// `ConnectionManager` isn't `Clone` in a way that shares the same
/// underlying connection, so each is wrapped in a mutex for interior
/// mutability behind the shared `Arc<AppState>`.
struct AppState {
    config: Config,
    primary: Mutex<ConnectionManager>,
    secondary: Mutex<ConnectionManager>,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let primary_status = {
        let mut c = state.primary.lock().await;
        match c.get::<&str, Option<String>>("__ping__").await {
            Ok(_) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        }
    };
    let secondary_status = {
        let mut c = state.secondary.lock().await;
        match c.get::<&str, Option<String>>("__ping__").await {
            Ok(_) => HealthStatus::Healthy,
            Err(_) => HealthStatus::Unhealthy,
        }
    };
    let overall_status =
        if primary_status == HealthStatus::Healthy || secondary_status == HealthStatus::Healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
    Json(HealthResponse {
        status: overall_status,
        primary: primary_status,
        secondary: secondary_status,
    })
}

async fn allocate(State(state): State<Arc<AppState>>, Json(req): Json<AllocateRequest>) -> Response {
    let size = req.size.unwrap_or(state.config.id_block_size);
    if size <= 0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "detail": "size must be > 0" })),
        )
            .into_response();
    }

    let result = {
        let mut c = state.primary.lock().await;
        try_allocate(&mut c, &state.config.id_allocator_key, size).await
    };
    let (start, end) = match result {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "primary allocator unavailable, falling back to secondary");
            let mut c = state.secondary.lock().await;
            match try_allocate(&mut c, &state.config.id_allocator_key, size).await {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(error = %e, "both keygen backends failed");
                    return (
                        StatusCode::SERVICE_UNAVAILABLE,
                        Json(serde_json::json!({ "detail": "id allocation backends unavailable" })),
                    )
                        .into_response();
                }
            }
        }
    };

    Json(AllocateResponse { start, end }).into_response()
}

async fn try_allocate(conn: &mut ConnectionManager, key: &str, size: i64) -> anyhow::Result<(i64, i64)> {
    let end_value: i64 = conn.incr(key, size).await?;
    let start_value = end_value - size + 1;
    Ok((start_value, end_value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::from_env()?;
    tracing::info!("starting shortener-keygen");

    let primary = {
        let client = redis::Client::open(config.primary_redis_url.as_str())?;
        ConnectionManager::new(client).await?
    };
    let secondary = {
        let client = redis::Client::open(config.secondary_redis_url.as_str())?;
        ConnectionManager::new(client).await?
    };
    tracing::info!("redis backends ready");

    let state = Arc::new(AppState {
        config,
        primary: Mutex::new(primary),
        secondary: Mutex::new(secondary),
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/allocate", post(allocate))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = "0.0.0.0:8010";
    tracing::info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
