use crate::state::AppState;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use shortener_core::models::RequestMetadata;
use shortener_core::CoreError;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateUrlRequest {
    pub long_url: String,
}

#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub id: i64,
    pub short_code: String,
    pub long_url: String,
    pub short_url: String,
    pub total_hits: i64,
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct UrlStatsResponse {
    pub short_code: String,
    pub total_hits: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    detail: String,
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (status, Json(ErrorBody { detail: detail.into() })).into_response()
}

fn core_error_response(err: CoreError) -> Response {
    match err {
        CoreError::InvalidInput(msg) => error_response(StatusCode::UNPROCESSABLE_ENTITY, msg),
        CoreError::NotFound => error_response(StatusCode::NOT_FOUND, "not found"),
        e @ CoreError::CapacityExceeded { .. } => {
            tracing::error!(error = %e, "short code capacity exceeded");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        other => {
            tracing::error!(error = %other, "request failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, other.to_string())
        }
    }
}

// ── POST /api/v1/urls/ ───────────────────────────────────────────────────────

pub async fn create_short_url(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUrlRequest>,
) -> Response {
    match state.service.create(&payload.long_url).await {
        Ok(record) => {
            state.metrics.db_writes_total.inc();
            state
                .metrics
                .http_requests_total
                .with_label_values(&["urls", "POST", "201"])
                .inc();
            (StatusCode::CREATED, Json(to_url_response(&record, &state.config.base_url))).into_response()
        }
        Err(e) => core_error_response(e),
    }
}

// ── GET /api/v1/urls/{short_code} ────────────────────────────────────────────

pub async fn get_url_info(State(state): State<Arc<AppState>>, Path(short_code): Path<String>) -> Response {
    match state.service.get(&short_code).await {
        Ok(Some(record)) => {
            state.metrics.db_reads_total.inc();
            Json(to_url_response(&record, &state.config.base_url)).into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Short URL not found"),
        Err(e) => core_error_response(e),
    }
}

// ── GET /api/v1/urls/{short_code}/stats ──────────────────────────────────────

pub async fn get_url_stats(State(state): State<Arc<AppState>>, Path(short_code): Path<String>) -> Response {
    match state.service.stats(&short_code).await {
        Ok(Some(stats)) => {
            state.metrics.db_reads_total.inc();
            Json(UrlStatsResponse {
                short_code: stats.short_code,
                total_hits: stats.total_hits,
                created_at: stats.created_at,
                updated_at: stats.updated_at,
            })
            .into_response()
        }
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Short URL not found"),
        Err(e) => core_error_response(e),
    }
}

// ── DELETE /api/v1/urls/{short_code} ─────────────────────────────────────────

pub async fn delete_url(State(state): State<Arc<AppState>>, Path(short_code): Path<String>) -> Response {
    match state.service.delete(&short_code).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "Short URL not found"),
        Err(e) => core_error_response(e),
    }
}

// ── GET /{short_code} (redirect) ─────────────────────────────────────────────

pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(short_code): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    match state.service.resolve(&short_code).await {
        Ok(Some(long_url)) => {
            state.metrics.cache_hits_total.inc();
            state
                .metrics
                .http_requests_total
                .with_label_values(&["redirect", "GET", "302"])
                .inc();

            let metadata = RequestMetadata {
                ip_address: Some(addr.ip().to_string()),
                user_agent: headers
                    .get("user-agent")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                referer: headers
                    .get("referer")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                country: None,
                device_type: None,
                browser: None,
            };

            let service_state = Arc::clone(&state);
            let code = short_code.clone();
            tokio::spawn(async move {
                service_state.service.publish_hit(&code, metadata).await;
                service_state.metrics.hit_events_published_total.inc();
            });

            (
                StatusCode::FOUND,
                [(axum::http::header::LOCATION, long_url.clone())],
            )
                .into_response()
        }
        Ok(None) => {
            state.metrics.cache_misses_total.inc();
            error_response(StatusCode::NOT_FOUND, "Short URL not found or inactive")
        }
        Err(e) => core_error_response(e),
    }
}

// ── Health / Metrics ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: Component,
    pub store: Component,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store = if state.service.store_is_reachable().await {
        Component::Healthy
    } else {
        Component::Unhealthy
    };

    Json(HealthResponse { status: store, store })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    crate::metrics::gather(&state.registry)
}

fn to_url_response(record: &shortener_core::UrlRecord, base_url: &str) -> UrlResponse {
    let short_code = record.short_code.clone().unwrap_or_default();
    UrlResponse {
        id: record.id,
        short_url: format!("{base_url}/{short_code}"),
        short_code,
        long_url: record.long_url.clone(),
        total_hits: record.total_hits,
        is_active: record.is_active,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}
