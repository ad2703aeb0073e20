mod handlers;
mod metrics;
mod state;

use axum::{
    routing::{delete, get, post},
    Router,
};
use shortener_core::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::from_env()?;
    tracing::info!(app = %config.app_name, env = %config.app_env, "starting shortener-server");

    let state = state::AppState::build(config).await?;
    tracing::info!("backends ready");

    let app = build_router(state);

    let addr: SocketAddr = "0.0.0.0:8000".parse()?;
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn build_router(state: Arc<state::AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/v1/urls/", post(handlers::create_short_url))
        .route("/api/v1/urls/:short_code", get(handlers::get_url_info))
        .route("/api/v1/urls/:short_code", delete(handlers::delete_url))
        .route("/api/v1/urls/:short_code/stats", get(handlers::get_url_stats))
        .route("/:short_code", get(handlers::redirect))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use prometheus::Registry;
    use shortener_core::cache::{CacheStrategy, InMemoryCache};
    use shortener_core::queue::{InMemoryQueue, QueueStrategy};
    use shortener_core::shortcode::{build_strategy, ShortCodeConfig, ShortCodeKind};
    use shortener_core::storage::{HitStorageStrategy, SqliteHitStorage};
    use shortener_core::store::{SqliteUrlStore, UrlStore};
    use shortener_core::{HitWorker, HitWorkerConfig, UrlService};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Builds a server `AppState` and a `HitWorker` sharing the same
    /// in-memory queue/store so a test can drive the HTTP surface and then
    /// drain the hit pipeline, mirroring how the server and worker binaries
    /// share the same backends in a real deployment.
    async fn test_harness() -> (Router, HitWorker) {
        let store: Arc<dyn UrlStore> = Arc::new(SqliteUrlStore::connect("sqlite::memory:").await.unwrap());
        let cache: Arc<dyn CacheStrategy> = Arc::new(InMemoryCache::new());
        let queue: Arc<dyn QueueStrategy> = Arc::new(InMemoryQueue::new());
        let storage: Arc<dyn HitStorageStrategy> =
            Arc::new(SqliteHitStorage::connect("sqlite::memory:").await.unwrap());
        let short_code = build_strategy(&ShortCodeConfig {
            strategy: ShortCodeKind::Base62,
            length: 8,
            salt: 7,
            max_retries: 5,
        });

        let service = UrlService::new(
            Arc::clone(&store),
            cache,
            Arc::clone(&queue),
            short_code,
            Duration::from_secs(60),
            "hits",
        );

        let registry = Registry::new();
        let metrics = metrics::init(&registry);
        let config = Config {
            app_name: "shortener-server-test".to_string(),
            app_env: "test".to_string(),
            base_url: "http://test.local".to_string(),
            database_url: "sqlite::memory:".to_string(),
            short_code_strategy: ShortCodeKind::Base62,
            short_code_length: 8,
            short_code_salt: 7,
            short_code_max_retries: 5,
            cache_backend: shortener_core::cache::CacheBackend::Memory,
            redis_url: String::new(),
            cache_ttl: Duration::from_secs(60),
            queue_backend: shortener_core::queue::QueueBackend::Memory,
            queue_name: "hits".to_string(),
            queue_consumer_group: "test".to_string(),
            queue_batch_size: 100,
            queue_worker_interval: Duration::from_millis(20),
            hit_storage_backend: shortener_core::storage::HitStorageBackend::RowStore,
            hit_storage_sqlite_path: "sqlite::memory:".to_string(),
            hit_storage_clickhouse_url: String::new(),
            hit_storage_clickhouse_database: String::new(),
            hit_storage_buffer_size: 1000,
            hit_storage_flush_interval: Duration::from_millis(10),
            worker_shutdown_deadline: Duration::from_secs(5),
        };

        let state = Arc::new(state::AppState {
            config,
            service,
            metrics,
            registry,
        });

        let worker = HitWorker::new(
            queue,
            storage,
            store,
            HitWorkerConfig {
                stream_name: "hits".to_string(),
                batch_size: 100,
                block_time: Duration::from_millis(20),
                flush_interval: Duration::from_millis(10),
                shutdown_deadline: Duration::from_secs(5),
            },
        );

        (build_router(state), worker)
    }

    fn with_connect_info(req: axum::http::request::Builder) -> axum::http::request::Builder {
        req.extension(ConnectInfo(std::net::SocketAddr::from(([127, 0, 0, 1], 0))))
    }

    /// S4: create a URL, hit the redirect path, drain the queue, then check
    /// stats reflect the hit.
    #[tokio::test]
    async fn scenario_s4_redirect_then_stats_reflect_hit() {
        let (app, worker) = test_harness().await;

        let create_req = Request::builder()
            .method("POST")
            .uri("/api/v1/urls/")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"long_url":"https://example.com/a"}"#))
            .unwrap();
        let create_resp = app.clone().oneshot(create_req).await.unwrap();
        assert_eq!(create_resp.status(), StatusCode::CREATED);
        let body = axum::body::to_bytes(create_resp.into_body(), usize::MAX).await.unwrap();
        let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let code = created["short_code"].as_str().unwrap().to_string();

        let redirect_req = with_connect_info(Request::builder().method("GET").uri(format!("/{code}")))
            .body(Body::empty())
            .unwrap();
        let redirect_resp = app.clone().oneshot(redirect_req).await.unwrap();
        assert_eq!(redirect_resp.status(), StatusCode::FOUND);
        assert_eq!(
            redirect_resp.headers().get("location").unwrap(),
            "https://example.com/a"
        );

        // Give the fire-and-forget hit publish a moment to land on the queue.
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });
        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let stats_req = Request::builder()
            .method("GET")
            .uri(format!("/api/v1/urls/{code}/stats"))
            .body(Body::empty())
            .unwrap();
        let stats_resp = app.clone().oneshot(stats_req).await.unwrap();
        assert_eq!(stats_resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(stats_resp.into_body(), usize::MAX).await.unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(stats["total_hits"].as_i64().unwrap() >= 1);
    }

    #[tokio::test]
    async fn get_url_info_hides_soft_deleted_record() {
        let (app, _worker) = test_harness().await;

        let create_req = Request::builder()
            .method("POST")
            .uri("/api/v1/urls/")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"long_url":"https://example.com/b"}"#))
            .unwrap();
        let create_resp = app.clone().oneshot(create_req).await.unwrap();
        let body = axum::body::to_bytes(create_resp.into_body(), usize::MAX).await.unwrap();
        let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let code = created["short_code"].as_str().unwrap().to_string();

        let delete_req = Request::builder()
            .method("DELETE")
            .uri(format!("/api/v1/urls/{code}"))
            .body(Body::empty())
            .unwrap();
        let delete_resp = app.clone().oneshot(delete_req).await.unwrap();
        assert_eq!(delete_resp.status(), StatusCode::NO_CONTENT);

        let get_req = Request::builder()
            .method("GET")
            .uri(format!("/api/v1/urls/{code}"))
            .body(Body::empty())
            .unwrap();
        let get_resp = app.clone().oneshot(get_req).await.unwrap();
        assert_eq!(get_resp.status(), StatusCode::NOT_FOUND);
    }
}
