use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use scribe_engine::Engine;
use scribe_telemetry::MetricsRecorder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            request_timeout_secs: 120,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub metrics: Option<Arc<MetricsRecorder>>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(handlers::run_query))
        .route("/health", get(handlers::health))
        .route("/schema", get(handlers::schema))
        .route("/datasets", get(handlers::datasets))
        .route("/sessions/{id}", delete(handlers::delete_session))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps the serve
/// task alive.
pub async fn start(
    config: ServerConfig,
    engine: Arc<Engine>,
    metrics: Option<Arc<MetricsRecorder>>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState { engine, metrics };
    let router = build_router(state).layer(TimeoutLayer::new(Duration::from_secs(
        config.request_timeout_secs,
    )));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "scribe server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()`; keeps the serve task alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;

    use scribe_llm::MockReply;
    use serde_json::json;

    use crate::testutil::test_state;

    const GROUPED_SQL: &str =
        "SELECT product, SUM(revenue) FROM sales WHERE client_id = 5 GROUP BY product";

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let (state, _mock) = test_state(Vec::new());
        let config = ServerConfig {
            port: 0, // Random port
            ..Default::default()
        };

        let handle = start(config, state.engine, state.metrics).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn query_round_trip_over_http() {
        let (state, _mock) = test_state(vec![
            MockReply::text(GROUPED_SQL),
            MockReply::text("Revenue for each product."),
        ]);
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        let handle = start(config, state.engine, state.metrics).await.unwrap();

        let url = format!("http://127.0.0.1:{}/query", handle.port);
        let resp = reqwest::Client::new()
            .post(&url)
            .json(&json!({
                "question": "Show revenue by product for client 5",
                "tenant_id": 5,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["sql"], GROUPED_SQL);
        assert_eq!(body["results"]["row_count"], 3);
    }

    #[test]
    fn build_router_creates_routes() {
        let (state, _mock) = test_state(Vec::new());

        let _router = build_router(state);
        // If this doesn't panic, the router was built successfully
    }
}
