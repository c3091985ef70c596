//! HTTP API.
//!
//! | Method | Path | |
//! |---|---|---|
//! | POST | `/api/scan` | run a scan, body `{"url": "..."}` |
//! | GET | `/api/results` | history, most recent first |
//! | GET | `/api/results/{id}` | one report |
//! | DELETE | `/api/results/{id}` | delete a report |
//! | GET | `/api/health` | liveness |

pub mod handlers;
pub mod response;

use crate::orchestrator::ScanOrchestrator;
use crate::store::ScanStore;
use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ScanOrchestrator>,
    pub store: Arc<dyn ScanStore>,
}

impl AppState {
    pub fn new(orchestrator: ScanOrchestrator) -> Self {
        let store = orchestrator.store();
        Self {
            orchestrator: Arc::new(orchestrator),
            store,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/scan", post(handlers::create_scan))
        .route("/results", get(handlers::list_results))
        .route(
            "/results/{id}",
            get(handlers::get_result).delete(handlers::delete_result),
        )
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(listen: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;

    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AnalyzerError, FetchError};
    use crate::analysis::PageAnalyzer;
    use crate::fetcher::PageFetcher;
    use crate::models::{AnalyzerKind, FetchedPage, Fragment, Payload, ReadabilityMetrics};
    use crate::orchestrator::ScanSettings;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;
    use url::Url;

    struct StubFetcher;

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
            if url.host_str() == Some("down.example") {
                return Err(FetchError::Connect("connection refused".to_string()));
            }
            Ok(FetchedPage {
                url: url.to_string(),
                html: "<p>Hello</p>".to_string(),
                screenshot: None,
                fetched_at: Utc::now(),
            })
        }
    }

    struct StubReadability;

    #[async_trait]
    impl PageAnalyzer for StubReadability {
        fn kind(&self) -> AnalyzerKind {
            AnalyzerKind::Readability
        }

        async fn analyze(&self, _page: &FetchedPage) -> Result<Fragment, AnalyzerError> {
            Ok(Fragment::scored(
                AnalyzerKind::Readability,
                90.0,
                vec![],
                Payload::Readability(ReadabilityMetrics {
                    flesch_score: 90.0,
                    grade_level: "5th grade".to_string(),
                    issues: vec![],
                }),
            ))
        }
    }

    fn app() -> Router {
        let orchestrator = ScanOrchestrator::new(
            Arc::new(StubFetcher),
            vec![Arc::new(StubReadability)],
            Arc::new(MemoryStore::new()),
            ScanSettings {
                analyzer_timeout: Duration::from_secs(1),
                deadline: Duration::from_secs(5),
                max_recommendations: 8,
            },
        );
        router(AppState::new(orchestrator))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(&app(), "GET", "/api/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_scan_lifecycle() {
        let app = app();

        let (status, created) = send(
            &app,
            "POST",
            "/api/scan",
            Some(serde_json::json!({ "url": "https://example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["success"], true);
        assert_eq!(created["data"]["scores"]["overall"], 90.0);
        assert_eq!(created["data"]["scores"]["readability"], 90.0);
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, fetched) = send(&app, "GET", &format!("/api/results/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["data"], created["data"]);

        let (_, listed) = send(&app, "GET", "/api/results", None).await;
        assert_eq!(listed["data"].as_array().map(Vec::len), Some(1));

        let (status, deleted) = send(&app, "DELETE", &format!("/api/results/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted, serde_json::json!({ "success": true }));

        let (status, missing) = send(&app, "GET", &format!("/api/results/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(missing["success"], false);
        assert_eq!(missing["error"], "not found");

        let (status, _) = send(&app, "DELETE", &format!("/api/results/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_requests_are_typed() {
        let app = app();

        let (status, body) = send(
            &app,
            "POST",
            "/api/scan",
            Some(serde_json::json!({ "url": "javascript:alert(1)" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
        assert_eq!(body["retryable"], false);

        let (status, body) = send(&app, "POST", "/api/scan", Some(serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_malformed_result_id_is_not_found() {
        let app = app();

        for method in ["GET", "DELETE"] {
            let (status, body) = send(&app, method, "/api/results/not-a-uuid", None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method}");
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], "not found");
            assert_eq!(body["kind"], "not_found");
        }
    }

    #[tokio::test]
    async fn test_fetch_failure_is_retryable_bad_gateway() {
        let (status, body) = send(
            &app(),
            "POST",
            "/api/scan",
            Some(serde_json::json!({ "url": "https://down.example/" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "fetch_connect");
        assert_eq!(body["retryable"], true);
    }
}
