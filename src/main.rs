//! Req Analyzer - decomposes specifications into processes, subprocesses and use cases.

mod analyzer;
mod config;
mod error;
mod extractor;
mod normalizer;
mod openrouter;
mod schema;
mod store;

use std::sync::Arc;

use analyzer::{Analysis, AnalyzeRequest, Analyzer};
use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Query, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use config::Config;
use error::AppError;
use openrouter::{CompletionProvider, OpenRouterClient};
use schema::ProcessNode;
use serde::Deserialize;
use serde_json::{json, Value};
use store::Store;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MOCK_SPEC_TEXT: &str = "Sample specification";

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    analyzer: Analyzer,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "req_analyzer=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if let Some(parent) = config.database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {:?}", parent))?;
    }
    let store = Store::open(&config.database_path)
        .with_context(|| format!("Failed to open database {:?}", config.database_path))?;

    let provider: Option<Arc<dyn CompletionProvider>> = match &config.openrouter_api_key {
        Some(key) => {
            let client = OpenRouterClient::new(key.clone(), config.upstream_timeout)?;
            info!("OpenRouter client initialized (model={})", config.model);
            Some(Arc::new(client))
        }
        None => {
            warn!("OPENROUTER_API_KEY not set; only /api/analyze/mock and supplied documents will work");
            None
        }
    };

    let state = AppState {
        analyzer: Analyzer::new(provider, store, config.model.clone()),
    };

    let app = router(state, config.body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/api/ping", get(ping))
        .route("/api/analyze", post(analyze))
        .route("/api/analyze/mock", post(analyze_mock))
        .route("/api/tree", get(tree))
        .route("/api/reset", delete(reset))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check with upstream configuration status.
async fn ping(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ok": true,
        "message": "pong",
        "env": {
            "hasKey": state.analyzer.has_provider(),
            "model": state.analyzer.default_model(),
        }
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBody {
    spec_text: Option<String>,
    model: Option<String>,
    parsed: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeQuery {
    mock: Option<String>,
}

#[derive(serde::Serialize)]
struct AnalyzeResponse {
    ok: bool,
    #[serde(flatten)]
    analysis: Analysis,
}

/// Analyze a specification and persist the resulting hierarchy.
async fn analyze(
    State(state): State<AppState>,
    Query(query): Query<AnalyzeQuery>,
    payload: Result<Json<AnalyzeBody>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    // Malformed bodies get the same structured 400 as a blank specText.
    let Json(body) = payload.map_err(|rejection| {
        AppError::InvalidRequest(format!("specText is required ({})", rejection.body_text()))
    })?;

    let request = AnalyzeRequest {
        spec_text: body.spec_text.unwrap_or_default(),
        model: body.model,
        document: body.parsed,
        mock: query.mock.as_deref() == Some("1"),
    };

    let analysis = state.analyzer.analyze(request).await?;
    Ok(Json(AnalyzeResponse { ok: true, analysis }))
}

/// Run the pipeline on the fixed mock hierarchy.
async fn analyze_mock(
    State(state): State<AppState>,
    body: Option<Json<AnalyzeBody>>,
) -> Result<Json<AnalyzeResponse>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let spec_text = body
        .spec_text
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| MOCK_SPEC_TEXT.to_string());

    let request = AnalyzeRequest {
        spec_text,
        model: body.model,
        document: Some(analyzer::mock_document()),
        mock: true,
    };

    let analysis = state.analyzer.analyze(request).await?;
    Ok(Json(AnalyzeResponse { ok: true, analysis }))
}

/// Return every stored process with its nested subprocesses and use cases.
async fn tree(State(state): State<AppState>) -> Result<Json<Vec<ProcessNode>>, AppError> {
    Ok(Json(state.analyzer.tree().await?))
}

/// Delete everything.
async fn reset(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.analyzer.reset().await?;
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_app() -> Router {
        let store = Store::open_in_memory().unwrap();
        let state = AppState {
            analyzer: Analyzer::new(None, store, "test/model".to_string()),
        };
        router(state, 1024 * 1024)
    }

    async fn post_analyze(request: Request<Body>) -> (StatusCode, Value) {
        let response = test_app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).expect("JSON error body");
        (status, body)
    }

    fn json_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_rejects_bad_bodies_with_structured_error() {
        let no_body = Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .body(Body::empty())
            .unwrap();

        let cases = [
            ("number", json_request(r#"{"specText": 42}"#)),
            ("missing", json_request(r#"{"model": "x"}"#)),
            ("malformed", json_request("{not json")),
            ("no body", no_body),
        ];

        for (label, request) in cases {
            let (status, body) = post_analyze(request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "case: {}", label);
            assert_eq!(body["error"]["code"], "INVALID_REQUEST", "case: {}", label);
            assert!(
                body["error"]["message"].as_str().unwrap().contains("specText"),
                "case: {}",
                label
            );
        }
    }

    #[tokio::test]
    async fn test_analyze_supplied_document() {
        let (status, body) = post_analyze(json_request(
            r#"{"specText": "Sales", "parsed": {"processes": [{"name": "Sell"}]}}"#,
        ))
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["inserted"][0]["name"], "Sell");
    }
}
