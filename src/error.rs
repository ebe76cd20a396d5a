//! Request-level errors and their HTTP rendering.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::extractor::ExtractionError;
use crate::openrouter::UpstreamError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),
    /// The upstream service is not configured; only the mock path is usable.
    #[error("{0}")]
    Configuration(String),
    #[error("upstream model call failed: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("could not extract a JSON document from the model response: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("store operation failed: {0}")]
    Persistence(#[from] rusqlite::Error),
    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Upstream(_) => "UPSTREAM_SERVICE_ERROR",
            Self::Extraction(_) => "EXTRACTION_ERROR",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
            Self::Task(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Configuration(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) | Self::Extraction(_) => StatusCode::BAD_GATEWAY,
            Self::Persistence(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{} ({})", self, self.code());
        }

        (
            status,
            Json(json!({
                "error": {
                    "code": self.code(),
                    "message": self.to_string(),
                }
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid = AppError::InvalidRequest("specText is required".to_string());
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert_eq!(invalid.code(), "INVALID_REQUEST");

        let upstream = AppError::from(UpstreamError::Status {
            status: 429,
            details: "rate limited".to_string(),
        });
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
        assert!(upstream.to_string().contains("rate limited"));

        let persistence = AppError::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(persistence.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(persistence.code(), "PERSISTENCE_ERROR");
        assert!(persistence.to_string().starts_with("store operation failed"));
    }

    #[test]
    fn test_response_status() {
        let response = AppError::Configuration("missing key".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
