//! Specification analysis pipeline.
//!
//! source text → JSON extraction → normalization → atomic persistence.
//! The upstream call finishes before the store is touched, so a slow or
//! failing model never holds the store lock.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::extractor::extract_payload;
use crate::normalizer::normalize;
use crate::openrouter::{CompletionProvider, Message};
use crate::schema::{Hierarchy, ProcessNode};
use crate::store::Store;

/// Advisory limits stated in the upstream prompt. Not enforced on input.
pub const MAX_PROCESSES: usize = 6;
pub const MAX_SUBPROCESSES_PER_PROCESS: usize = 6;
pub const MAX_USE_CASES_PER_SUBPROCESS: usize = 8;

/// Where the structured document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Upstream,
    Mock,
    Supplied,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzeRequest {
    pub spec_text: String,
    /// Overrides the configured model for this request.
    pub model: Option<String>,
    /// A ready-made document that skips the upstream call.
    pub document: Option<Value>,
    /// Skip the upstream call; with no document the hierarchy is empty.
    pub mock: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub id: String,
    pub spec_hash: String,
    pub source: Source,
    pub model: String,
    pub parsed: Hierarchy,
    pub inserted: Vec<ProcessNode>,
}

/// Pipeline orchestrator.
#[derive(Clone)]
pub struct Analyzer {
    provider: Option<Arc<dyn CompletionProvider>>,
    store: Store,
    default_model: String,
}

impl Analyzer {
    pub fn new(
        provider: Option<Arc<dyn CompletionProvider>>,
        store: Store,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            store,
            default_model: default_model.into(),
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<Analysis, AppError> {
        let spec_text = request.spec_text.trim();
        if spec_text.is_empty() {
            return Err(AppError::InvalidRequest("specText is required".to_string()));
        }

        let model = request
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.default_model.clone());

        let id = format!("ana_{}", Uuid::new_v4().simple());
        let spec_hash = {
            let mut hasher = Sha256::new();
            hasher.update(spec_text.as_bytes());
            format!("{:x}", hasher.finalize())
        };

        info!(
            "Starting analysis {} ({} chars, hash={}, model={})",
            id,
            spec_text.len(),
            &spec_hash[..12],
            model
        );

        let (source, document) = if request.mock {
            (Source::Mock, request.document.unwrap_or_else(|| json!({ "processes": [] })))
        } else if let Some(document) = request.document {
            (Source::Supplied, document)
        } else {
            let provider = self.provider.as_ref().ok_or_else(|| {
                AppError::Configuration(
                    "OPENROUTER_API_KEY is not set; use /api/analyze/mock to try the pipeline without a model"
                        .to_string(),
                )
            })?;

            let raw = provider.complete(&model, build_messages(spec_text)).await?;
            debug!("Raw model response length: {} chars", raw.len());
            (Source::Upstream, extract_payload(&raw)?)
        };

        let parsed = normalize(&document);
        let (processes, subprocesses, use_cases) = parsed.row_counts();
        debug!(
            "Normalized hierarchy: {} processes, {} subprocesses, {} use cases",
            processes, subprocesses, use_cases
        );

        let store = self.store.clone();
        let hierarchy = parsed.clone();
        let inserted = tokio::task::spawn_blocking(move || store.persist(&hierarchy)).await??;

        info!("Analysis {} persisted {} processes", id, inserted.len());

        Ok(Analysis {
            id,
            spec_hash,
            source,
            model,
            parsed,
            inserted,
        })
    }

    pub async fn tree(&self) -> Result<Vec<ProcessNode>, AppError> {
        let store = self.store.clone();
        Ok(tokio::task::spawn_blocking(move || store.read_all()).await??)
    }

    pub async fn reset(&self) -> Result<(), AppError> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.reset_all()).await??;
        info!("Store reset");
        Ok(())
    }
}

/// Build the system instruction and user prompt for one specification.
pub fn build_messages(spec_text: &str) -> Vec<Message> {
    let system = [
        "You are a senior requirements analyst.".to_string(),
        "Return ONLY valid JSON matching this schema:".to_string(),
        r#"{ "processes": [ { "name": "string", "description": "string", "subprocesses": [ { "name": "string", "description": "string", "use_cases": [ { "name": "string", "description": "string", "primary_actor": "string", "kind": 1, "preconditions": "string", "postconditions": "string", "acceptance_criteria": "string" } ] } ] } ] }"#.to_string(),
        "Rules:".to_string(),
        "- kind: 1=Functional, 2=Non-functional, 3=System".to_string(),
        format!(
            "- At most {} processes, {} subprocesses per process and {} use cases per subprocess.",
            MAX_PROCESSES, MAX_SUBPROCESSES_PER_PROCESS, MAX_USE_CASES_PER_SUBPROCESS
        ),
        "- Do not include comments, markdown or any text outside the JSON.".to_string(),
    ]
    .join("\n");

    let user = format!(
        "User specification:\n\n{}\n\nReturn the requested JSON.",
        spec_text
    );

    vec![Message::system(system), Message::user(user)]
}

/// Fixed one-process, one-subprocess, one-use-case document for exercising
/// the pipeline without a model.
pub fn mock_document() -> Value {
    json!({
        "processes": [{
            "name": "Demo process",
            "description": "Generated without AI (mock)",
            "subprocesses": [{
                "name": "Demo subprocess",
                "description": "Mock",
                "use_cases": [{
                    "name": "UC-001 Demo",
                    "description": "Simulated use case",
                    "primary_actor": "User",
                    "kind": 1,
                    "preconditions": "Authenticated",
                    "postconditions": "Saved",
                    "acceptance_criteria": "OK"
                }]
            }]
        }]
    })
}
