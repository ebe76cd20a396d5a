//! Recovery of a JSON document from free-form model output.
//!
//! Models are asked for bare JSON but routinely wrap it in a ```json fence or
//! surround it with commentary. Extraction tries, in order: the fenced block
//! (or the whole text when there is none), then the widest `{ ... }` span.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const PREVIEW_CHARS: usize = 200;

/// No parseable JSON document could be derived from the model response.
#[derive(Debug, Error)]
#[error("{source} (payload starts with {preview:?})")]
pub struct ExtractionError {
    source: serde_json::Error,
    preview: String,
}

impl ExtractionError {
    fn new(source: serde_json::Error, candidate: &str) -> Self {
        Self {
            source,
            preview: candidate.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

fn fenced_json() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?is)```json\s*(.*?)\s*```").expect("fence pattern is valid"))
}

/// Extract a single JSON document from raw model output.
pub fn extract_payload(raw: &str) -> Result<Value, ExtractionError> {
    let candidate = match fenced_json().captures(raw).and_then(|c| c.get(1)) {
        Some(inner) => {
            debug!("Found fenced JSON block ({} chars)", inner.as_str().len());
            inner.as_str()
        }
        None => raw,
    };

    let err = match serde_json::from_str(candidate) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    match (candidate.find('{'), candidate.rfind('}')) {
        (Some(first), Some(last)) if first < last => {
            debug!("Direct parse failed ({}), retrying on brace span {}..={}", err, first, last);
            let span = &candidate[first..=last];
            serde_json::from_str(span).map_err(|e| ExtractionError::new(e, span))
        }
        _ => Err(ExtractionError::new(err, candidate)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({"processes": [{"name": "Billing", "subprocesses": []}]})
    }

    #[test]
    fn test_bare_fenced_and_wrapped_agree() {
        let bare = r#"{"processes": [{"name": "Billing", "subprocesses": []}]}"#;
        let fenced = format!("Here you go:\n```json\n{}\n```\nLet me know!", bare);
        let wrapped = format!("Sure! The decomposition is {} and that is all.", bare);

        assert_eq!(extract_payload(bare).unwrap(), sample());
        assert_eq!(extract_payload(&fenced).unwrap(), sample());
        assert_eq!(extract_payload(&wrapped).unwrap(), sample());
    }

    #[test]
    fn test_fence_tag_is_case_insensitive() {
        let raw = "```JSON\n{\"processes\": []}\n```";
        assert_eq!(extract_payload(raw).unwrap(), json!({"processes": []}));
    }

    #[test]
    fn test_fenced_block_with_commentary_inside() {
        let raw = "```json\nResult: {\"processes\": []} (done)\n```";
        assert_eq!(extract_payload(raw).unwrap(), json!({"processes": []}));
    }

    #[test]
    fn test_untagged_fence_falls_back_to_braces() {
        let raw = "```\n{\"processes\": []}\n```";
        assert_eq!(extract_payload(raw).unwrap(), json!({"processes": []}));
    }

    #[test]
    fn test_no_braces_fails() {
        assert!(extract_payload("I could not analyze this specification.").is_err());
        assert!(extract_payload("").is_err());
        assert!(extract_payload("} backwards {").is_err());
    }

    #[test]
    fn test_broken_json_inside_braces_fails() {
        let err = extract_payload("prefix {\"processes\": [} suffix").unwrap_err();
        assert!(err.to_string().contains("processes"));
    }
}
