//! Lowering of untrusted JSON into a [`Hierarchy`].
//!
//! Normalization never fails: missing collections become empty, missing names
//! get a per-level placeholder, optional text becomes `None` rather than `""`,
//! and `kind` is coerced into the closed range of [`UseCaseKind`].
//!
//! Both the English field names and the original Spanish schema
//! (`procesos`, `nombre`, `casos_uso`, ...) are accepted; English wins when
//! both are present.

use serde_json::Value;

use crate::schema::{Hierarchy, ProcessDraft, SubprocessDraft, UseCaseDraft, UseCaseKind};

pub const PROCESS_PLACEHOLDER: &str = "Process";
pub const SUBPROCESS_PLACEHOLDER: &str = "Subprocess";
pub const USE_CASE_PLACEHOLDER: &str = "Use case";

const PROCESSES: &[&str] = &["processes", "procesos"];
const SUBPROCESSES: &[&str] = &["subprocesses", "subprocesos"];
const USE_CASES: &[&str] = &["use_cases", "casos_uso"];
const NAME: &[&str] = &["name", "nombre"];
const DESCRIPTION: &[&str] = &["description", "descripcion"];
const PRIMARY_ACTOR: &[&str] = &["primary_actor", "actor_principal"];
const KIND: &[&str] = &["kind", "tipo_caso_uso"];
const PRECONDITIONS: &[&str] = &["preconditions", "precondiciones"];
const POSTCONDITIONS: &[&str] = &["postconditions", "postcondiciones"];
const ACCEPTANCE_CRITERIA: &[&str] = &["acceptance_criteria", "criterios_de_aceptacion"];

/// Normalize an arbitrary document into a hierarchy.
pub fn normalize(doc: &Value) -> Hierarchy {
    Hierarchy {
        processes: items(doc, PROCESSES).map(normalize_process).collect(),
    }
}

fn normalize_process(value: &Value) -> ProcessDraft {
    ProcessDraft {
        name: text(value, NAME).unwrap_or_else(|| PROCESS_PLACEHOLDER.to_string()),
        description: text(value, DESCRIPTION),
        subprocesses: items(value, SUBPROCESSES).map(normalize_subprocess).collect(),
    }
}

fn normalize_subprocess(value: &Value) -> SubprocessDraft {
    SubprocessDraft {
        name: text(value, NAME).unwrap_or_else(|| SUBPROCESS_PLACEHOLDER.to_string()),
        description: text(value, DESCRIPTION),
        use_cases: items(value, USE_CASES).map(normalize_use_case).collect(),
    }
}

fn normalize_use_case(value: &Value) -> UseCaseDraft {
    UseCaseDraft {
        name: text(value, NAME).unwrap_or_else(|| USE_CASE_PLACEHOLDER.to_string()),
        description: text(value, DESCRIPTION),
        primary_actor: text(value, PRIMARY_ACTOR),
        kind: coerce_kind(field(value, KIND)),
        preconditions: text(value, PRECONDITIONS),
        postconditions: text(value, POSTCONDITIONS),
        acceptance_criteria: text(value, ACCEPTANCE_CRITERIA),
    }
}

// ============================================================================
// Field access helpers
// ============================================================================

/// First present, non-null field among `keys`.
fn field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = value.as_object()?;
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

/// Elements of a collection field; anything other than an array is empty.
fn items<'a>(value: &'a Value, keys: &[&str]) -> impl Iterator<Item = &'a Value> {
    field(value, keys)
        .and_then(Value::as_array)
        .map(|arr| arr.iter())
        .into_iter()
        .flatten()
}

/// Optional text field. Blank strings and `false` are absence.
fn text(value: &Value, keys: &[&str]) -> Option<String> {
    let rendered = match field(value, keys)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) | Value::Null => return None,
        Value::Array(arr) if arr.iter().all(Value::is_string) => arr
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    };

    if rendered.is_empty() {
        None
    } else {
        Some(rendered)
    }
}

/// Numeric coercion of a `kind` value. Absent and null both mean 1.
fn coerce_kind(value: Option<&Value>) -> UseCaseKind {
    let number = match value {
        None | Some(Value::Null) => return UseCaseKind::Functional,
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(f64::NAN)
            }
        }
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Array(arr)) => match arr.as_slice() {
            [] => 0.0,
            [single] => return coerce_kind(Some(single)),
            _ => f64::NAN,
        },
        Some(Value::Object(_)) => f64::NAN,
    };
    UseCaseKind::clamped(number)
}
