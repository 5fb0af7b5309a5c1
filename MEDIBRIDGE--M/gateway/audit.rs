use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use medibridge_simplifier::SimplificationResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shared_logging::JsonLogger;
use tracing::{debug, warn};

/// Characters of original/simplified text kept in a simplify record.
pub const PREVIEW_CHARS: usize = 100;

/// One audit line: a type tag, a timestamp, and free-form fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record type, e.g. `simplify` or `quiz_response`.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Time the gateway accepted the record.
    pub timestamp: DateTime<Utc>,
    /// Remaining fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AuditRecord {
    /// Record for a completed simplification.
    #[must_use]
    pub fn simplification(original: &str, result: &SimplificationResult) -> Self {
        let mut fields = Map::new();
        fields.insert("original".into(), preview(original).into());
        fields.insert("simplified".into(), preview(&result.simplified_text).into());
        fields.insert("model".into(), result.model.clone().into());
        Self {
            kind: "simplify".into(),
            timestamp: Utc::now(),
            fields,
        }
    }

    /// Record for a client-reported action; any client `timestamp` is replaced.
    #[must_use]
    pub fn user_action(mut payload: Map<String, Value>) -> Self {
        payload.remove("timestamp");
        let kind = match payload.remove("type") {
            Some(Value::String(kind)) if !kind.trim().is_empty() => kind,
            _ => default_kind(),
        };
        Self {
            kind,
            timestamp: Utc::now(),
            fields: payload,
        }
    }
}

/// Append-only audit trail. Write failures are logged and swallowed.
#[derive(Debug)]
pub struct AuditTrail {
    logger: JsonLogger,
}

impl AuditTrail {
    /// Creates a trail writing to `primary`, or `fallback` when `primary` is unwritable.
    #[must_use]
    pub fn new(primary: impl Into<PathBuf>, fallback: impl Into<PathBuf>) -> Self {
        Self {
            logger: JsonLogger::with_fallback(primary, fallback),
        }
    }

    /// Appends a record. Returns whether any location accepted it.
    pub fn append(&self, record: &AuditRecord) -> bool {
        match self.logger.append(record) {
            Ok(path) => {
                debug!(kind = %record.kind, path = %path.display(), "audit record appended");
                true
            }
            Err(err) => {
                warn!(kind = %record.kind, error = %format!("{err:#}"), "audit record dropped");
                false
            }
        }
    }

    /// All readable records, malformed lines skipped.
    pub fn entries(&self) -> Result<Vec<AuditRecord>> {
        self.logger.read_records()
    }
}

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn default_kind() -> String {
    "user_action".into()
}
