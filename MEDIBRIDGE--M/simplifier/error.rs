use thiserror::Error;

/// Caller input problems. Surfaced immediately; no fallback is attempted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Field absent from the request.
    #[error("{field} is required")]
    MissingField {
        /// Name of the request field.
        field: &'static str,
    },
    /// Field present but blank.
    #[error("{field} must not be empty")]
    EmptyField {
        /// Name of the request field.
        field: &'static str,
    },
}

/// Failures of the external generative service.
///
/// Always recovered by the pipeline (local rewrite or heuristic quiz); never surfaced to
/// the end caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExternalServiceError {
    /// No adapter or credential is available.
    #[error("generative service not configured")]
    NotConfigured,
    /// Connection, TLS, or request construction failure.
    #[error("transport failure: {0}")]
    Transport(String),
    /// Non-2xx response.
    #[error("service returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Truncated response body.
        body: String,
    },
    /// Call did not finish in time.
    #[error("service call exceeded {timeout_ms} ms")]
    Timeout {
        /// Configured limit.
        timeout_ms: u64,
    },
    /// Body could not be decoded into generated text.
    #[error("malformed service response: {0}")]
    MalformedResponse(String),
}

/// Invalid custom dictionary definitions, rejected at load time.
#[derive(Debug, Error)]
pub enum DictionaryError {
    /// Entry with a blank term.
    #[error("dictionary entry {index} has an empty term")]
    EmptyTerm {
        /// Position in the input list.
        index: usize,
    },
    /// Entry with a blank plain synonym.
    #[error("term '{term}' has an empty plain synonym")]
    EmptySynonym {
        /// Offending term.
        term: String,
    },
    /// Entry without explanation lines.
    #[error("term '{term}' has no explanation lines")]
    EmptyExplanation {
        /// Offending term.
        term: String,
    },
    /// Two entries collide under case-insensitive comparison.
    #[error("term '{term}' is defined more than once")]
    DuplicateTerm {
        /// Offending term.
        term: String,
    },
    /// Term starts or ends with a character that cannot sit on a word boundary.
    #[error("term '{term}' must start and end with a letter or digit")]
    NonWordEdge {
        /// Offending term.
        term: String,
    },
    /// One term occurs as a whole word inside another.
    #[error("term '{term}' overlaps with '{other}'")]
    OverlappingTerms {
        /// Offending term.
        term: String,
        /// Earlier entry it collides with.
        other: String,
    },
    /// Match pattern failed to compile.
    #[error("term '{term}' produced an invalid pattern: {source}")]
    Pattern {
        /// Offending term.
        term: String,
        /// Underlying regex error.
        source: regex::Error,
    },
}

/// Returns the trimmed-non-empty text for a required request field.
pub fn require_text<'a>(
    field: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, ValidationError> {
    match value {
        None => Err(ValidationError::MissingField { field }),
        Some(text) if text.trim().is_empty() => Err(ValidationError::EmptyField { field }),
        Some(text) => Ok(text),
    }
}
