use serde::{Deserialize, Serialize};

use crate::dictionary::DictionaryEntry;

/// Model label reported for results produced without the external service.
pub const LOCAL_MODEL: &str = "local";

/// Which code path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    /// Dictionary-driven rewrite.
    Local,
    /// Generative service output.
    External,
}

/// Coarse provenance label. Fixed per path, not derived from the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Reserved for degraded paths.
    Low,
    /// Local rewrite.
    Medium,
    /// External rewrite.
    High,
}

/// Output of a single simplification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplificationResult {
    /// Rewritten text.
    pub simplified_text: String,
    /// Path that produced the text.
    pub source: ResultSource,
    /// Provenance label.
    pub confidence: Confidence,
    /// Wall-clock duration measured by the orchestrator.
    pub elapsed_ms: u64,
    /// `local` or the external model name.
    pub model: String,
    /// Canonical terms explained by the local path, in first-match order.
    #[serde(default)]
    pub matched_terms: Vec<String>,
}

impl SimplificationResult {
    /// Result of the local path.
    #[must_use]
    pub fn local(simplified_text: String, matched_terms: Vec<String>) -> Self {
        Self {
            simplified_text,
            source: ResultSource::Local,
            confidence: Confidence::Medium,
            elapsed_ms: 0,
            model: LOCAL_MODEL.into(),
            matched_terms,
        }
    }

    /// Result of the external path; the text is kept verbatim.
    #[must_use]
    pub fn external(simplified_text: String, model: impl Into<String>) -> Self {
        Self {
            simplified_text,
            source: ResultSource::External,
            confidence: Confidence::High,
            elapsed_ms: 0,
            model: model.into(),
            matched_terms: Vec::new(),
        }
    }
}

/// Supported question kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionKind {
    /// Yes/no prompt.
    #[serde(rename = "yesno")]
    YesNo,
}

/// Comprehension prompt shown after a simplification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    /// Prompt text.
    #[serde(rename = "q", alias = "question")]
    pub question: String,
    /// Always `yesno`.
    #[serde(rename = "type", alias = "kind")]
    pub kind: QuestionKind,
}

impl QuizQuestion {
    /// Creates a yes/no question.
    #[must_use]
    pub fn yes_no(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            kind: QuestionKind::YesNo,
        }
    }
}

/// Explanation collected for one matched term on the local path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplanationEntry {
    /// Canonical dictionary term.
    pub term: String,
    /// Lay replacement.
    pub plain_synonym: String,
    /// Ordered explanation sentences.
    pub explanation_lines: Vec<String>,
}

impl From<&DictionaryEntry> for ExplanationEntry {
    fn from(entry: &DictionaryEntry) -> Self {
        Self {
            term: entry.term.clone(),
            plain_synonym: entry.plain_synonym.clone(),
            explanation_lines: entry.explanation_lines.clone(),
        }
    }
}
