use std::{sync::Arc, time::Duration};

use serde_json::{json, Value};
use shared_logging::LogLevel;
use thiserror::Error;
use tracing::warn;

use crate::{
    error::ExternalServiceError,
    generative::{GenerativeAdapter, QUIZ_PROMPT},
    telemetry::PipelineTelemetry,
    types::QuizQuestion,
};

/// Content-independent questions used whenever the external path is not taken or fails.
pub const HEURISTIC_QUESTIONS: [&str; 2] = [
    "Did you understand the main condition mentioned?",
    "Are you clear on the next steps?",
];

/// Fixed heuristic question pair.
#[must_use]
pub fn heuristic_questions() -> Vec<QuizQuestion> {
    HEURISTIC_QUESTIONS
        .iter()
        .map(|question| QuizQuestion::yes_no(*question))
        .collect()
}

/// Reasons a model answer could not be turned into questions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuizParseError {
    /// No bracketed span decoded as a JSON array.
    #[error("no JSON array found in model output")]
    NoArray,
    /// The array decoded but held no questions.
    #[error("model returned an empty question list")]
    Empty,
    /// An element was not a usable yes/no question.
    #[error("question {index} is invalid: {reason}")]
    InvalidQuestion {
        /// Element position.
        index: usize,
        /// What was wrong.
        reason: &'static str,
    },
}

/// Parses free-form model output into questions.
///
/// The first bracketed span that decodes as a JSON array is used. Any invalid element
/// rejects the whole answer, so a partial list is never returned.
pub fn parse_questions(raw: &str) -> Result<Vec<QuizQuestion>, QuizParseError> {
    let items = first_json_array(raw).ok_or(QuizParseError::NoArray)?;
    if items.is_empty() {
        return Err(QuizParseError::Empty);
    }
    items
        .iter()
        .enumerate()
        .map(|(index, item)| question_from_value(index, item))
        .collect()
}

fn first_json_array(raw: &str) -> Option<Vec<Value>> {
    raw.match_indices('[').find_map(|(open, _)| {
        let close = balanced_close(raw, open)?;
        match serde_json::from_str::<Value>(&raw[open..=close]) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        }
    })
}

/// Byte offset of the `]` closing the `[` at `open`, skipping string literals.
fn balanced_close(raw: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in raw.as_bytes()[open..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn question_from_value(index: usize, value: &Value) -> Result<QuizQuestion, QuizParseError> {
    let invalid = |reason| QuizParseError::InvalidQuestion { index, reason };
    let (text, kind) = match value {
        Value::String(text) => (text.as_str(), None),
        Value::Object(map) => {
            let text = map
                .get("q")
                .or_else(|| map.get("question"))
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("missing question text"))?;
            (text, map.get("type").or_else(|| map.get("kind")))
        }
        _ => return Err(invalid("not an object or string")),
    };
    if let Some(kind) = kind {
        let is_yes_no = kind
            .as_str()
            .is_some_and(|k| k.eq_ignore_ascii_case("yesno"));
        if !is_yes_no {
            return Err(invalid("unsupported question type"));
        }
    }
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid("blank question text"));
    }
    Ok(QuizQuestion::yes_no(text))
}

/// Produces comprehension questions for a simplified text.
pub struct QuizGenerator {
    adapter: Option<Arc<dyn GenerativeAdapter>>,
    timeout: Duration,
    telemetry: Option<PipelineTelemetry>,
}

impl std::fmt::Debug for QuizGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuizGenerator")
            .field("external", &self.adapter.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl QuizGenerator {
    /// Creates a generator. Without an adapter only heuristic questions are produced.
    #[must_use]
    pub fn new(adapter: Option<Arc<dyn GenerativeAdapter>>, timeout: Duration) -> Self {
        Self {
            adapter,
            timeout,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Option<PipelineTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Returns questions about `simplified_text`. Never fails.
    ///
    /// The heuristic pair is returned when the external path is not preferred, not
    /// configured, fails, or answers with something unparsable. Externally sourced
    /// lists carry whatever count the model produced.
    pub async fn generate_quiz(
        &self,
        simplified_text: &str,
        prefer_external: bool,
    ) -> Vec<QuizQuestion> {
        let adapter = match &self.adapter {
            Some(adapter) if prefer_external => adapter,
            _ => return self.heuristic("local"),
        };
        let raw = match tokio::time::timeout(
            self.timeout,
            adapter.generate(&QUIZ_PROMPT, simplified_text),
        )
        .await
        {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => return self.external_failed(&err),
            Err(_) => {
                return self.external_failed(&ExternalServiceError::Timeout {
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        };
        match parse_questions(&raw) {
            Ok(questions) => {
                self.emit(
                    LogLevel::Info,
                    "quiz.completed",
                    json!({ "source": "external", "count": questions.len() }),
                );
                questions
            }
            Err(err) => {
                warn!(error = %err, "quiz answer unparsable; using heuristic questions");
                self.emit(
                    LogLevel::Warn,
                    "quiz.parse_failed",
                    json!({ "reason": err.to_string() }),
                );
                self.heuristic("fallback")
            }
        }
    }

    fn external_failed(&self, err: &ExternalServiceError) -> Vec<QuizQuestion> {
        warn!(error = %err, "quiz generation failed; using heuristic questions");
        self.emit(
            LogLevel::Warn,
            "quiz.external_failed",
            json!({ "error": err.to_string() }),
        );
        self.heuristic("fallback")
    }

    fn heuristic(&self, source: &str) -> Vec<QuizQuestion> {
        let questions = heuristic_questions();
        self.emit(
            LogLevel::Info,
            "quiz.completed",
            json!({ "source": source, "count": questions.len() }),
        );
        questions
    }

    fn emit(&self, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{orchestrator::tests::ScriptedAdapter, types::QuestionKind};

    fn texts(questions: &[QuizQuestion]) -> Vec<&str> {
        questions.iter().map(|q| q.question.as_str()).collect()
    }

    fn generator(adapter: Arc<ScriptedAdapter>) -> QuizGenerator {
        QuizGenerator::new(
            Some(adapter as Arc<dyn GenerativeAdapter>),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn parses_array_embedded_in_prose() {
        let raw = r#"Sure! Here are your questions:
```json
[{"q": "Is your blood pressure high?", "type": "yesno"}, {"q": "Should you take medicine daily?", "type": "yesno"}]
```
Let me know [if] you need more."#;
        let questions = parse_questions(raw).unwrap();
        assert_eq!(
            texts(&questions),
            vec!["Is your blood pressure high?", "Should you take medicine daily?"]
        );
        assert!(questions.iter().all(|q| q.kind == QuestionKind::YesNo));
    }

    #[test]
    fn skips_bracketed_prose_before_the_array() {
        let raw = r#"[Note] answers below: ["Do you feel ready?", {"question": "Any [questions] left?"}]"#;
        let questions = parse_questions(raw).unwrap();
        assert_eq!(texts(&questions), vec!["Do you feel ready?", "Any [questions] left?"]);
    }

    #[test]
    fn rejects_partial_lists() {
        let raw = r#"[{"q": "Fine?", "type": "yesno"}, {"q": "Pick one", "type": "multiple"}]"#;
        assert_eq!(
            parse_questions(raw),
            Err(QuizParseError::InvalidQuestion {
                index: 1,
                reason: "unsupported question type"
            })
        );
        assert_eq!(
            parse_questions(r#"[{"q": "ok?"}, 42]"#),
            Err(QuizParseError::InvalidQuestion {
                index: 1,
                reason: "not an object or string"
            })
        );
    }

    #[test]
    fn rejects_missing_or_empty_arrays() {
        assert_eq!(parse_questions("no structure here"), Err(QuizParseError::NoArray));
        assert_eq!(parse_questions("[unclosed"), Err(QuizParseError::NoArray));
        assert_eq!(parse_questions("[]"), Err(QuizParseError::Empty));
    }

    #[tokio::test]
    async fn local_preference_returns_fixed_pair() {
        let adapter = ScriptedAdapter::ok(r#"[{"q": "unused?"}]"#);
        let questions = generator(adapter.clone())
            .generate_quiz("Any text at all.", false)
            .await;
        assert_eq!(texts(&questions), HEURISTIC_QUESTIONS.to_vec());
        assert!(questions.iter().all(|q| q.kind == QuestionKind::YesNo));
        assert_eq!(adapter.calls(), 0);
    }

    #[tokio::test]
    async fn unconfigured_generator_returns_fixed_pair() {
        let questions = QuizGenerator::new(None, Duration::from_secs(1))
            .generate_quiz("Some text.", true)
            .await;
        assert_eq!(questions, heuristic_questions());
    }

    #[tokio::test]
    async fn external_questions_are_used_when_parsable() {
        let adapter = ScriptedAdapter::ok(
            r#"[{"q":"Is it serious?","type":"yesno"},{"q":"Will you rest?","type":"yesno"},{"q":"Extra?","type":"yesno"}]"#,
        );
        let questions = generator(adapter).generate_quiz("Text.", true).await;
        assert_eq!(questions.len(), 3);
        assert_eq!(questions[0].question, "Is it serious?");
    }

    #[tokio::test]
    async fn malformed_answer_falls_back() {
        let adapter = ScriptedAdapter::ok("I think the patient should rest.");
        let questions = generator(adapter).generate_quiz("Text.", true).await;
        assert_eq!(questions, heuristic_questions());
    }

    #[tokio::test]
    async fn adapter_errors_and_timeouts_fall_back() {
        let failing = ScriptedAdapter::failing(ExternalServiceError::Status {
            status: 429,
            body: "rate limited".into(),
        });
        assert_eq!(
            generator(failing).generate_quiz("Text.", true).await,
            heuristic_questions()
        );
        assert_eq!(
            generator(ScriptedAdapter::hanging())
                .generate_quiz("Text.", true)
                .await,
            heuristic_questions()
        );
    }
}
