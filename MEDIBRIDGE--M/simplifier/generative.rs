use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::{config::GenerativeSettings, error::ExternalServiceError};

/// Token replaced by the caller's text inside a prompt body.
pub const USER_TEXT_PLACEHOLDER: &str = "<<INSERT USER TEXT HERE>>";

/// Fixed prompt asset sent to the generative service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptTemplate {
    /// Short label used in logs.
    pub name: &'static str,
    /// System preamble.
    pub system: &'static str,
    /// User message body containing exactly one placeholder.
    pub body: &'static str,
    /// Completion length cap.
    pub max_tokens: u32,
}

impl PromptTemplate {
    /// Substitutes `text` into the placeholder.
    #[must_use]
    pub fn render(&self, text: &str) -> String {
        self.body.replacen(USER_TEXT_PLACEHOLDER, text, 1)
    }
}

/// Plain-language rewrite prompt.
pub const SIMPLIFY_PROMPT: PromptTemplate = PromptTemplate {
    name: "simplify",
    system: "You are a helpful medical assistant.",
    body: "SYSTEM:
You are MediBridge Assist, a professional medical text simplifier. Rewrite medical text into plain, respectful, patient-friendly language at about a 5th grade reading level. Keep the medical meaning accurate but use short sentences and common words, with at most 3 bullet points when steps are present. Keep the answer under 120 words unless asked for more. When the text mentions a medical term, put the simpler term first and the medical term in parentheses after its first occurrence. When the text contains procedure risks or consent language, add a short \"What this means\" section.
EXAMPLE:
User: \"The patient has a history of Hypertension and is at risk for Myocardial Infarction. Anesthesia will be administered prior to the procedure.\"
Assistant:
\"High blood pressure (hypertension). This patient may be more likely to have a heart attack (myocardial infarction). The team will give medicine to make you sleep during the operation (anesthesia).
What this means:
\t•\tWe will control blood pressure before surgery.
\t•\tYou will be asleep and not feel the procedure.
\t•\tTell the staff about any allergies.\"

INSTRUCTION:
Now simplify the user's text below into plain language suitable for patients. Keep the tone calm, respectful, and short.
User: <<INSERT USER TEXT HERE>>",
    max_tokens: 350,
};

/// Comprehension question prompt.
pub const QUIZ_PROMPT: PromptTemplate = PromptTemplate {
    name: "quiz",
    system: "Generate 2 simple Yes/No comprehension questions based on the text provided. Return them as a JSON array of objects with 'q' (question) and 'type' ('yesno').",
    body: "<<INSERT USER TEXT HERE>>",
    max_tokens: 100,
};

/// Seam to an external text-generation service. Stateless per call, no retries.
#[async_trait]
pub trait GenerativeAdapter: Send + Sync {
    /// Model label reported on results.
    fn model(&self) -> &str;

    /// Renders `template` with `text` and returns the generated completion.
    async fn generate(
        &self,
        template: &PromptTemplate,
        text: &str,
    ) -> Result<String, ExternalServiceError>;
}

/// OpenAI-compatible chat-completions adapter.
pub struct OpenAiChatAdapter {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout_ms: u64,
}

impl std::fmt::Debug for OpenAiChatAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatAdapter")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiChatAdapter {
    /// Builds the adapter; fails with `NotConfigured` when no API key is set.
    pub fn from_settings(settings: &GenerativeSettings) -> Result<Self, ExternalServiceError> {
        let api_key = settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ExternalServiceError::NotConfigured)?;
        let client = Client::builder()
            .user_agent("medibridge-simplifier/0.1")
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|err| ExternalServiceError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout_ms: settings.timeout_ms,
        })
    }

    /// Request payload for a template and input text.
    #[must_use]
    pub fn request_body(&self, template: &PromptTemplate, text: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": template.system },
                { "role": "user", "content": template.render(text) },
            ],
            "temperature": self.temperature,
            "max_tokens": template.max_tokens,
        })
    }

    fn transport_error(&self, err: &reqwest::Error) -> ExternalServiceError {
        if err.is_timeout() {
            ExternalServiceError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            ExternalServiceError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl GenerativeAdapter for OpenAiChatAdapter {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        template: &PromptTemplate,
        text: &str,
    ) -> Result<String, ExternalServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(template, text))
            .send()
            .await
            .map_err(|err| self.transport_error(&err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExternalServiceError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        let payload = response
            .json::<Value>()
            .await
            .map_err(|err| ExternalServiceError::MalformedResponse(err.to_string()))?;
        completion_text(&payload)
    }
}

/// Extracts `choices[0].message.content`, rejecting blank completions.
pub fn completion_text(payload: &Value) -> Result<String, ExternalServiceError> {
    let content = payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ExternalServiceError::MalformedResponse("missing choices[0].message.content".into())
        })?;
    if content.trim().is_empty() {
        return Err(ExternalServiceError::MalformedResponse(
            "empty completion".into(),
        ));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;

    /// Answers a single request with a fixed status line and body; returns the base URL.
    async fn canned_service(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut chunk = [0_u8; 4096];
            loop {
                let read = stream.read(&mut chunk).await.unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&chunk[..read]);
                if request_complete(&request) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        format!("http://{addr}/v1")
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        raw.len() >= header_end + 4 + content_length
    }

    fn adapter_for(base_url: String) -> OpenAiChatAdapter {
        OpenAiChatAdapter::from_settings(&GenerativeSettings {
            api_key: Some("sk-test".into()),
            base_url,
            timeout_ms: 5_000,
            ..GenerativeSettings::default()
        })
        .unwrap()
    }

    fn settings(api_key: Option<&str>) -> GenerativeSettings {
        GenerativeSettings {
            api_key: api_key.map(String::from),
            // nothing listens on the discard port
            base_url: "http://127.0.0.1:9/v1/".into(),
            timeout_ms: 2_000,
            ..GenerativeSettings::default()
        }
    }

    #[test]
    fn templates_carry_exactly_one_placeholder() {
        for template in [SIMPLIFY_PROMPT, QUIZ_PROMPT] {
            assert_eq!(template.body.matches(USER_TEXT_PLACEHOLDER).count(), 1);
        }
    }

    #[test]
    fn render_substitutes_literal_text() {
        let rendered = SIMPLIFY_PROMPT.render("Anesthesia <<INSERT USER TEXT HERE>> given.");
        assert!(rendered.ends_with("User: Anesthesia <<INSERT USER TEXT HERE>> given."));
        assert!(rendered.starts_with("SYSTEM:"));
        assert_eq!(QUIZ_PROMPT.render("plain text"), "plain text");
    }

    #[test]
    fn adapter_requires_api_key() {
        assert!(matches!(
            OpenAiChatAdapter::from_settings(&settings(None)),
            Err(ExternalServiceError::NotConfigured)
        ));
        assert!(matches!(
            OpenAiChatAdapter::from_settings(&settings(Some("   "))),
            Err(ExternalServiceError::NotConfigured)
        ));
    }

    #[test]
    fn request_body_uses_template_limits() {
        let adapter = OpenAiChatAdapter::from_settings(&settings(Some("sk-test"))).unwrap();
        assert_eq!(adapter.endpoint, "http://127.0.0.1:9/v1/chat/completions");
        let body = adapter.request_body(&QUIZ_PROMPT, "Your blood pressure is high.");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["messages"][1]["content"], "Your blood pressure is high.");
        assert_eq!(body["messages"][0]["role"], "system");
    }

    #[test]
    fn completion_text_reads_first_choice() {
        let payload = json!({ "choices": [{ "message": { "content": "Plain words." } }] });
        assert_eq!(completion_text(&payload).unwrap(), "Plain words.");
    }

    #[test]
    fn completion_text_rejects_missing_or_blank_content() {
        assert!(matches!(
            completion_text(&json!({ "choices": [] })),
            Err(ExternalServiceError::MalformedResponse(_))
        ));
        let blank = json!({ "choices": [{ "message": { "content": "  " } }] });
        assert!(matches!(
            completion_text(&blank),
            Err(ExternalServiceError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_an_external_error() {
        let adapter = OpenAiChatAdapter::from_settings(&settings(Some("sk-test"))).unwrap();
        let result = adapter.generate(&SIMPLIFY_PROMPT, "Hypertension.").await;
        assert!(matches!(
            result,
            Err(ExternalServiceError::Transport(_) | ExternalServiceError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let adapter = adapter_for(canned_service("503 Service Unavailable", "busy").await);
        let result = adapter.generate(&SIMPLIFY_PROMPT, "Hypertension.").await;
        assert_eq!(
            result,
            Err(ExternalServiceError::Status {
                status: 503,
                body: "busy".into(),
            })
        );
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let adapter = adapter_for(canned_service("200 OK", "garbage").await);
        let result = adapter.generate(&QUIZ_PROMPT, "Hypertension.").await;
        assert!(
            matches!(result, Err(ExternalServiceError::MalformedResponse(_))),
            "{result:?}"
        );
    }

    #[tokio::test]
    async fn successful_completion_is_returned() {
        let adapter = adapter_for(
            canned_service(
                "200 OK",
                r#"{"choices":[{"message":{"role":"assistant","content":"High blood pressure."}}]}"#,
            )
            .await,
        );
        let result = adapter.generate(&SIMPLIFY_PROMPT, "Hypertension.").await;
        assert_eq!(result.unwrap(), "High blood pressure.");
    }
}
