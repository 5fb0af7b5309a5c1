use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tracing::info;

use crate::{
    config::PipelineConfig,
    dictionary::TermDictionary,
    generative::{GenerativeAdapter, OpenAiChatAdapter},
    local::LocalSimplifier,
    orchestrator::SimplificationOrchestrator,
    quiz::QuizGenerator,
    telemetry::PipelineTelemetry,
    types::{QuizQuestion, SimplificationResult},
};

/// Pipeline facade combining the orchestrator and the quiz generator.
///
/// Holds no per-request state, so one instance can serve concurrent requests.
#[derive(Debug)]
pub struct MediBridgePipeline {
    orchestrator: SimplificationOrchestrator,
    quiz: QuizGenerator,
}

impl MediBridgePipeline {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> MediBridgePipelineBuilder {
        MediBridgePipelineBuilder::default()
    }

    /// Builds the pipeline from configuration.
    ///
    /// A missing API key is not an error; the pipeline then runs local-only.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let mut builder = Self::builder().timeout(config.generative.timeout());
        if let Some(path) = &config.dictionary.path {
            let dictionary = TermDictionary::from_toml_file(path)?;
            info!(terms = dictionary.len(), path = %path.display(), "loaded custom dictionary");
            builder = builder.dictionary(Arc::new(dictionary));
        }
        if config.generative.is_configured() {
            let adapter = OpenAiChatAdapter::from_settings(&config.generative)
                .context("building generative adapter")?;
            builder = builder.adapter(Arc::new(adapter));
        } else {
            info!("no generative API key configured; running local-only");
        }
        if let Some(path) = &config.telemetry.log_path {
            builder = builder.telemetry(
                PipelineTelemetry::builder("simplifier")
                    .log_path(path)
                    .build()
                    .with_context(|| format!("opening telemetry log {}", path.display()))?,
            );
        }
        Ok(builder.build())
    }

    /// Simplifies medical text; always returns a result.
    pub async fn simplify(&self, text: &str, prefer_external: bool) -> SimplificationResult {
        self.orchestrator.simplify(text, prefer_external).await
    }

    /// Generates comprehension questions; always returns a list.
    pub async fn generate_quiz(
        &self,
        simplified_text: &str,
        prefer_external: bool,
    ) -> Vec<QuizQuestion> {
        self.quiz.generate_quiz(simplified_text, prefer_external).await
    }

    /// True when an external adapter is wired in.
    #[must_use]
    pub fn external_configured(&self) -> bool {
        self.orchestrator.external_configured()
    }
}

/// Builder for `MediBridgePipeline`.
pub struct MediBridgePipelineBuilder {
    dictionary: Option<Arc<TermDictionary>>,
    adapter: Option<Arc<dyn GenerativeAdapter>>,
    telemetry: Option<PipelineTelemetry>,
    timeout: Duration,
}

impl Default for MediBridgePipelineBuilder {
    fn default() -> Self {
        Self {
            dictionary: None,
            adapter: None,
            telemetry: None,
            timeout: Duration::from_secs(15),
        }
    }
}

impl MediBridgePipelineBuilder {
    /// Overrides the built-in dictionary.
    #[must_use]
    pub fn dictionary(mut self, dictionary: Arc<TermDictionary>) -> Self {
        self.dictionary = Some(dictionary);
        self
    }

    /// Sets the external adapter.
    #[must_use]
    pub fn adapter(mut self, adapter: Arc<dyn GenerativeAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Sets telemetry.
    #[must_use]
    pub fn telemetry(mut self, telemetry: PipelineTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Sets the external call timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Builds the pipeline.
    pub fn build(self) -> MediBridgePipeline {
        let dictionary = self.dictionary.unwrap_or_else(TermDictionary::builtin);
        let orchestrator = SimplificationOrchestrator::new(
            LocalSimplifier::new(dictionary),
            self.adapter.clone(),
            self.timeout,
        )
        .with_telemetry(self.telemetry.clone());
        let quiz = QuizGenerator::new(self.adapter, self.timeout).with_telemetry(self.telemetry);
        MediBridgePipeline { orchestrator, quiz }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use super::*;
    use crate::{
        error::ExternalServiceError,
        orchestrator::tests::ScriptedAdapter,
        quiz::heuristic_questions,
        types::{Confidence, ResultSource},
    };

    #[tokio::test]
    async fn default_pipeline_is_local_only() {
        let pipeline = MediBridgePipeline::builder().build();
        assert!(!pipeline.external_configured());
        let result = pipeline.simplify("Intravenous fluids.", true).await;
        assert_eq!(result.source, ResultSource::Local);
        assert!(result
            .simplified_text
            .starts_with("through the vein (intravenous) fluids."));
        assert_eq!(
            pipeline.generate_quiz(&result.simplified_text, true).await,
            heuristic_questions()
        );
    }

    #[tokio::test]
    async fn shared_adapter_serves_both_stages() {
        let adapter = ScriptedAdapter::failing(ExternalServiceError::Transport("down".into()));
        let pipeline = MediBridgePipeline::builder()
            .adapter(adapter.clone())
            .timeout(Duration::from_millis(100))
            .build();
        let result = pipeline.simplify("Consent.", true).await;
        assert_eq!(result.confidence, Confidence::Medium);
        let questions = pipeline.generate_quiz(&result.simplified_text, true).await;
        assert_eq!(questions.len(), 2);
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test]
    async fn config_wires_custom_dictionary_and_telemetry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("terms.toml"),
            "[[term]]\nterm = \"edema\"\nplain = \"swelling\"\nexplanation = [\"Fluid builds up.\"]\n",
        )
        .unwrap();
        let raw = "[dictionary]\npath = \"terms.toml\"\n[telemetry]\nlog_path = \"logs/pipeline.jsonl\"\n";
        let config = PipelineConfig::from_toml_str(raw, dir.path()).unwrap();
        let pipeline = MediBridgePipeline::from_config(&config).unwrap();

        let result = pipeline.simplify("Edema and hypertension.", true).await;
        assert!(result.simplified_text.starts_with("swelling (edema) and hypertension."));
        assert_eq!(result.matched_terms, vec!["edema"]);
        assert!(dir.path().join("logs/pipeline.jsonl").exists());
    }

    #[test]
    fn missing_dictionary_file_is_a_config_error() {
        let config =
            PipelineConfig::from_toml_str("[dictionary]\npath = \"absent.toml\"", Path::new("/nonexistent"))
                .unwrap();
        assert!(MediBridgePipeline::from_config(&config).is_err());
    }
}
