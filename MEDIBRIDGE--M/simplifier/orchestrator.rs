use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use serde_json::json;
use shared_logging::LogLevel;
use tracing::{debug, warn};

use crate::{
    error::ExternalServiceError,
    generative::{GenerativeAdapter, SIMPLIFY_PROMPT},
    local::LocalSimplifier,
    telemetry::PipelineTelemetry,
    types::SimplificationResult,
};

/// States of a single simplification request.
///
/// `Done` is the only terminal state and always carries a result, so every run ends
/// with a value regardless of which transitions fired.
#[derive(Debug)]
enum SimplifyState {
    Start,
    External,
    Local,
    LocalFallback(ExternalServiceError),
    Done(SimplificationResult),
}

/// Chooses between the external adapter and the local simplifier.
pub struct SimplificationOrchestrator {
    local: LocalSimplifier,
    adapter: Option<Arc<dyn GenerativeAdapter>>,
    timeout: Duration,
    telemetry: Option<PipelineTelemetry>,
}

impl std::fmt::Debug for SimplificationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimplificationOrchestrator")
            .field("external", &self.adapter.as_ref().map(|a| a.model().to_string()))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SimplificationOrchestrator {
    /// Creates an orchestrator. Without an adapter every request takes the local path.
    #[must_use]
    pub fn new(
        local: LocalSimplifier,
        adapter: Option<Arc<dyn GenerativeAdapter>>,
        timeout: Duration,
    ) -> Self {
        Self {
            local,
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

    /// True when an external adapter is available.
    #[must_use]
    pub fn external_configured(&self) -> bool {
        self.adapter.is_some()
    }

    /// Simplifies `text`. Never fails: adapter errors and timeouts fall back locally.
    ///
    /// `elapsed_ms` covers the whole run, whichever path was taken.
    pub async fn simplify(&self, text: &str, prefer_external: bool) -> SimplificationResult {
        let started = Instant::now();
        let mut state = SimplifyState::Start;
        let mut result = loop {
            state = match state {
                SimplifyState::Start => self.route(prefer_external),
                SimplifyState::External => match self.call_external(text).await {
                    Ok(result) => SimplifyState::Done(result),
                    Err(err) => SimplifyState::LocalFallback(err),
                },
                SimplifyState::LocalFallback(err) => {
                    warn!(error = %err, "external simplification failed; using local dictionary");
                    self.emit(
                        LogLevel::Warn,
                        "simplifier.external_failed",
                        json!({ "error": err.to_string() }),
                    );
                    SimplifyState::Done(self.local.simplify(text))
                }
                SimplifyState::Local => SimplifyState::Done(self.local.simplify(text)),
                SimplifyState::Done(result) => break result,
            };
        };
        result.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            source = ?result.source,
            elapsed_ms = result.elapsed_ms,
            "simplification finished"
        );
        self.emit(
            LogLevel::Info,
            "simplifier.completed",
            json!({
                "source": result.source,
                "confidence": result.confidence,
                "elapsed_ms": result.elapsed_ms,
                "model": result.model,
                "matched_terms": result.matched_terms,
            }),
        );
        result
    }

    fn route(&self, prefer_external: bool) -> SimplifyState {
        if prefer_external && self.adapter.is_some() {
            SimplifyState::External
        } else {
            SimplifyState::Local
        }
    }

    async fn call_external(&self, text: &str) -> Result<SimplificationResult, ExternalServiceError> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or(ExternalServiceError::NotConfigured)?;
        let output = tokio::time::timeout(self.timeout, adapter.generate(&SIMPLIFY_PROMPT, text))
            .await
            .map_err(|_| ExternalServiceError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;
        Ok(SimplificationResult::external(output, adapter.model()))
    }

    fn emit(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}
