use std::sync::Arc;

use anyhow::Result;
use medibridge_simplifier::{
    error::require_text, MediBridgePipeline, QuizQuestion, SimplificationResult, ValidationError,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    audit::{AuditRecord, AuditTrail},
    config::GatewayConfig,
    stats::{RequestStats, StatsSnapshot},
};

/// Supported request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read.
    Get,
    /// Submit.
    Post,
}

/// Transport-neutral request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Method.
    pub method: Method,
    /// Path, optionally with a query string.
    pub path: String,
    /// Value of the `x-admin-token` header, if sent.
    #[serde(default, alias = "token")]
    pub admin_token: Option<String>,
    /// JSON body; `null` when absent.
    #[serde(default)]
    pub body: Value,
}

impl ApiRequest {
    /// POST with a JSON body.
    #[must_use]
    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            admin_token: None,
            body,
        }
    }

    /// GET without a body.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            admin_token: None,
            body: Value::Null,
        }
    }

    /// Attaches the admin header.
    #[must_use]
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(token.into());
        self
    }
}

/// Status plus JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiResponse {
    /// HTTP-equivalent status code.
    pub status: u16,
    /// JSON body.
    pub body: Value,
}

impl ApiResponse {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }
}

impl From<GatewayError> for ApiResponse {
    fn from(err: GatewayError) -> Self {
        Self {
            status: err.status(),
            body: json!({ "error": err.to_string() }),
        }
    }
}

/// Client-visible request failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Required field missing or blank.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Body is not a JSON object of the expected shape.
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    /// Admin credential absent or wrong.
    #[error("unauthorized")]
    Unauthorized,
    /// No such route.
    #[error("no route for {method:?} {path}")]
    NotFound {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
    },
    /// Gateway-side failure unrelated to the request.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP-equivalent status.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::MalformedBody(_) => 400,
            Self::Unauthorized => 403,
            Self::NotFound { .. } => 404,
            Self::Internal(_) => 500,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SimplifyBody {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuizBody {
    #[serde(default, alias = "simplified")]
    simplified_text: Option<String>,
}

/// Request layer around the pipeline: validation, stats, audit, admin checks.
pub struct Gateway {
    pipeline: Arc<MediBridgePipeline>,
    stats: RequestStats,
    audit: AuditTrail,
    admin_token: Option<String>,
    prefer_external: bool,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("pipeline", &self.pipeline)
            .field("prefer_external", &self.prefer_external)
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Creates a gateway.
    #[must_use]
    pub fn new(
        pipeline: Arc<MediBridgePipeline>,
        audit: AuditTrail,
        admin_token: Option<String>,
        prefer_external: bool,
    ) -> Self {
        Self {
            pipeline,
            stats: RequestStats::new(),
            audit,
            admin_token: admin_token.filter(|token| !token.is_empty()),
            prefer_external,
        }
    }

    /// Builds the pipeline and gateway from configuration.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let pipeline = MediBridgePipeline::from_config(&config.pipeline)?;
        Ok(Self::new(
            Arc::new(pipeline),
            AuditTrail::new(&config.audit.primary_path, &config.audit.fallback_path),
            config.admin.token.clone(),
            config.prefer_external(),
        ))
    }

    /// Routes a request. Never fails; errors become 4xx/5xx responses.
    pub async fn dispatch(&self, request: &ApiRequest) -> ApiResponse {
        let path = request.path.split('?').next().unwrap_or_default();
        let outcome = match (request.method, path) {
            (Method::Post, "/api/simplify") => self
                .simplify(&request.body)
                .await
                .and_then(|result| to_json(&result)),
            (Method::Post, "/api/quiz") => self
                .quiz(&request.body)
                .await
                .map(|questions| json!({ "questions": questions })),
            (Method::Post, "/api/audit") => self
                .record_action(&request.body)
                .map(|()| json!({ "success": true })),
            (Method::Get, "/api/stats") => to_json(&self.stats()),
            (Method::Get, "/api/audit") => self
                .audit_entries(request.admin_token.as_deref())
                .and_then(|entries| to_json(&entries)),
            _ => Err(GatewayError::NotFound {
                method: request.method,
                path: path.to_string(),
            }),
        };
        let response = outcome.map_or_else(ApiResponse::from, ApiResponse::ok);
        info!(method = ?request.method, path, status = response.status, "request handled");
        response
    }

    /// `POST /api/simplify`: validates, simplifies, records stats and audit.
    pub async fn simplify(&self, body: &Value) -> Result<SimplificationResult, GatewayError> {
        let request: SimplifyBody = parse_body(body)?;
        let text = require_text("text", request.text.as_deref())?;
        let result = self.pipeline.simplify(text, self.prefer_external).await;
        self.stats.record(result.elapsed_ms);
        self.audit.append(&AuditRecord::simplification(text, &result));
        Ok(result)
    }

    /// `POST /api/quiz`: questions for a simplified text.
    pub async fn quiz(&self, body: &Value) -> Result<Vec<QuizQuestion>, GatewayError> {
        let request: QuizBody = parse_body(body)?;
        let text = require_text("simplifiedText", request.simplified_text.as_deref())?;
        Ok(self.pipeline.generate_quiz(text, self.prefer_external).await)
    }

    /// `POST /api/audit`: appends a client-reported action.
    pub fn record_action(&self, body: &Value) -> Result<(), GatewayError> {
        let Value::Object(payload) = body else {
            return Err(GatewayError::MalformedBody("expected a JSON object".into()));
        };
        self.audit.append(&AuditRecord::user_action(payload.clone()));
        Ok(())
    }

    /// `GET /api/stats`.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// `GET /api/audit`: admin-only read of the audit trail.
    pub fn audit_entries(&self, token: Option<&str>) -> Result<Vec<AuditRecord>, GatewayError> {
        match (&self.admin_token, token) {
            (Some(expected), Some(given)) if expected == given => {}
            _ => return Err(GatewayError::Unauthorized),
        }
        self.audit.entries().map_err(|err| {
            warn!(error = %format!("{err:#}"), "audit read failed");
            GatewayError::Internal("audit log unavailable".into())
        })
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &Value) -> Result<T, GatewayError> {
    if !body.is_object() {
        return Err(GatewayError::MalformedBody("expected a JSON object".into()));
    }
    T::deserialize(body).map_err(|err| GatewayError::MalformedBody(err.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, GatewayError> {
    serde_json::to_value(value).map_err(|err| GatewayError::Internal(err.to_string()))
}
