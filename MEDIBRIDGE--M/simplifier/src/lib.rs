#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rust_2018_idioms,
    missing_docs
)]

//! MediBridge simplifier – turns clinical prose into plain language and quiz prompts.

/// Error taxonomy shared by the pipeline stages.
#[path = "../error.rs"]
pub mod error;

/// Result and question types produced by the pipeline.
#[path = "../types.rs"]
pub mod types;

/// Static medical term dictionary.
#[path = "../dictionary.rs"]
pub mod dictionary;

/// Deterministic dictionary-driven rewrite.
#[path = "../local.rs"]
pub mod local;

/// Adapter seam to the external text-generation service.
#[path = "../generative.rs"]
pub mod generative;

/// Local/external routing state machine.
#[path = "../orchestrator.rs"]
pub mod orchestrator;

/// Comprehension question generation.
#[path = "../quiz.rs"]
pub mod quiz;

/// Telemetry builder for pipeline records.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// TOML configuration with environment overrides.
#[path = "../config.rs"]
pub mod config;

/// Pipeline facade wiring every stage together.
#[path = "../main.rs"]
pub mod runtime;

pub use config::{DictionarySettings, GenerativeSettings, PipelineConfig, TelemetrySettings};
pub use dictionary::{DictionaryEntry, TermDictionary, TermMatch};
pub use error::{DictionaryError, ExternalServiceError, ValidationError};
pub use generative::{GenerativeAdapter, OpenAiChatAdapter, PromptTemplate};
pub use local::{LocalRewrite, LocalSimplifier};
pub use orchestrator::SimplificationOrchestrator;
pub use quiz::{QuizGenerator, QuizParseError};
pub use runtime::{MediBridgePipeline, MediBridgePipelineBuilder};
pub use telemetry::{PipelineTelemetry, PipelineTelemetryBuilder};
pub use types::{
    Confidence, ExplanationEntry, QuestionKind, QuizQuestion, ResultSource, SimplificationResult,
};
