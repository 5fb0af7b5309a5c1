use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Environment variable carrying the generative service key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Pipeline configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    /// External service settings.
    #[serde(default)]
    pub generative: GenerativeSettings,
    /// Custom dictionary settings.
    #[serde(default)]
    pub dictionary: DictionarySettings,
    /// Telemetry output.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

impl PipelineConfig {
    /// Loads configuration from a TOML file and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut config =
            Self::from_toml_str(&raw, base_dir).with_context(|| format!("parsing {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses a document, resolving relative paths against `base_dir`.
    pub fn from_toml_str(raw: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.resolve_paths(base_dir);
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from an arbitrary variable lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|key| !key.trim().is_empty()) {
            self.generative.api_key = Some(key);
        }
    }

    /// Resolves relative file paths against the config directory.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        if let Some(path) = self.dictionary.path.as_mut() {
            *path = resolve(base_dir, path);
        }
        if let Some(path) = self.telemetry.log_path.as_mut() {
            *path = resolve(base_dir, path);
        }
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.generative.timeout_ms == 0 {
            bail!("generative.timeout_ms must be positive");
        }
        if !(0.0..=2.0).contains(&self.generative.temperature) {
            bail!(
                "generative.temperature {} outside 0.0..=2.0",
                self.generative.temperature
            );
        }
        if self.generative.model.trim().is_empty() {
            bail!("generative.model must not be empty");
        }
        Ok(())
    }
}

/// Settings for the external generative service.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerativeSettings {
    /// API key; absence disables the external path.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Hard limit for a single call.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Whether callers should prefer the external path when configured.
    #[serde(default = "default_true")]
    pub prefer_external: bool,
}

impl GenerativeSettings {
    /// True when an API key is present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// Call timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for GenerativeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_ms: default_timeout_ms(),
            prefer_external: default_true(),
        }
    }
}

/// Custom dictionary location.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DictionarySettings {
    /// TOML file with `[[term]]` tables; the built-in glossary is used when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Telemetry output location.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelemetrySettings {
    /// JSON-lines file for pipeline records; telemetry is off when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

fn resolve(base_dir: &Path, candidate: &Path) -> PathBuf {
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        base_dir.join(candidate)
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

const fn default_temperature() -> f32 {
    0.2
}

const fn default_timeout_ms() -> u64 {
    15_000
}

const fn default_true() -> bool {
    true
}
