use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use medibridge_simplifier::PipelineConfig;
use serde::Deserialize;

/// Environment variable carrying the admin credential.
pub const ADMIN_TOKEN_ENV: &str = "MEDIBRIDGE_ADMIN_TOKEN";

/// Full deployment document: pipeline sections plus gateway sections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    /// `[generative]`, `[dictionary]`, `[telemetry]`.
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
    /// `[audit]`.
    #[serde(default)]
    pub audit: AuditSettings,
    /// `[admin]`.
    #[serde(default)]
    pub admin: AdminSettings,
}

impl GatewayConfig {
    /// Loads a TOML file, resolves relative paths, and applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut config = Self::from_toml_str(&raw, base_dir)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parses a document, resolving relative paths against `base_dir`.
    pub fn from_toml_str(raw: &str, base_dir: &Path) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.pipeline.resolve_paths(base_dir);
        config.pipeline.validate()?;
        config.audit.resolve_paths(base_dir);
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
        self.pipeline.apply_overrides(&lookup);
        if let Some(token) = lookup(ADMIN_TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            self.admin.token = Some(token);
        }
    }

    /// Whether requests should try the external path first.
    #[must_use]
    pub fn prefer_external(&self) -> bool {
        self.pipeline.generative.prefer_external && self.pipeline.generative.is_configured()
    }
}

/// Audit trail locations.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditSettings {
    /// Preferred log file.
    #[serde(default = "default_primary_path")]
    pub primary_path: PathBuf,
    /// Used when the primary file cannot be written.
    #[serde(default = "default_fallback_path")]
    pub fallback_path: PathBuf,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            primary_path: default_primary_path(),
            fallback_path: default_fallback_path(),
        }
    }
}

impl AuditSettings {
    /// Anchors relative audit files at `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        for path in [&mut self.primary_path, &mut self.fallback_path] {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
    }
}

/// Shared admin credential.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminSettings {
    /// Token expected in the admin header; audit reads are refused when unset.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_primary_path() -> PathBuf {
    PathBuf::from("audit.log")
}

fn default_fallback_path() -> PathBuf {
    std::env::temp_dir().join("medibridge-audit.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pipeline_and_gateway_sections_together() {
        let raw = r#"
[generative]
model = "gpt-4o"
[dictionary]
path = "terms.toml"
[audit]
primary_path = "logs/audit.log"
fallback_path = "/tmp/fallback.log"
[admin]
token = "secret"
"#;
        let config = GatewayConfig::from_toml_str(raw, Path::new("/srv/mb")).unwrap();
        assert_eq!(config.pipeline.generative.model, "gpt-4o");
        assert_eq!(
            config.pipeline.dictionary.path.as_deref(),
            Some(Path::new("/srv/mb/terms.toml"))
        );
        assert_eq!(config.audit.primary_path, PathBuf::from("/srv/mb/logs/audit.log"));
        assert_eq!(config.audit.fallback_path, PathBuf::from("/tmp/fallback.log"));
        assert_eq!(config.admin.token.as_deref(), Some("secret"));
    }

    #[test]
    fn external_preference_requires_a_key() {
        let mut config = GatewayConfig::from_toml_str("", Path::new(".")).unwrap();
        assert!(!config.prefer_external());
        config.apply_overrides(|key| match key {
            "OPENAI_API_KEY" => Some("sk-live".into()),
            ADMIN_TOKEN_ENV => Some("env-token".into()),
            _ => None,
        });
        assert!(config.prefer_external());
        assert_eq!(config.admin.token.as_deref(), Some("env-token"));
    }

    #[test]
    fn relative_audit_paths_follow_the_config_file() {
        let raw = r#"
[audit]
primary_path = "audit.log"
fallback_path = "spill/audit.log"
"#;
        let config = GatewayConfig::from_toml_str(raw, Path::new("/srv/mb")).unwrap();
        assert_eq!(config.audit.primary_path, PathBuf::from("/srv/mb/audit.log"));
        assert_eq!(
            config.audit.fallback_path,
            PathBuf::from("/srv/mb/spill/audit.log")
        );

        let defaults = GatewayConfig::from_toml_str("", Path::new("/srv/mb")).unwrap();
        assert_eq!(
            defaults.audit.fallback_path,
            std::env::temp_dir().join("medibridge-audit.log")
        );
    }
}
