//! Layered configuration for the indexing core.
//!
//! Defaults → TOML file → environment, merged with figment. Environment
//! variables use the `APEX_` prefix with double underscores between
//! nesting levels:
//! - `APEX_RUNTIME__VERSION=66.0` sets `runtime.version`
//! - `APEX_VALIDATION__VERSION_SPECIFIC=true` sets `validation.version_specific`
//! - `APEX_ARTIFACTS__ENABLED=false` sets `artifacts.enabled`

use crate::error::IndexError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Settings {
    /// Apex runtime options (`apex.version` in client configuration).
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Compiler / listener behavior.
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Validator gates.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// On-demand artifact loading for THOROUGH validation
    /// (`apex.findMissingArtifact.*` in client configuration).
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Logging levels, `RUST_LOG` still wins.
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuntimeConfig {
    /// API version string, e.g. "65.0". The major part gates
    /// version-specific validators.
    #[serde(default = "default_api_version")]
    pub version: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CompilerConfig {
    /// Capture references while walking.
    #[serde(default = "default_true")]
    pub collect_references: bool,

    /// Run the local CLASS_REFERENCE correction pass after walking.
    #[serde(default = "default_true")]
    pub resolve_references: bool,

    /// Permit rewriting VARIABLE_USAGE qualifiers to CLASS_REFERENCE once
    /// the type becomes known.
    #[serde(default = "default_true")]
    pub enable_reference_correction: bool,

    /// Hard cap on tokens per compilation unit. 0 disables the cap.
    #[serde(default)]
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ValidationConfig {
    /// Gate for version-aware diagnostics
    /// (`apex.validation.versionSpecificValidation.enabled`).
    #[serde(default = "default_true")]
    pub version_specific: bool,

    /// Wall-clock budget for a THOROUGH run, in milliseconds.
    #[serde(default = "default_thorough_timeout_ms")]
    pub thorough_timeout_ms: u64,

    /// Impact score above which a symbol is flagged as high impact.
    #[serde(default = "default_impact_threshold")]
    pub high_impact_threshold: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ArtifactConfig {
    /// Permit THOROUGH validators to trigger artifact loading
    /// (`apex.findMissingArtifact.enabled`).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Poll interval while waiting for a freshly opened file to index
    /// (`apex.findMissingArtifact.indexingBarrierPollMs`).
    #[serde(default = "default_poll_ms")]
    pub indexing_barrier_poll_ms: u64,

    /// Poll attempts before falling back to a fresh compile.
    #[serde(default = "default_poll_attempts")]
    pub indexing_barrier_attempts: u32,

    /// Recursion limit when loaded artifacts reference further types.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Total artifacts one request may load.
    #[serde(default = "default_max_artifacts")]
    pub max_artifacts: u32,

    /// Per-request loading budget, in milliseconds.
    #[serde(default = "default_artifact_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level filter, e.g. "warn".
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `graph = "debug"`.
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_api_version() -> String {
    "65.0".to_string()
}
fn default_true() -> bool {
    true
}
fn default_thorough_timeout_ms() -> u64 {
    5_000
}
fn default_impact_threshold() -> f64 {
    0.5
}
fn default_poll_ms() -> u64 {
    50
}
fn default_poll_attempts() -> u32 {
    10
}
fn default_max_depth() -> u32 {
    3
}
fn default_max_artifacts() -> u32 {
    25
}
fn default_artifact_timeout_ms() -> u64 {
    2_000
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            version: default_api_version(),
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            collect_references: true,
            resolve_references: true,
            enable_reference_correction: true,
            max_tokens: 0,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            version_specific: true,
            thorough_timeout_ms: default_thorough_timeout_ms(),
            high_impact_threshold: default_impact_threshold(),
        }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            indexing_barrier_poll_ms: default_poll_ms(),
            indexing_barrier_attempts: default_poll_attempts(),
            max_depth: default_max_depth(),
            max_artifacts: default_max_artifacts(),
            timeout_ms: default_artifact_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Major part of the API version, e.g. 65 for "65.0". Falls back to the
    /// default version when the string does not parse.
    pub fn api_major_version(&self) -> u32 {
        self.runtime
            .version
            .split('.')
            .next()
            .and_then(|major| major.parse().ok())
            .unwrap_or(65)
    }

    /// Load configuration from a specific file plus environment overrides.
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("APEX_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }

    /// Environment-only load, for embedding without a config file.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Env::prefixed("APEX_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }

    /// Write the current configuration as TOML.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), IndexError> {
        let rendered = toml::to_string_pretty(self).map_err(|e| IndexError::Config {
            reason: format!("cannot serialize settings: {e}"),
        })?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::Config {
                reason: format!("cannot create config directory: {e}"),
            })?;
        }
        std::fs::write(path, rendered).map_err(|e| IndexError::Config {
            reason: format!("cannot write settings: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_settings_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.api_major_version(), 65);
        assert!(settings.compiler.collect_references);
        assert!(settings.validation.version_specific);
        assert_eq!(settings.artifacts.indexing_barrier_poll_ms, 50);
        assert_eq!(settings.artifacts.indexing_barrier_attempts, 10);
    }

    #[test]
    fn load_from_toml_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("apexsense.toml");

        let toml_content = r#"
[runtime]
version = "58.0"

[compiler]
enable_reference_correction = false

[validation]
thorough_timeout_ms = 750

[artifacts]
enabled = false
max_artifacts = 3
"#;
        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.api_major_version(), 58);
        assert!(!settings.compiler.enable_reference_correction);
        assert_eq!(settings.validation.thorough_timeout_ms, 750);
        assert!(!settings.artifacts.enabled);
        assert_eq!(settings.artifacts.max_artifacts, 3);

        // Untouched sections keep their defaults.
        assert!(settings.compiler.collect_references);
        assert_eq!(settings.artifacts.indexing_barrier_poll_ms, 50);
    }

    #[test]
    fn malformed_version_falls_back() {
        let mut settings = Settings::default();
        settings.runtime.version = "not-a-version".into();
        assert_eq!(settings.api_major_version(), 65);
    }

    #[test]
    fn save_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("apexsense.toml");

        let mut settings = Settings::default();
        settings.runtime.version = "60.0".into();
        settings.artifacts.max_depth = 7;
        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.api_major_version(), 60);
        assert_eq!(loaded.artifacts.max_depth, 7);
    }
}
