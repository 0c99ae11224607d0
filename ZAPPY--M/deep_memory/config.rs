use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared_logging::LogLevel;

use crate::strategy::{CompressionLevels, CompressionStrategy};

/// Engine configuration, usually loaded from `deep_memory.toml`.
///
/// ```toml
/// default_strategy = "lzma"
/// tagged_output = true
///
/// [levels]
/// deflate = 9
///
/// [telemetry]
/// log_path = "logs/deep_memory.log"
/// min_level = "DEBUG"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Strategy used by [`crate::DeepMemoryEngine::compress`].
    #[serde(default)]
    pub default_strategy: CompressionStrategy,
    /// Whether the default `compress`/`decompress` pair uses tagged framing.
    #[serde(default)]
    pub tagged_output: bool,
    /// Compression levels per strategy.
    #[serde(default)]
    pub levels: CompressionLevels,
    /// Telemetry sink settings.
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

/// Where and how verbosely the engine logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// JSON-lines log file; relative paths resolve against the config file.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    /// Records below this level are dropped.
    #[serde(default = "default_min_level")]
    pub min_level: LogLevel,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_path: None,
            min_level: default_min_level(),
        }
    }
}

impl EngineConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading deep memory config {}", path.display()))?;
        let mut config =
            Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if let Some(log_path) = config.telemetry.log_path.as_mut() {
            if log_path.is_relative() {
                *log_path = source_dir.join(&*log_path);
            }
        }
        Ok(config)
    }

    /// Parses and validates configuration from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.levels.validate()?;
        Ok(config)
    }
}

const fn default_min_level() -> LogLevel {
    LogLevel::Info
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.default_strategy, CompressionStrategy::Deflate);
        assert_eq!(config.telemetry.min_level, LogLevel::Info);
    }

    #[test]
    fn loads_and_resolves_log_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deep_memory.toml");
        fs::write(
            &path,
            r#"
default_strategy = "xz"
tagged_output = true

[levels]
deflate = 9

[telemetry]
log_path = "logs/deep_memory.log"
min_level = "DEBUG"
"#,
        )
        .unwrap();
        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.default_strategy, CompressionStrategy::Lzma);
        assert!(config.tagged_output);
        assert_eq!(config.levels.deflate, 9);
        assert_eq!(config.levels.bzip2, 9);
        let log_path = config.telemetry.log_path.unwrap();
        assert!(log_path.is_absolute());
        assert!(log_path.ends_with("logs/deep_memory.log"));
        assert_eq!(config.telemetry.min_level, LogLevel::Debug);
    }

    #[test]
    fn rejects_unknown_strategy_and_bad_levels() {
        let err = EngineConfig::from_toml_str(r#"default_strategy = "ROT13""#).unwrap_err();
        assert!(format!("{err:#}").contains("ROT13"));
        assert!(EngineConfig::from_toml_str("[levels]\nlzma = 12").is_err());
    }
}
