//! Configuration for an ICE workspace.
//!
//! Read from `.ice/config.toml`; every section and key is optional and falls
//! back to its default.

use crate::error::{IceError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Name of the configuration file inside the `.ice` directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Complete workspace configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Index build and cache configuration.
    #[serde(default)]
    pub index: IndexConfig,

    /// Rule matcher thresholds.
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Language-model escalation configuration.
    #[serde(default)]
    pub disambiguator: DisambiguatorConfig,

    /// Session persistence configuration.
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Load configuration from `<ice_root>/config.toml`, or defaults if absent.
    pub fn load(ice_root: &Path) -> Result<Self> {
        let path = ice_root.join(CONFIG_FILE);
        if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| IceError::ConfigError(format!("failed to read config: {}", e)))?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| IceError::ConfigError(format!("failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to `<ice_root>/config.toml`.
    pub fn save(&self, ice_root: &Path) -> Result<()> {
        let path = ice_root.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)
            .map_err(|e| IceError::ConfigError(format!("failed to serialize config: {}", e)))?;
        fs::write(&path, content)
            .map_err(|e| IceError::ConfigError(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    /// Rejects thresholds outside `[0, 1]`, an inverted min/accept pair and a
    /// default model confidence that would be accepted without asking.
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f64| {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(IceError::ConfigError(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )))
            }
        };
        unit("matcher.min_confidence", self.matcher.min_confidence)?;
        unit("matcher.accept_threshold", self.matcher.accept_threshold)?;
        unit("disambiguator.default_confidence", self.disambiguator.default_confidence)?;
        if self.matcher.min_confidence > self.matcher.accept_threshold {
            return Err(IceError::ConfigError(
                "matcher.min_confidence must not exceed matcher.accept_threshold".to_string(),
            ));
        }
        // A model answer without a confidence must still be confirmed.
        if self.disambiguator.default_confidence >= self.matcher.accept_threshold {
            return Err(IceError::ConfigError(format!(
                "disambiguator.default_confidence ({}) must be below matcher.accept_threshold ({})",
                self.disambiguator.default_confidence, self.matcher.accept_threshold
            )));
        }
        Ok(())
    }
}

/// Index build and cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Directory names skipped anywhere in the tree, on top of `.gitignore`.
    pub ignore_dirs: Vec<String>,

    /// Files larger than this are not indexed (default: 1 MiB).
    pub max_file_bytes: u64,

    /// Cache file name inside `.ice` (default: `index.cache`).
    pub cache_file: String,

    /// zstd level for the cache and backup blobs (1-22, default: 3).
    pub compression_level: i32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: [
                "__pycache__",
                ".git",
                ".venv",
                "venv",
                "node_modules",
                "dist",
                "build",
                "target",
                ".pytest_cache",
                ".mypy_cache",
                ".ice",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            max_file_bytes: 1024 * 1024,
            cache_file: "index.cache".to_string(),
            compression_level: 3,
        }
    }
}

/// Rule matcher thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// A rule below this confidence does not match at all (default: 0.5).
    pub min_confidence: f64,

    /// Matcher results at or above this skip the disambiguator (default: 0.75).
    pub accept_threshold: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            accept_threshold: 0.75,
        }
    }
}

/// Language-model escalation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisambiguatorConfig {
    /// Upper bound on one provider call in milliseconds (default: 10 000).
    pub timeout_ms: u64,

    /// Number of recent turns handed to the provider (default: 3).
    pub context_turns: usize,

    /// Number of index search hits handed to the provider (default: 5).
    pub search_hits: usize,

    /// Confidence assigned when the provider reports none (default: 0.6).
    /// Kept below the accept threshold so model answers get confirmed.
    pub default_confidence: f64,

    /// Provider command line. It receives the request as JSON on stdin and
    /// answers with an intent object on stdout. Unset means offline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Default for DisambiguatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            context_turns: 3,
            search_hits: 5,
            default_confidence: 0.6,
            command: None,
        }
    }
}

impl DisambiguatorConfig {
    /// Returns the provider timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Session persistence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Write `.ice/session.json` after every turn (default: true).
    pub persist: bool,

    /// Turns included in the context bundle handed to collaborators (default: 3).
    pub max_turns_in_context: usize,

    /// A saved session older than this is replaced by a fresh one when the
    /// workspace is opened (default: 24). `0` keeps sessions forever.
    pub max_age_hours: u64,
}

impl SessionConfig {
    pub fn max_age(&self) -> Option<Duration> {
        (self.max_age_hours > 0).then(|| Duration::from_secs(self.max_age_hours * 3600))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            persist: true,
            max_turns_in_context: 3,
            max_age_hours: 24,
        }
    }
}
