use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::error::{Result, SmokescreenError};

/// Application configuration. Secrets and environment-specific values come
/// from env vars; tunables come from an optional TOML file.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Oracle
    pub anthropic_api_key: String,
    pub oracle_model: String,

    // Sources
    pub feed_urls: Vec<String>,

    pub settings: Settings,
}

pub const DEFAULT_ORACLE_MODEL: &str = "claude-haiku-4-5-20251001";

impl Config {
    /// Load from the environment (and `.env` if present). `SMOKESCREEN_CONFIG`
    /// points at the TOML tunables; without it, `./smokescreen.toml` is used
    /// when present, else defaults.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = match env::var("SMOKESCREEN_CONFIG").ok() {
            Some(path) => load_settings(Path::new(&path))?,
            None if default_settings_path().exists() => load_settings(&default_settings_path())?,
            None => Settings::default(),
        };

        let config = Self {
            database_url: required_env("DATABASE_URL")?,
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
            oracle_model: env::var("ORACLE_MODEL")
                .unwrap_or_else(|_| DEFAULT_ORACLE_MODEL.to_string()),
            feed_urls: env::var("FEED_URLS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            settings,
        };

        config.log_redacted();
        Ok(config)
    }

    /// Fail early when a phase that talks to the oracle has no key.
    pub fn require_oracle(&self) -> Result<()> {
        if self.anthropic_api_key.is_empty() {
            return Err(SmokescreenError::Config(
                "ANTHROPIC_API_KEY environment variable is required for processing".to_string(),
            ));
        }
        Ok(())
    }

    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            if val.is_empty() {
                return "<not set>".to_string();
            }
            let n = val.len().min(5);
            format!("{}...({} chars)", &val[..n], val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", preview(&self.database_url));
        tracing::info!("  ANTHROPIC_API_KEY: {}", preview(&self.anthropic_api_key));
        tracing::info!("  ORACLE_MODEL: {}", self.oracle_model);
        tracing::info!("  FEED_URLS: {} feeds", self.feed_urls.len());
    }
}

fn required_env(key: &str) -> Result<String> {
    env::var(key)
        .map_err(|_| SmokescreenError::Config(format!("{key} environment variable is required")))
}

// ---------------------------------------------------------------------------
// TOML tunables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub dedup: DedupSettings,
    pub clustering: ClusteringSettings,
    pub process: ProcessSettings,
    pub ingest: IngestSettings,
    pub smokescreen: SmokescreenSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupSettings {
    pub headline_similarity: f64,
    pub min_headline_chars: usize,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            headline_similarity: 0.7,
            min_headline_chars: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClusteringSettings {
    /// Articles per oracle call.
    pub batch_size: usize,
    /// Title similarity at or above which two events are the same event.
    pub merge_similarity: f64,
}

impl Default for ClusteringSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            merge_similarity: 0.65,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessSettings {
    /// Unassigned articles pulled per process run.
    pub article_batch: usize,
    /// Events scored per process run; the rest are deferred.
    pub max_scored_per_run: usize,
    /// Soft ceiling checked before each unit of work.
    pub time_budget_secs: u64,
    /// Events older than this freeze automatically.
    pub auto_freeze_hours: i64,
    /// A run still `running` after this long is swept to `failed`.
    pub stale_run_minutes: i64,
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            article_batch: 50,
            max_scored_per_run: 2,
            time_budget_secs: 50,
            auto_freeze_hours: 48,
            stale_run_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestSettings {
    pub lookback_hours: i64,
    pub max_retries: u32,
    pub retry_base_ms: u64,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            lookback_hours: 24,
            max_retries: 3,
            retry_base_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmokescreenSettings {
    /// Pairs scoring below this are not persisted.
    pub storage_cutoff: f64,
}

impl Default for SmokescreenSettings {
    fn default() -> Self {
        Self {
            storage_cutoff: 15.0,
        }
    }
}

/// Load and parse a TOML settings file.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_settings(&content)
        .map_err(|e| SmokescreenError::Config(format!("{}: {e}", path.display())))
}

pub fn parse_settings(content: &str) -> std::result::Result<Settings, toml::de::Error> {
    toml::from_str(content)
}

/// Default location of the settings file when none is configured.
pub fn default_settings_path() -> PathBuf {
    PathBuf::from("smokescreen.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let s = parse_settings("").unwrap();
        assert_eq!(s.clustering.batch_size, 50);
        assert_eq!(s.process.max_scored_per_run, 2);
        assert_eq!(s.process.time_budget_secs, 50);
        assert_eq!(s.dedup.headline_similarity, 0.7);
        assert_eq!(s.smokescreen.storage_cutoff, 15.0);
    }

    #[test]
    fn partial_sections_override_only_named_keys() {
        let s = parse_settings(
            r#"
            [process]
            max_scored_per_run = 5

            [ingest]
            max_retries = 1
            "#,
        )
        .unwrap();
        assert_eq!(s.process.max_scored_per_run, 5);
        assert_eq!(s.process.auto_freeze_hours, 48);
        assert_eq!(s.ingest.max_retries, 1);
        assert_eq!(s.ingest.retry_base_ms, 2_000);
    }

    #[test]
    fn example_file_matches_defaults() {
        let s = parse_settings(include_str!("../../../smokescreen.example.toml")).unwrap();
        let d = Settings::default();
        assert_eq!(s.dedup.headline_similarity, d.dedup.headline_similarity);
        assert_eq!(s.clustering.merge_similarity, d.clustering.merge_similarity);
        assert_eq!(s.process.stale_run_minutes, d.process.stale_run_minutes);
        assert_eq!(s.ingest.retry_base_ms, d.ingest.retry_base_ms);
        assert_eq!(s.smokescreen.storage_cutoff, d.smokescreen.storage_cutoff);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(parse_settings("[process]\nmax_events = 3\n").is_err());
    }
}
