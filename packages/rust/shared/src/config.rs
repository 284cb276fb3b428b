//! Application configuration for stagegate.
//!
//! User config lives at `~/.stagegate/stagegate.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StageGateError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "stagegate.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".stagegate";

// ---------------------------------------------------------------------------
// Config structs (matching stagegate.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Batch sizes, caps, and ranking depth.
    #[serde(default)]
    pub pipeline: PipelineSection,

    /// Artifact and database locations.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Data source filters.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Model identity (only used to name runs).
    #[serde(default)]
    pub model: ModelConfig,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Rows per company batch; every accepted offset is a multiple of this.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// How many entities survive consolidation and final ranking.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Upper bound on the `limit` a caller may request per company batch.
    #[serde(default = "default_company_limit_cap")]
    pub company_limit_cap: u64,

    /// Default press-release page size.
    #[serde(default = "default_press_release_limit")]
    pub press_release_limit: u64,

    /// Upper bound on the press-release page size.
    #[serde(default = "default_press_release_limit_cap")]
    pub press_release_limit_cap: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            top_n: default_top_n(),
            company_limit_cap: default_company_limit_cap(),
            press_release_limit: default_press_release_limit(),
            press_release_limit_cap: default_press_release_limit_cap(),
        }
    }
}

fn default_batch_size() -> u64 {
    100
}
fn default_top_n() -> usize {
    100
}
fn default_company_limit_cap() -> u64 {
    500
}
fn default_press_release_limit() -> u64 {
    50
}
fn default_press_release_limit_cap() -> u64 {
    200
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory of the artifact store.
    #[serde(default = "default_artifact_root")]
    pub artifact_root: String,

    /// Directory under the root that holds per-run namespaces.
    #[serde(default = "default_run_prefix")]
    pub run_prefix: String,

    /// libSQL database backing the reference data sources.
    #[serde(default = "default_database")]
    pub database: String,

    /// Input prefixes shared by every run (read verbatim, never run-scoped).
    #[serde(default = "default_shared_prefixes")]
    pub shared_prefixes: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_root: default_artifact_root(),
            run_prefix: default_run_prefix(),
            database: default_database(),
            shared_prefixes: default_shared_prefixes(),
        }
    }
}

fn default_artifact_root() -> String {
    "~/stagegate-runs".into()
}
fn default_run_prefix() -> String {
    "deepagent_runs".into()
}
fn default_database() -> String {
    "~/.stagegate/sources.db".into()
}
fn default_shared_prefixes() -> Vec<String> {
    vec![
        "transcripts/".into(),
        "company_descriptions/".into(),
        "press_releases/".into(),
    ]
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Sector filter applied to the company table.
    #[serde(default = "default_company_sector")]
    pub company_sector: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            company_sector: default_company_sector(),
        }
    }
}

fn default_company_sector() -> String {
    "Technology".into()
}

/// `[model]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier; its slug becomes part of every run name.
    #[serde(default = "default_model_id")]
    pub model_id: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
        }
    }
}

fn default_model_id() -> String {
    "gemini-2.5-pro".into()
}

impl AppConfig {
    /// Reject values the state machines cannot operate with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.pipeline;
        if p.batch_size == 0 {
            return Err(StageGateError::config("pipeline.batch_size must be > 0"));
        }
        if p.top_n == 0 {
            return Err(StageGateError::config("pipeline.top_n must be > 0"));
        }
        if p.company_limit_cap < p.batch_size {
            return Err(StageGateError::config(format!(
                "pipeline.company_limit_cap ({}) is smaller than batch_size ({})",
                p.company_limit_cap, p.batch_size
            )));
        }
        if p.press_release_limit == 0 || p.press_release_limit > p.press_release_limit_cap {
            return Err(StageGateError::config(format!(
                "pipeline.press_release_limit must be in 1..={}",
                p.press_release_limit_cap
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pipeline config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration: merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub batch_size: u64,
    pub top_n: usize,
    pub company_limit_cap: u64,
    pub press_release_limit: u64,
    pub press_release_limit_cap: u64,
    /// Sector filter for the company source.
    pub company_sector: String,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            batch_size: config.pipeline.batch_size,
            top_n: config.pipeline.top_n,
            company_limit_cap: config.pipeline.company_limit_cap,
            press_release_limit: config.pipeline.press_release_limit,
            press_release_limit_cap: config.pipeline.press_release_limit_cap,
            company_sector: config.sources.company_sector.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Run naming
// ---------------------------------------------------------------------------

/// Build a fresh run name: `run_<YYYY_MM_DD_HHMMSS>_<model slug>`.
pub fn new_run_name(model_id: &str, now: DateTime<Utc>) -> String {
    let slug: String = model_id
        .chars()
        .map(|c| if c == '-' || c == '.' { '_' } else { c })
        .collect();
    format!("run_{}_{slug}", now.format("%Y_%m_%d_%H%M%S"))
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.stagegate/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| StageGateError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.stagegate/stagegate.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| StageGateError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        StageGateError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| StageGateError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| StageGateError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| StageGateError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("batch_size"));
        assert!(toml_str.contains("deepagent_runs"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pipeline.batch_size, 100);
        assert_eq!(parsed.pipeline.top_n, 100);
        assert_eq!(parsed.sources.company_sector, "Technology");
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[pipeline]
batch_size = 50

[storage]
artifact_root = "/tmp/runs"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.pipeline.batch_size, 50);
        assert_eq!(config.pipeline.company_limit_cap, 500);
        assert_eq!(config.storage.artifact_root, "/tmp/runs");
        assert_eq!(config.storage.shared_prefixes.len(), 3);
    }

    #[test]
    fn validation_rejects_zero_batch() {
        let mut config = AppConfig::default();
        config.pipeline.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn validation_rejects_oversized_press_limit() {
        let mut config = AppConfig::default();
        config.pipeline.press_release_limit = 500;
        assert!(config.validate().is_err());
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.batch_size, 100);
        assert_eq!(pipeline.press_release_limit, 50);
        assert_eq!(pipeline.press_release_limit_cap, 200);
    }

    #[test]
    fn run_name_uses_timestamp_and_slug() {
        let now = Utc.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();
        assert_eq!(
            new_run_name("gemini-2.5-pro", now),
            "run_2025_03_07_090501_gemini_2_5_pro"
        );
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/var/runs"), PathBuf::from("/var/runs"));
    }
}
