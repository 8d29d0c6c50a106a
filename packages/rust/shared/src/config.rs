//! Application configuration for MathPrereq.
//!
//! User config lives at `~/.mathprereq/mathprereq.toml`.
//! Every field has a default, so a missing file or section is never an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MathPrereqError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "mathprereq.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".mathprereq";

// ---------------------------------------------------------------------------
// Config structs (matching mathprereq.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub scraper: ScraperSection,

    #[serde(default)]
    pub quality: QualitySection,

    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub graph: GraphSection,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Chunks requested from the semantic index per query.
    #[serde(default = "default_context_chunks")]
    pub context_chunks: usize,

    /// Maximum identified concepts handed to background discovery.
    #[serde(default = "default_max_discovery_concepts")]
    pub max_discovery_concepts: usize,

    /// Deadline for each collaborator call.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// Deadline for the detached query save.
    #[serde(default = "default_save_timeout")]
    pub save_timeout_secs: u64,

    /// Deadline for a detached discovery job.
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,

    /// Background jobs allowed to run at once.
    #[serde(default = "default_max_background_jobs")]
    pub max_background_jobs: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            context_chunks: default_context_chunks(),
            max_discovery_concepts: default_max_discovery_concepts(),
            stage_timeout_secs: default_stage_timeout(),
            save_timeout_secs: default_save_timeout(),
            discovery_timeout_secs: default_discovery_timeout(),
            max_background_jobs: default_max_background_jobs(),
        }
    }
}

fn default_context_chunks() -> usize {
    5
}
fn default_max_discovery_concepts() -> usize {
    5
}
fn default_stage_timeout() -> u64 {
    60
}
fn default_save_timeout() -> u64 {
    10
}
fn default_discovery_timeout() -> u64 {
    120
}
fn default_max_background_jobs() -> usize {
    16
}

/// `[cache]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    /// Cached answers younger than this are reused.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Concepts refreshed in the background after a cache hit.
    #[serde(default = "default_max_refresh_concepts")]
    pub max_refresh_concepts: usize,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            max_refresh_concepts: default_max_refresh_concepts(),
        }
    }
}

fn default_max_age_days() -> u32 {
    30
}
fn default_max_refresh_concepts() -> usize {
    3
}

/// `[scraper]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperSection {
    /// Concepts discovered concurrently within a batch.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Token-bucket rate per source.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound on a single source's search for one concept.
    #[serde(default = "default_source_timeout")]
    pub source_timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_batch_pause")]
    pub batch_pause_ms: u64,

    /// Concepts with resources newer than this are skipped.
    #[serde(default = "default_recent_window")]
    pub recent_window_hours: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ScraperSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            requests_per_second: default_requests_per_second(),
            request_timeout_secs: default_request_timeout(),
            source_timeout_secs: default_source_timeout(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause(),
            recent_window_hours: default_recent_window(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_max_concurrent() -> usize {
    5
}
fn default_requests_per_second() -> u32 {
    2
}
fn default_request_timeout() -> u64 {
    15
}
fn default_source_timeout() -> u64 {
    45
}
fn default_batch_size() -> usize {
    3
}
fn default_batch_pause() -> u64 {
    2000
}
fn default_recent_window() -> u32 {
    24
}
fn default_user_agent() -> String {
    concat!("MathPrereq-Bot/", env!("CARGO_PKG_VERSION")).into()
}

/// `[quality]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySection {
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    #[serde(default = "default_max_per_concept")]
    pub max_per_concept: usize,

    #[serde(default = "default_max_videos")]
    pub max_videos: usize,

    /// Combined cap for articles and tutorials.
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
}

impl Default for QualitySection {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_per_concept: default_max_per_concept(),
            max_videos: default_max_videos(),
            max_articles: default_max_articles(),
        }
    }
}

fn default_min_score() -> f64 {
    0.4
}
fn default_max_per_concept() -> usize {
    6
}
fn default_max_videos() -> usize {
    3
}
fn default_max_articles() -> usize {
    3
}

/// `[openrouter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for concept identification and explanations.
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_model() -> String {
    "google/gemini-2.0-flash-001".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_max_tokens() -> u32 {
    2000
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    /// Database file. Defaults to `~/.mathprereq/mathprereq.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

/// `[graph]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSection {
    /// Concept graph TOML file. Defaults to `~/.mathprereq/concepts.toml`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Runtime configs (derived from AppConfig)
// ---------------------------------------------------------------------------

/// Runtime settings for the query pipeline and cache layer.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub context_chunks: usize,
    pub max_discovery_concepts: usize,
    pub stage_timeout: Duration,
    pub save_timeout: Duration,
    pub discovery_timeout: Duration,
    pub max_background_jobs: usize,
    pub cache_max_age: chrono::Duration,
    pub max_refresh_concepts: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let p = &config.pipeline;
        Self {
            context_chunks: p.context_chunks,
            max_discovery_concepts: p.max_discovery_concepts,
            stage_timeout: Duration::from_secs(p.stage_timeout_secs),
            save_timeout: Duration::from_secs(p.save_timeout_secs),
            discovery_timeout: Duration::from_secs(p.discovery_timeout_secs),
            max_background_jobs: p.max_background_jobs.max(1),
            cache_max_age: chrono::Duration::days(i64::from(config.cache.max_age_days)),
            max_refresh_concepts: config.cache.max_refresh_concepts,
        }
    }
}

/// Diversity and threshold rules applied to discovered resources.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityPolicy {
    pub min_score: f64,
    pub max_per_concept: usize,
    pub max_videos: usize,
    pub max_articles: usize,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for QualityPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_score: config.quality.min_score,
            max_per_concept: config.quality.max_per_concept,
            max_videos: config.quality.max_videos,
            max_articles: config.quality.max_articles,
        }
    }
}

/// Runtime settings for resource discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub max_concurrent: usize,
    pub requests_per_second: u32,
    pub request_timeout: Duration,
    pub source_timeout: Duration,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub recent_window: chrono::Duration,
    pub user_agent: String,
    pub quality: QualityPolicy,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for DiscoveryConfig {
    fn from(config: &AppConfig) -> Self {
        let s = &config.scraper;
        Self {
            max_concurrent: s.max_concurrent.max(1),
            requests_per_second: s.requests_per_second.max(1),
            request_timeout: Duration::from_secs(s.request_timeout_secs),
            source_timeout: Duration::from_secs(s.source_timeout_secs),
            batch_size: s.batch_size.max(1),
            batch_pause: Duration::from_millis(s.batch_pause_ms),
            recent_window: chrono::Duration::hours(i64::from(s.recent_window_hours)),
            user_agent: s.user_agent.clone(),
            quality: QualityPolicy::from(config),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.mathprereq/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MathPrereqError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.mathprereq/mathprereq.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| MathPrereqError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        MathPrereqError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MathPrereqError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MathPrereqError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MathPrereqError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the database path, falling back to `~/.mathprereq/mathprereq.db`.
pub fn resolve_db_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.storage.db_path {
        Some(path) => Ok(path.clone()),
        None => Ok(config_dir()?.join("mathprereq.db")),
    }
}

/// Resolve the concept graph path, falling back to `~/.mathprereq/concepts.toml`.
pub fn resolve_graph_path(config: &AppConfig) -> Result<PathBuf> {
    match &config.graph.path {
        Some(path) => Ok(path.clone()),
        None => Ok(config_dir()?.join("concepts.toml")),
    }
}

/// Read the OpenRouter API key from the configured env var.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.openrouter.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(MathPrereqError::config(format!(
            "OpenRouter API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("max_age_days"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.cache.max_age_days, 30);
        assert_eq!(parsed.scraper.batch_size, 3);
        assert_eq!(parsed.openrouter.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let toml_str = r#"
[scraper]
max_concurrent = 8

[quality]
min_score = 0.5

[storage]
db_path = "/tmp/mp.db"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.scraper.max_concurrent, 8);
        assert_eq!(config.scraper.requests_per_second, 2);
        assert_eq!(config.quality.min_score, 0.5);
        assert_eq!(config.quality.max_per_concept, 6);
        assert_eq!(
            resolve_db_path(&config).expect("db path"),
            PathBuf::from("/tmp/mp.db")
        );
    }

    #[test]
    fn runtime_configs_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.context_chunks, 5);
        assert_eq!(pipeline.max_discovery_concepts, 5);
        assert_eq!(pipeline.save_timeout, Duration::from_secs(10));
        assert_eq!(pipeline.cache_max_age, chrono::Duration::days(30));

        let discovery = DiscoveryConfig::from(&app);
        assert_eq!(discovery.batch_size, 3);
        assert_eq!(discovery.batch_pause, Duration::from_millis(2000));
        assert_eq!(discovery.recent_window, chrono::Duration::hours(24));
        assert_eq!(discovery.quality, QualityPolicy::default());
        assert_eq!(discovery.quality.max_videos, 3);
    }

    #[test]
    fn zero_limits_are_raised_to_one() {
        let mut app = AppConfig::default();
        app.scraper.max_concurrent = 0;
        app.scraper.batch_size = 0;
        app.pipeline.max_background_jobs = 0;
        assert_eq!(DiscoveryConfig::from(&app).max_concurrent, 1);
        assert_eq!(DiscoveryConfig::from(&app).batch_size, 1);
        assert_eq!(PipelineConfig::from(&app).max_background_jobs, 1);
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.openrouter.api_key_env = "MP_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
