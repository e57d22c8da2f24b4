//! Application configuration for Draftline.
//!
//! User config lives at `~/.draftline/draftline.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DraftlineError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "draftline.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".draftline";

// ---------------------------------------------------------------------------
// Config structs (matching draftline.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Site-wide settings.
    #[serde(default)]
    pub site: SiteConfig,

    /// Batch orchestration settings.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Generation service settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// CMS publish API settings.
    #[serde(default)]
    pub cms: CmsConfig,

    /// Image service settings.
    #[serde(default)]
    pub images: ImageConfig,

    /// Forum monitor settings.
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Public site base URL, used to absolutize internal links.
    #[serde(default = "default_site_url")]
    pub base_url: String,

    /// Taxonomy table path (TOML).
    #[serde(default = "default_taxonomy_path")]
    pub taxonomy_path: String,

    /// Redirect seed map path (TOML).
    #[serde(default = "default_redirects_path")]
    pub redirects_path: String,

    /// Local database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Pre-written draft backlog directory (empty disables backlog ingestion).
    #[serde(default)]
    pub backlog_dir: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_site_url(),
            taxonomy_path: default_taxonomy_path(),
            redirects_path: default_redirects_path(),
            db_path: default_db_path(),
            backlog_dir: String::new(),
        }
    }
}

fn default_site_url() -> String {
    "https://example.com".into()
}
fn default_taxonomy_path() -> String {
    "data/taxonomy.toml".into()
}
fn default_redirects_path() -> String {
    "data/redirects.toml".into()
}
fn default_db_path() -> String {
    "data/draftline.db".into()
}

/// `[batch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Number of documents per run.
    #[serde(default = "default_batch_size")]
    pub size: u32,

    /// Concurrent items in flight. Items are independent except for the
    /// redirect registry, which is single-writer regardless of this value.
    #[serde(default = "default_batch_concurrency")]
    pub concurrency: u32,

    /// Backlog folder names in publish-priority order. Folders not listed
    /// sort last, alphabetically.
    #[serde(default = "default_folder_priority")]
    pub folder_priority: Vec<String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            concurrency: default_batch_concurrency(),
            folder_priority: default_folder_priority(),
        }
    }
}

fn default_batch_size() -> u32 {
    4
}
fn default_batch_concurrency() -> u32 {
    2
}
fn default_folder_priority() -> Vec<String> {
    vec!["pillar-pages".into(), "cluster-pages".into()]
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Generation service endpoint.
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Regeneration attempts after a blocking validation failure.
    #[serde(default = "default_max_regenerations")]
    pub max_regenerations: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_generation_endpoint(),
            timeout_secs: default_generation_timeout(),
            max_regenerations: default_max_regenerations(),
        }
    }
}

fn default_generation_endpoint() -> String {
    "http://localhost:8700/generate".into()
}
fn default_generation_timeout() -> u64 {
    120
}
fn default_max_regenerations() -> u32 {
    3
}

/// `[cms]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsConfig {
    /// CMS base URL (the publish API lives under `/api`).
    #[serde(default = "default_cms_url")]
    pub base_url: String,

    /// CMS username for Basic auth.
    #[serde(default)]
    pub username: String,

    /// Name of the env var holding the app password (never store the secret).
    #[serde(default = "default_password_env")]
    pub app_password_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_cms_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient failures.
    #[serde(default = "default_cms_retries")]
    pub max_retries: u32,

    /// Base backoff between retries in milliseconds (doubles per attempt).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            base_url: default_cms_url(),
            username: String::new(),
            app_password_env: default_password_env(),
            timeout_secs: default_cms_timeout(),
            max_retries: default_cms_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_cms_url() -> String {
    "http://localhost:8701".into()
}
fn default_password_env() -> String {
    "DRAFTLINE_CMS_PASSWORD".into()
}
fn default_cms_timeout() -> u64 {
    30
}
fn default_cms_retries() -> u32 {
    3
}
fn default_backoff_ms() -> u64 {
    500
}

/// `[images]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Image service endpoint (empty disables media attachment).
    #[serde(default)]
    pub endpoint: String,

    /// Request timeout in seconds.
    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_secs: default_image_timeout(),
        }
    }
}

fn default_image_timeout() -> u64 {
    60
}

/// `[monitor]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Forums to scan.
    #[serde(default)]
    pub forums: Vec<ForumEntry>,

    /// Candidates emitted per forum per tick.
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Ledger TTL: a thread becomes eligible for re-emission after this.
    #[serde(default = "default_ledger_ttl_days")]
    pub ledger_ttl_days: u32,

    /// Monitor tick interval in minutes (used for the run period key).
    #[serde(default = "default_tick_minutes")]
    pub tick_minutes: u32,

    /// Scan window: threads older than this are ignored.
    #[serde(default = "default_scan_window_hours")]
    pub scan_window_hours: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            forums: Vec::new(),
            top_k: default_top_k(),
            ledger_ttl_days: default_ledger_ttl_days(),
            tick_minutes: default_tick_minutes(),
            scan_window_hours: default_scan_window_hours(),
        }
    }
}

fn default_top_k() -> u32 {
    5
}
fn default_ledger_ttl_days() -> u32 {
    30
}
fn default_tick_minutes() -> u32 {
    360
}
fn default_scan_window_hours() -> u32 {
    24
}

/// `[[monitor.forums]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForumEntry {
    /// Forum name (used in candidate records and logs).
    pub name: String,
    /// Thread listing endpoint returning JSON.
    pub url: String,
    /// Threads to request per scan.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: u32,
    /// Minimum thread score to consider.
    #[serde(default = "default_min_score")]
    pub min_score: i64,
}

fn default_scan_limit() -> u32 {
    50
}
fn default_min_score() -> i64 {
    2
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.draftline/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DraftlineError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.draftline/draftline.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| DraftlineError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        DraftlineError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DraftlineError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DraftlineError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DraftlineError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the CMS app password env var is set and non-empty.
pub fn validate_cms_credentials(config: &AppConfig) -> Result<String> {
    let var_name = &config.cms.app_password_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(DraftlineError::config(format!(
            "CMS app password not found. Set the {var_name} environment variable."
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
        assert!(toml_str.contains("taxonomy_path"));
        assert!(toml_str.contains("DRAFTLINE_CMS_PASSWORD"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.batch.concurrency, 2);
        assert_eq!(parsed.generation.max_regenerations, 3);
        assert_eq!(parsed.monitor.ledger_ttl_days, 30);
    }

    #[test]
    fn config_with_forums() {
        let toml_str = r#"
[cms]
base_url = "https://cms.example.com"

[[monitor.forums]]
name = "sales"
url = "https://forum.example.com/sales/new.json"
min_score = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.monitor.forums.len(), 1);
        assert_eq!(config.monitor.forums[0].scan_limit, 50);
        assert_eq!(config.monitor.forums[0].min_score, 5);
    }

    #[test]
    fn cms_credential_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.cms.app_password_env = "DL_TEST_NONEXISTENT_KEY_98431".into();
        let result = validate_cms_credentials(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("app password not found"));
    }
}
