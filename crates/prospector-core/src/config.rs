//! Configuration management for Prospector.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. Every section falls back to built-in
//! defaults, so any subset of keys may be absent.

use crate::error::{ConfigError, ConfigResult};
use crate::types::RunMode;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration.
///
/// This is loaded from `~/.config/prospector/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Search provider settings
    pub search: SearchConfig,
    /// Fetch layer settings
    pub fetch: FetchConfig,
    /// Contact extraction settings
    pub extract: ExtractConfig,
    /// Scoring and acceptance settings
    pub scoring: ScoringConfig,
    /// Query selection settings
    pub selector: SelectorConfig,
    /// Persistence settings
    pub storage: StorageConfig,
    /// Query/portal catalog settings
    pub catalog: CatalogConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Run loop settings
    pub run: RunConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path, falling back to defaults if missing.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// See [`AppConfig::apply_env_overrides`] for the supported variables.
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    ///
    /// Supported variables:
    /// - `PROSPECTOR_DATABASE_URL`: switch to the Postgres backend with this URL
    /// - `PROSPECTOR_SQLITE_PATH`: SQLite database file
    /// - `PROSPECTOR_MIN_SCORE`: minimum acceptance score
    /// - `PROSPECTOR_GOOGLE_CSE`: `key:engine,key:engine` credential pairs
    /// - `PROSPECTOR_BRAVE_KEYS`: `key,key` secondary API keys
    /// - `PROSPECTOR_PROXY_URL`: proxy for the keyless web search
    /// - `PROSPECTOR_DIRECT_CONNECTION`: bypass inherited proxy settings (true/false)
    /// - `PROSPECTOR_ALLOW_INSECURE_TLS`: permit the unverified-TLS fallback (true/false)
    /// - `PROSPECTOR_RUN_MODE`: `job-seekers`, `companies` or `passive-candidates`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PROSPECTOR_DATABASE_URL") {
            self.storage.backend = StorageBackend::Postgres;
            self.storage.database_url = Some(url);
            tracing::debug!("Override storage backend from env: postgres");
        }

        if let Some(path) = lookup("PROSPECTOR_SQLITE_PATH") {
            self.storage.sqlite_path = Some(PathBuf::from(path));
        }

        if let Some(val) = lookup("PROSPECTOR_MIN_SCORE") {
            match val.parse() {
                Ok(score) => {
                    self.scoring.min_score = score;
                    tracing::debug!("Override scoring.min_score from env: {}", score);
                }
                Err(_) => ignored_override("PROSPECTOR_MIN_SCORE", &val),
            }
        }

        if let Some(val) = lookup("PROSPECTOR_GOOGLE_CSE") {
            self.search.google_credentials = val
                .split(',')
                .filter_map(|pair| {
                    let (key, engine) = pair.trim().split_once(':')?;
                    Some(ApiCredential {
                        api_key: key.to_string(),
                        engine_id: engine.to_string(),
                    })
                })
                .collect();
            tracing::debug!(
                count = self.search.google_credentials.len(),
                "Override indexed-search credentials from env"
            );
        }

        if let Some(val) = lookup("PROSPECTOR_BRAVE_KEYS") {
            self.search.brave_api_keys = val
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(val) = lookup("PROSPECTOR_PROXY_URL") {
            self.search.proxy_url = Some(val);
        }

        if let Some(val) = lookup("PROSPECTOR_DIRECT_CONNECTION") {
            match val.parse() {
                Ok(direct) => self.search.direct_connection = direct,
                Err(_) => ignored_override("PROSPECTOR_DIRECT_CONNECTION", &val),
            }
        }

        if let Some(val) = lookup("PROSPECTOR_ALLOW_INSECURE_TLS") {
            match val.parse() {
                Ok(insecure) => self.fetch.allow_insecure_tls = insecure,
                Err(_) => ignored_override("PROSPECTOR_ALLOW_INSECURE_TLS", &val),
            }
        }

        if let Some(val) = lookup("PROSPECTOR_RUN_MODE") {
            match RunMode::parse(&val) {
                Some(mode) => self.run.mode = mode,
                None => ignored_override("PROSPECTOR_RUN_MODE", &val),
            }
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.fetch.max_concurrent == 0 {
            return Err(invalid("fetch.max_concurrent", "must be at least 1"));
        }
        if self.fetch.per_host_max == 0 {
            return Err(invalid("fetch.per_host_max", "must be at least 1"));
        }
        if self.fetch.max_retries > 2 {
            return Err(invalid("fetch.max_retries", "must be 0-2"));
        }
        if !(4..=6).contains(&self.selector.core_size) {
            return Err(invalid("selector.core_size", "must be 4-6"));
        }
        if !(0.0..=1.0).contains(&self.selector.core_fraction) {
            return Err(invalid("selector.core_fraction", "must be within 0.0-1.0"));
        }
        if self.scoring.min_score > 100 {
            return Err(invalid("scoring.min_score", "must be 0-100"));
        }
        if self.storage.backend == StorageBackend::Postgres && self.storage.database_url.is_none()
        {
            return Err(invalid(
                "storage.database_url",
                "required for the postgres backend",
            ));
        }
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/prospector/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "prospector", "prospector")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/prospector`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("com", "prospector", "prospector")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

/// A credential pair for the indexed-search API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCredential {
    /// API key
    pub api_key: String,
    /// Search engine / context identifier
    pub engine_id: String,
}

/// Search provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SearchConfig {
    /// Credential pairs for the indexed-search API, rotated on quota errors
    pub google_credentials: Vec<ApiCredential>,
    /// Keys for the secondary search API
    pub brave_api_keys: Vec<String>,
    /// Enable the keyless web-search provider
    pub duckduckgo_enabled: bool,
    /// Enable direct portal crawlers
    pub portals_enabled: bool,
    /// Optional proxy for the keyless provider (e.g. `socks5h://127.0.0.1:9050`)
    pub proxy_url: Option<String>,
    /// Ignore inherited proxy environment variables
    pub direct_connection: bool,
    /// Maximum result pages fetched per provider per query
    pub max_pages_per_provider: u32,
    /// Results requested per page
    pub results_per_page: u32,
    /// Freshness hint passed to providers (`day`, `week`, `month`)
    pub freshness: Option<String>,
    /// Query-result cache lifetime in hours
    pub query_cache_ttl_hours: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            google_credentials: Vec::new(),
            brave_api_keys: Vec::new(),
            duckduckgo_enabled: true,
            portals_enabled: true,
            proxy_url: None,
            direct_connection: false,
            max_pages_per_provider: 3,
            results_per_page: 10,
            freshness: Some("month".to_string()),
            query_cache_ttl_hours: 24,
            timeout_secs: 20,
        }
    }
}

/// Fetch layer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct FetchConfig {
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Maximum in-flight fetches across all hosts
    pub max_concurrent: usize,
    /// Maximum in-flight fetches per host
    pub per_host_max: usize,
    /// Minimum spacing between requests to the same host
    pub host_min_delay_ms: u64,
    /// Random jitter added to spacing and timeouts
    pub jitter_ms: u64,
    /// Retries for transient statuses (0-2)
    pub max_retries: u32,
    /// Largest accepted response body in bytes
    pub max_response_bytes: usize,
    /// User agent string
    pub user_agent: String,
    /// Issue a HEAD request before GET
    pub head_preflight: bool,
    /// Whether to respect robots.txt
    pub respect_robots_txt: bool,
    /// Permit the unverified-TLS fallback
    pub allow_insecure_tls: bool,
    /// Process PDF responses
    pub enable_pdf: bool,
    /// URL-fetch cache lifetime in hours
    pub url_cache_ttl_hours: u64,
    /// How long a penalized host stays throttled, in seconds
    pub host_penalty_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            connect_timeout_secs: 8,
            max_concurrent: 16,
            per_host_max: 2,
            host_min_delay_ms: 750,
            jitter_ms: 400,
            max_retries: 1,
            max_response_bytes: 3 * 1024 * 1024,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".to_string(),
            head_preflight: true,
            respect_robots_txt: true,
            allow_insecure_tls: false,
            enable_pdf: false,
            url_cache_ttl_hours: 24 * 7,
            host_penalty_secs: 300,
        }
    }
}

/// Contact extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Country code applied to national numbers (without `+`)
    pub default_country_code: String,
    /// Characters searched on each side of a match for a relevant keyword
    pub context_window_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            default_country_code: "49".to_string(),
            context_window_chars: 400,
        }
    }
}

/// Scoring and acceptance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum score for a lead to be accepted
    pub min_score: u8,
    /// Maximum accepted leads per domain per run
    pub max_leads_per_domain: u32,
    /// Flat bonus for contact-page extractions
    pub contact_page_bonus: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_score: 40,
            max_leads_per_domain: 5,
            contact_page_bonus: 15,
        }
    }
}

/// Query selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Size of the proven core pool (4-6)
    pub core_size: usize,
    /// Share of each cycle's queries drawn from the core pool
    pub core_fraction: f64,
    /// Queries issued per cycle
    pub queries_per_cycle: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            core_size: 5,
            core_fraction: 0.8,
            queries_per_cycle: 10,
        }
    }
}

/// Which persistence backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Embedded single-file store
    #[default]
    Sqlite,
    /// Networked relational store
    Postgres,
    /// Volatile in-process store
    Memory,
}

/// Persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend selector
    pub backend: StorageBackend,
    /// SQLite file path (defaults to the data dir)
    pub sqlite_path: Option<PathBuf>,
    /// Postgres connection URL
    pub database_url: Option<String>,
    /// Connection pool size
    pub max_connections: u32,
    /// Days before an executed query may be re-issued
    pub query_freshness_days: u32,
    /// Days a seen URL stays blocked from re-processing
    pub url_retention_days: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite_path: None,
            database_url: None,
            max_connections: 5,
            query_freshness_days: 14,
            url_retention_days: 90,
        }
    }
}

/// Query/portal catalog settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Directory holding `queries.toml`, `domains.toml` and `portals/`
    pub dir: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Output format
    pub format: LogFormat,
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            level: "info".to_string(),
        }
    }
}

/// Run loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Discovery mode
    pub mode: RunMode,
    /// Number of cycles to execute
    pub cycles: u32,
    /// Pause between cycles in seconds
    pub pause_between_cycles_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::JobSeekers,
            cycles: 1,
            pause_between_cycles_secs: 30,
        }
    }
}

fn ignored_override(var: &str, value: &str) {
    tracing::warn!(var, value, "Ignoring unparsable environment override");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.scoring.min_score, 40);
        assert_eq!(config.selector.core_size, 5);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.query_freshness_days, 14);
        assert!(config.fetch.respect_robots_txt);
        assert!(!config.fetch.allow_insecure_tls);
        config.validate().expect("defaults are valid");
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[search]"));
        assert!(toml_str.contains("[fetch]"));
        assert!(toml_str.contains("[storage]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.fetch.max_concurrent, config.fetch.max_concurrent);
    }

    #[test]
    fn test_config_load_from_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("config.toml");

        let mut config = AppConfig::default();
        config.scoring.min_score = 55;
        config.run.mode = RunMode::Companies;
        fs::write(
            &config_path,
            toml::to_string_pretty(&config).expect("serialize config"),
        )
        .expect("write config file");

        let loaded = AppConfig::load_from(&config_path).expect("load config");
        assert_eq!(loaded.scoring.min_score, 55);
        assert_eq!(loaded.run.mode, RunMode::Companies);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().expect("create temp dir");
        let loaded = AppConfig::load_from(&tmp.path().join("absent.toml")).expect("load");
        assert_eq!(loaded.scoring.min_score, 40);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[fetch]
max_concurrent = 4

[search]
google_credentials = [{ api_key = "k1", engine_id = "cx1" }]
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.fetch.max_concurrent, 4);
        assert_eq!(config.search.google_credentials.len(), 1);
        // These should be defaults
        assert_eq!(config.fetch.per_host_max, 2);
        assert_eq!(config.scoring.max_leads_per_domain, 5);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PROSPECTOR_DATABASE_URL", "postgres://localhost/leads"),
            ("PROSPECTOR_MIN_SCORE", "60"),
            ("PROSPECTOR_GOOGLE_CSE", "k1:cx1, k2:cx2,broken"),
            ("PROSPECTOR_BRAVE_KEYS", "b1,,b2"),
            ("PROSPECTOR_DIRECT_CONNECTION", "true"),
            ("PROSPECTOR_RUN_MODE", "passive-candidates"),
        ]);

        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.storage.backend, StorageBackend::Postgres);
        assert_eq!(
            config.storage.database_url.as_deref(),
            Some("postgres://localhost/leads")
        );
        assert_eq!(config.scoring.min_score, 60);
        assert_eq!(config.search.google_credentials.len(), 2);
        assert_eq!(config.search.google_credentials[1].engine_id, "cx2");
        assert_eq!(config.search.brave_api_keys, vec!["b1", "b2"]);
        assert!(config.search.direct_connection);
        assert_eq!(config.run.mode, RunMode::PassiveCandidates);
        config.validate().expect("overridden config is valid");
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut config = AppConfig::default();
        config.selector.core_size = 9;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.fetch.max_retries = 3;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Postgres;
        assert!(config.validate().is_err());
    }
}
