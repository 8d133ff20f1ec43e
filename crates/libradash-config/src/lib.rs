//! Shared configuration for libradash consumers.
//!
//! TOML file + environment loading, API token resolution, and
//! translation into `libradash_api::TransportConfig` and
//! `libradash_core::CacheSettings`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use libradash_api::TransportConfig;
use libradash_core::{CacheSettings, FallbackPolicy, RetryPolicy};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Backend connection.
    #[serde(default)]
    pub backend: Backend,

    /// Cache behavior.
    #[serde(default)]
    pub cache: Cache,

    /// Retry behavior for transient fetch failures.
    #[serde(default)]
    pub retry: Retry,

    /// Demo-data fallback.
    #[serde(default)]
    pub fallback: Fallback,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Backend {
    /// Backend base URL (e.g., "https://stats.example.org/api/").
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// API token (plaintext — prefer the env var).
    pub api_token: Option<String>,

    /// Environment variable name containing the API token.
    pub api_token_env: Option<String>,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            api_token: None,
            api_token_env: None,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api/".into()
}
fn default_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Cache {
    /// How long a fetched result stays fresh, in milliseconds.
    #[serde(default = "default_stale_time_ms")]
    pub stale_time_ms: u64,

    /// How long an unsubscribed entry survives before garbage
    /// collection, in milliseconds.
    #[serde(default = "default_cache_time_ms")]
    pub cache_time_ms: u64,

    /// Garbage-collection sweep interval in seconds.
    #[serde(default = "default_gc_interval")]
    pub gc_interval_secs: u64,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            stale_time_ms: default_stale_time_ms(),
            cache_time_ms: default_cache_time_ms(),
            gc_interval_secs: default_gc_interval(),
        }
    }
}

fn default_stale_time_ms() -> u64 {
    30_000
}
fn default_cache_time_ms() -> u64 {
    300_000
}
fn default_gc_interval() -> u64 {
    60
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Retry {
    /// Total attempts including the first; `1` disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff strategy: "exponential", "constant", or "none".
    #[serde(default = "default_backoff")]
    pub backoff: String,

    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff() -> String {
    "exponential".into()
}
fn default_base_delay_ms() -> u64 {
    500
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Fallback {
    /// When `true`, maskable transport failures are substituted with
    /// deterministic demo data.
    #[serde(default)]
    pub enabled: bool,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "libradash", "libradash").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("libradash");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from an explicit file path + environment.
/// A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("LIBRADASH_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, falling back to defaults on any failure.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

/// Serialize config to TOML and write to an explicit path.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Resolve the optional API token: named env var first, then the
/// plaintext config value.
pub fn resolve_api_token(backend: &Backend) -> Option<SecretString> {
    if let Some(ref env_name) = backend.api_token_env {
        if let Ok(val) = std::env::var(env_name) {
            return Some(SecretString::from(val));
        }
    }
    backend
        .api_token
        .as_ref()
        .map(|token| SecretString::from(token.clone()))
}

// ── Translation ─────────────────────────────────────────────────────

/// Build a `TransportConfig` from the backend section.
pub fn transport_config(backend: &Backend) -> Result<TransportConfig, ConfigError> {
    let base_url: url::Url = backend
        .base_url
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "backend.base_url".into(),
            reason: format!("invalid URL: {}", backend.base_url),
        })?;

    let mut transport =
        TransportConfig::new(base_url).with_timeout(Duration::from_secs(backend.timeout_secs));
    if let Some(token) = resolve_api_token(backend) {
        transport = transport.with_api_token(token);
    }
    Ok(transport)
}

/// Build a `RetryPolicy` from the retry section.
pub fn retry_policy(retry: &Retry) -> Result<RetryPolicy, ConfigError> {
    let base = Duration::from_millis(retry.base_delay_ms);
    match retry.backoff.as_str() {
        "exponential" => Ok(RetryPolicy::exponential(retry.max_attempts, base)),
        "constant" => Ok(RetryPolicy::constant(retry.max_attempts, base)),
        "none" => Ok(RetryPolicy::none()),
        other => Err(ConfigError::Validation {
            field: "retry.backoff".into(),
            reason: format!("expected 'exponential', 'constant', or 'none', got '{other}'"),
        }),
    }
}

/// Build client-wide `CacheSettings` from the loaded config.
pub fn cache_settings(config: &Config) -> Result<CacheSettings, ConfigError> {
    Ok(CacheSettings {
        stale_time: Duration::from_millis(config.cache.stale_time_ms),
        cache_time: Duration::from_millis(config.cache.cache_time_ms),
        retry: retry_policy(&config.retry)?,
        gc_interval: Duration::from_secs(config.cache.gc_interval_secs),
        fallback: if config.fallback.enabled {
            FallbackPolicy::on()
        } else {
            FallbackPolicy::off()
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.cache.stale_time_ms, 30_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(!config.fallback.enabled);
    }

    #[test]
    fn file_values_override_defaults() {
        let (_dir, path) = write_config(
            r#"
            [backend]
            base_url = "https://stats.example.org/api/"
            timeout_secs = 10

            [cache]
            stale_time_ms = 5000

            [fallback]
            enabled = true
            "#,
        );

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.backend.base_url, "https://stats.example.org/api/");
        assert_eq!(config.backend.timeout_secs, 10);
        assert_eq!(config.cache.stale_time_ms, 5000);
        // Untouched sections keep their defaults.
        assert_eq!(config.cache.cache_time_ms, 300_000);
        assert!(config.fallback.enabled);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            cache: Cache {
                stale_time_ms: 1234,
                ..Cache::default()
            },
            ..Config::default()
        };
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.cache.stale_time_ms, 1234);
    }

    #[test]
    fn cache_settings_translation() {
        let config = Config {
            cache: Cache {
                stale_time_ms: 5000,
                cache_time_ms: 60_000,
                gc_interval_secs: 15,
            },
            fallback: Fallback { enabled: true },
            ..Config::default()
        };

        let settings = cache_settings(&config).unwrap();
        assert_eq!(settings.stale_time, Duration::from_millis(5000));
        assert_eq!(settings.cache_time, Duration::from_secs(60));
        assert_eq!(settings.gc_interval, Duration::from_secs(15));
        assert!(settings.fallback.enabled);
    }

    #[test]
    fn retry_section_maps_to_policy() {
        let constant = Retry {
            max_attempts: 5,
            backoff: "constant".into(),
            base_delay_ms: 100,
        };
        assert_eq!(
            retry_policy(&constant).unwrap(),
            RetryPolicy::constant(5, Duration::from_millis(100))
        );

        let none = Retry {
            backoff: "none".into(),
            ..Retry::default()
        };
        assert_eq!(retry_policy(&none).unwrap(), RetryPolicy::none());

        let bogus = Retry {
            backoff: "fibonacci".into(),
            ..Retry::default()
        };
        assert!(matches!(
            retry_policy(&bogus),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let backend = Backend {
            base_url: "not a url".into(),
            ..Backend::default()
        };
        assert!(matches!(
            transport_config(&backend),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn api_token_env_var_wins_over_plaintext() {
        let backend = Backend {
            api_token: Some("plaintext".into()),
            api_token_env: Some("LIBRADASH_TEST_TOKEN_UNSET".into()),
            ..Backend::default()
        };
        // Env var not set: plaintext is the fallback.
        let token = resolve_api_token(&backend).unwrap();
        assert_eq!(secrecy::ExposeSecret::expose_secret(&token), "plaintext");
    }
}
