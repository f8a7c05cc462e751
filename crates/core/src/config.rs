use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::group::OptionDefaults;
use crate::service::ServiceCapabilities;
use crate::training::DEFAULT_TRAINING_DAYS;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_f64(profile: &str, key: &str, default: f64) -> f64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key).as_deref() {
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        _ => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub storage: StorageConfig,
    pub defaults: OptionDefaults,
    pub platform: PlatformConfig,
    pub training: TrainingConfig,
    pub cache: CacheConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `RAD_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("RAD_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            storage: StorageConfig::from_env_profiled(p),
            defaults: OptionDefaults {
                anomaly_threshold: profiled_env_f64(p, "RAD_DEFAULT_ANOMALY_THRESHOLD", 3.0),
                minimum_anomaly_duration: profiled_env_u32(
                    p,
                    "RAD_DEFAULT_MIN_ANOMALY_DURATION",
                    5,
                ),
            },
            platform: PlatformConfig::from_env_profiled(p),
            training: TrainingConfig::from_env_profiled(p),
            cache: CacheConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  storage:   store_file={}", self.storage.store_file().display());
        tracing::info!(
            "  defaults:  anomaly_threshold={}, min_anomaly_duration={}m",
            self.defaults.anomaly_threshold,
            self.defaults.minimum_anomaly_duration
        );
        tracing::info!(
            "  platform:  shared_model_groups={}, training_in_add={}",
            self.platform.allow_shared_model_groups,
            self.platform.training_config_in_add_group
        );
        tracing::info!("  training:  default_days={}", self.training.default_days);
        tracing::info!(
            "  cache:     score_ttl={}s, anomaly_ttl={}s, capacity={}",
            self.cache.score_ttl_secs,
            self.cache.anomaly_ttl_secs,
            self.cache.score_capacity
        );
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "RAD_DATA_DIR", "data")),
        }
    }

    /// Default location of the JSON configuration store.
    pub fn store_file(&self) -> PathBuf {
        self.data_dir.join("rad-groups.json")
    }
}

// ── Platform capabilities ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub allow_shared_model_groups: bool,
    pub training_config_in_add_group: bool,
    pub historical_anomalies_available: bool,
    pub fit_score_available: bool,
}

impl PlatformConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            allow_shared_model_groups: profiled_env_bool(p, "RAD_ALLOW_SHARED_MODEL_GROUPS", true),
            training_config_in_add_group: profiled_env_bool(
                p,
                "RAD_TRAINING_CONFIG_IN_ADD_GROUP",
                true,
            ),
            historical_anomalies_available: profiled_env_bool(p, "RAD_HISTORICAL_ANOMALIES", true),
            fit_score_available: profiled_env_bool(p, "RAD_FIT_SCORE", true),
        }
    }

    pub fn capabilities(&self) -> ServiceCapabilities {
        ServiceCapabilities {
            allow_shared_model_groups: self.allow_shared_model_groups,
            training_config_in_add_group: self.training_config_in_add_group,
            historical_anomalies_available: self.historical_anomalies_available,
            fit_score_available: self.fit_score_available,
        }
    }
}

// ── Training ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Length of the default training range offered for new models.
    pub default_days: u32,
}

impl TrainingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            default_days: profiled_env_u32(p, "RAD_TRAINING_DEFAULT_DAYS", DEFAULT_TRAINING_DAYS),
        }
    }
}

// ── Caches ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub score_ttl_secs: u64,
    pub anomaly_ttl_secs: u64,
    pub score_capacity: usize,
}

impl CacheConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            score_ttl_secs: profiled_env_u64(p, "RAD_SCORE_CACHE_TTL_SECS", 300),
            anomaly_ttl_secs: profiled_env_u64(p, "RAD_ANOMALY_CACHE_TTL_SECS", 300),
            score_capacity: profiled_env_u64(p, "RAD_SCORE_CACHE_CAPACITY", 1000) as usize,
        }
    }
}
