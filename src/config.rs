use crate::poller::PollBudget;
use crate::provider::JobKind;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_TARGET_LANGUAGE: &str = "en";
pub const DEBOUNCE_MS: u64 = 750;
pub const COOLDOWN_MS: u64 = 1000;
const COOLDOWN_CAPACITY: usize = 32;
const HISTORY_LIMIT: usize = 50;
const SUBMIT_MAX_RETRIES: u8 = 1;

const ENV_CONFIG_PATH: &str = "GENRELAY_CONFIG";
const ENV_TARGET_LANGUAGE: &str = "GENRELAY_TARGET_LANGUAGE";
const ENV_DEBOUNCE_MS: &str = "GENRELAY_DEBOUNCE_MS";
const ENV_COOLDOWN_MS: &str = "GENRELAY_COOLDOWN_MS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEngineConfig")]
pub struct EngineConfig {
    pub image: PollBudget,
    pub video: PollBudget,
    pub translation: TranslationConfig,
    pub submit_max_retries: u8,
    pub history_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            image: PollBudget::for_kind(JobKind::Image),
            video: PollBudget::for_kind(JobKind::Video),
            translation: TranslationConfig::default(),
            submit_max_retries: SUBMIT_MAX_RETRIES,
            history_limit: HISTORY_LIMIT,
        }
    }
}

// Budgets are merged field by field over the per-kind defaults, which differ
// between image and video.
#[derive(Deserialize)]
#[serde(default)]
struct RawEngineConfig {
    image: BudgetOverrides,
    video: BudgetOverrides,
    translation: TranslationConfig,
    submit_max_retries: u8,
    history_limit: usize,
}

impl Default for RawEngineConfig {
    fn default() -> Self {
        Self {
            image: BudgetOverrides::default(),
            video: BudgetOverrides::default(),
            translation: TranslationConfig::default(),
            submit_max_retries: SUBMIT_MAX_RETRIES,
            history_limit: HISTORY_LIMIT,
        }
    }
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct BudgetOverrides {
    interval_ms: Option<u64>,
    max_attempts: Option<u32>,
    max_not_found: Option<u32>,
}

impl BudgetOverrides {
    fn apply(self, kind: JobKind) -> PollBudget {
        let base = PollBudget::for_kind(kind);
        PollBudget {
            interval_ms: self.interval_ms.unwrap_or(base.interval_ms),
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            max_not_found: self.max_not_found.unwrap_or(base.max_not_found),
        }
    }
}

impl From<RawEngineConfig> for EngineConfig {
    fn from(raw: RawEngineConfig) -> Self {
        Self {
            image: raw.image.apply(JobKind::Image),
            video: raw.video.apply(JobKind::Video),
            translation: raw.translation,
            submit_max_retries: raw.submit_max_retries,
            history_limit: raw.history_limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub debounce_ms: u64,
    pub cooldown_ms: u64,
    pub target_language: String,
    pub cooldown_capacity: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEBOUNCE_MS,
            cooldown_ms: COOLDOWN_MS,
            target_language: DEFAULT_TARGET_LANGUAGE.to_string(),
            cooldown_capacity: COOLDOWN_CAPACITY,
        }
    }
}

impl TranslationConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `.env`, then an optional JSON file named by `GENRELAY_CONFIG`,
    /// then applies individual environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = match env::var(ENV_CONFIG_PATH) {
            Ok(path) if !path.trim().is_empty() => {
                tracing::info!("Loading engine config from {}", path);
                Self::load(path.trim())?
            }
            _ => Self::default(),
        };

        if let Ok(language) = env::var(ENV_TARGET_LANGUAGE) {
            config.translation.target_language = language.trim().to_string();
        }
        if let Some(ms) = env_millis(ENV_DEBOUNCE_MS)? {
            config.translation.debounce_ms = ms;
        }
        if let Some(ms) = env_millis(ENV_COOLDOWN_MS)? {
            config.translation.cooldown_ms = ms;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, budget) in [("image", &self.image), ("video", &self.video)] {
            if budget.interval_ms == 0 {
                return Err(invalid(format!("{}.interval_ms", field), "must be positive"));
            }
            if budget.max_attempts == 0 {
                return Err(invalid(format!("{}.max_attempts", field), "must be positive"));
            }
        }

        if self.translation.target_language.trim().is_empty() {
            return Err(invalid("translation.target_language", "must not be empty"));
        }
        if self.history_limit == 0 {
            return Err(invalid("history_limit", "must be positive"));
        }

        Ok(())
    }
}

fn env_millis(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| invalid(key, e.to_string())),
        Err(_) => Ok(None),
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
}
