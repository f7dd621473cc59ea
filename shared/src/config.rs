use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::advice::AdviceTable;
use crate::capabilities::{KeyNamespace, KvKey, ValidatedUrl};
use crate::{DEFAULT_ENDPOINT, DEFAULT_HISTORY_CAP, DEFAULT_HISTORY_KEY, MAX_UTC_OFFSET_MINUTES};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("history cap must be at least 1")]
    InvalidCap,

    #[error("invalid history key: {0}")]
    InvalidHistoryKey(String),

    #[error("utc offset {0} minutes is out of range")]
    InvalidUtcOffset(i32),

    #[error("advice for '{label}' is empty")]
    EmptyAdvice { label: String },

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Everything the core needs at construction time. Replaces module-level
/// globals; one instance lives as long as the host application.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub endpoint: String,
    pub history_key: String,
    pub history_cap: usize,
    pub utc_offset_minutes: i32,
    pub advice: AdviceTable,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            history_key: DEFAULT_HISTORY_KEY.to_string(),
            history_cap: DEFAULT_HISTORY_CAP,
            utc_offset_minutes: 0,
            advice: AdviceTable::default(),
        }
    }
}

impl AppConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_cap == 0 {
            return Err(ConfigError::InvalidCap);
        }
        self.endpoint_url()?;
        self.history_kv_key()?;
        self.utc_offset()?;
        self.advice.validate()
    }

    pub fn endpoint_url(&self) -> Result<ValidatedUrl, ConfigError> {
        ValidatedUrl::new(self.endpoint.as_str())
            .map_err(|e| ConfigError::InvalidEndpoint(e.to_string()))
    }

    pub fn history_kv_key(&self) -> Result<KvKey, ConfigError> {
        KvKey::new(KeyNamespace::History, self.history_key.as_str())
            .map_err(|e| ConfigError::InvalidHistoryKey(e.to_string()))
    }

    pub fn utc_offset(&self) -> Result<FixedOffset, ConfigError> {
        if self.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(ConfigError::InvalidUtcOffset(self.utc_offset_minutes));
        }
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .ok_or(ConfigError::InvalidUtcOffset(self.utc_offset_minutes))
    }
}
