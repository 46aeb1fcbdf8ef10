//! Configuration for the short-term memory engine.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (STM_*)
//! 2. Config file (path from `STM_CONFIG`)
//! 3. Default values

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StmResult;
use crate::scoring::KeywordWeights;

/// Scope within which identical content counts as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupScope {
    /// Identical content in two different sessions is not a duplicate.
    #[default]
    Session,
    /// Identical content anywhere in the store is a duplicate.
    Global,
}

impl std::fmt::Display for DedupScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DedupScope::Session => write!(f, "session"),
            DedupScope::Global => write!(f, "global"),
        }
    }
}

impl std::str::FromStr for DedupScope {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "session" => Ok(DedupScope::Session),
            "global" => Ok(DedupScope::Global),
            _ => Err(format!("Invalid dedup scope: {}", s)),
        }
    }
}

/// When entries are handed to long-term memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionMode {
    /// Only on explicit `promote` calls.
    #[default]
    Manual,
    /// Right after insertion, when the entry scores at or above the threshold.
    OnInsert,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StmConfig {
    /// Default time-to-live for new entries, in seconds
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Deduplication scope
    #[serde(default)]
    pub dedup_scope: DedupScope,

    /// Importance scoring settings
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Promotion settings
    #[serde(default)]
    pub promotion: PromotionConfig,

    /// Expiry sweep settings
    #[serde(default)]
    pub sweep: SweepConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Keyword -> weight table. Replaces the built-in table when present.
    #[serde(default)]
    pub keyword_weights: Option<BTreeMap<String, f64>>,

    /// Added when the text contains a question mark
    #[serde(default = "default_question_bonus")]
    pub question_bonus: f64,

    /// Added for texts longer than 200 characters
    #[serde(default = "default_length_bonus")]
    pub length_bonus: f64,

    /// Added when the user explicitly asked to remember something
    #[serde(default = "default_explicit_request_bonus")]
    pub explicit_request_bonus: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionConfig {
    /// Minimum importance for promotion (0.0 - 1.0)
    #[serde(default = "default_promotion_threshold")]
    pub threshold: f64,

    /// Promotion trigger
    #[serde(default)]
    pub mode: PromotionMode,

    /// Remove entries from short-term memory once promoted
    #[serde(default)]
    pub remove_after_promotion: bool,

    /// Upper bound on a single long-term store call, in seconds
    #[serde(default = "default_promotion_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Evict expired entries before every recall
    #[serde(default = "default_true")]
    pub lazy_on_read: bool,

    /// Background sweep interval in seconds; no background task when unset
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

/// Longest accepted time to live: 100 years.
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Whole seconds, rounding any fraction up.
fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn default_ttl_secs() -> u64 {
    1800 // 30 minutes
}

fn default_question_bonus() -> f64 {
    0.1
}

fn default_length_bonus() -> f64 {
    0.1
}

fn default_explicit_request_bonus() -> f64 {
    0.4
}

fn default_promotion_threshold() -> f64 {
    0.8
}

fn default_promotion_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for StmConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            dedup_scope: DedupScope::default(),
            scoring: ScoringConfig::default(),
            promotion: PromotionConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            keyword_weights: None,
            question_bonus: default_question_bonus(),
            length_bonus: default_length_bonus(),
            explicit_request_bonus: default_explicit_request_bonus(),
        }
    }
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            threshold: default_promotion_threshold(),
            mode: PromotionMode::default(),
            remove_after_promotion: false,
            timeout_secs: default_promotion_timeout_secs(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            lazy_on_read: default_true(),
            interval_secs: None,
        }
    }
}

impl PromotionConfig {
    /// Timeout applied to each long-term store call.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SweepConfig {
    /// Background sweep interval, if enabled.
    pub fn interval(&self) -> Option<Duration> {
        self.interval_secs.map(Duration::from_secs)
    }
}

impl StmConfig {
    /// Default time-to-live for new entries.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Set the default TTL, rounded up to whole seconds
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_secs = ceil_secs(ttl);
        self
    }

    /// Set the dedup scope
    pub fn with_dedup_scope(mut self, scope: DedupScope) -> Self {
        self.dedup_scope = scope;
        self
    }

    /// Set the promotion threshold
    pub fn with_promotion_threshold(mut self, threshold: f64) -> Self {
        self.promotion.threshold = threshold;
        self
    }

    /// Set the promotion trigger
    pub fn with_promotion_mode(mut self, mode: PromotionMode) -> Self {
        self.promotion.mode = mode;
        self
    }

    /// Remove entries from short-term memory once promoted
    pub fn with_remove_after_promotion(mut self, remove: bool) -> Self {
        self.promotion.remove_after_promotion = remove;
        self
    }

    /// Set the long-term store timeout, rounded up to whole seconds
    pub fn with_promotion_timeout(mut self, timeout: Duration) -> Self {
        self.promotion.timeout_secs = ceil_secs(timeout);
        self
    }

    /// Enable the background sweeper, interval rounded up to whole seconds
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep.interval_secs = Some(ceil_secs(interval));
        self
    }

    /// Replace the keyword weight table
    pub fn with_keyword_weights(mut self, weights: BTreeMap<String, f64>) -> Self {
        self.scoring.keyword_weights = Some(weights);
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> StmResult<Self> {
        let config: StmConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> StmResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load from `STM_CONFIG` (or defaults), then apply environment overrides.
    pub fn load_default() -> StmResult<Self> {
        let config = match Self::config_path() {
            Some(path) if path.exists() => Self::load(&path)?,
            _ => StmConfig::default(),
        };
        config.apply_env()
    }

    /// Get the config file path from the environment.
    pub fn config_path() -> Option<PathBuf> {
        std::env::var("STM_CONFIG").ok().map(PathBuf::from)
    }

    /// Apply `STM_*` environment overrides.
    pub fn apply_env(self) -> StmResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup, then validate.
    pub fn apply_overrides<F>(mut self, lookup: F) -> StmResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("STM_DEFAULT_TTL_SECS") {
            self.default_ttl_secs = value.trim().parse().map_err(|_| {
                ConfigValidationError::invalid("STM_DEFAULT_TTL_SECS", "must be an integer")
            })?;
        }

        if let Some(value) = lookup("STM_PROMOTION_THRESHOLD") {
            self.promotion.threshold = value.trim().parse().map_err(|_| {
                ConfigValidationError::invalid("STM_PROMOTION_THRESHOLD", "must be a number")
            })?;
        }

        if let Some(value) = lookup("STM_DEDUP_SCOPE") {
            self.dedup_scope = value
                .trim()
                .parse()
                .map_err(|e: String| ConfigValidationError::invalid("STM_DEDUP_SCOPE", e))?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.default_ttl_secs == 0 {
            return Err(ConfigValidationError::invalid(
                "default_ttl_secs",
                "must be greater than 0",
            ));
        }

        if self.default_ttl_secs > MAX_TTL_SECS {
            return Err(ConfigValidationError::invalid(
                "default_ttl_secs",
                format!("must be at most {}", MAX_TTL_SECS),
            ));
        }

        if !(0.0..=1.0).contains(&self.promotion.threshold) {
            return Err(ConfigValidationError::invalid(
                "promotion.threshold",
                "must be between 0 and 1",
            ));
        }

        if self.promotion.timeout_secs == 0 {
            return Err(ConfigValidationError::invalid(
                "promotion.timeout_secs",
                "must be greater than 0",
            ));
        }

        if self.sweep.interval_secs == Some(0) {
            return Err(ConfigValidationError::invalid(
                "sweep.interval_secs",
                "must be greater than 0",
            ));
        }

        for (field, value) in [
            ("scoring.question_bonus", self.scoring.question_bonus),
            ("scoring.length_bonus", self.scoring.length_bonus),
            ("scoring.explicit_request_bonus", self.scoring.explicit_request_bonus),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigValidationError::invalid(field, "must be between 0 and 1"));
            }
        }

        if let Some(weights) = &self.scoring.keyword_weights {
            KeywordWeights::from_map(weights.clone())?;
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("invalid keyword {keyword:?}: {message}")]
    InvalidKeyword { keyword: String, message: String },
}

impl ConfigValidationError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}
