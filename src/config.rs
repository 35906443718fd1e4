use crate::domain::features::validate_decay_weights;
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::str::FromStr;

/// Runtime configuration, sourced from environment variables with defaults
/// for every knob. Validated once at startup; an invalid value aborts boot
/// instead of surfacing mid-cycle.
#[derive(Debug, Clone)]
pub struct Config {
    /// Seconds a cached prediction stays valid.
    pub cache_ttl_secs: u64,
    /// Maximum cached predictions before LRU eviction.
    pub cache_capacity: usize,
    /// Outcome reports accumulated before retraining triggers.
    pub buffer_capacity: usize,
    /// Validation-accuracy margin a candidate must clear over the active
    /// model to be promoted.
    pub promotion_margin: f64,
    /// Monitored accuracy below this triggers rollback.
    pub rollback_floor: f64,
    /// Outcome reports observed against a freshly promoted model before its
    /// monitoring window closes.
    pub monitoring_window: usize,
    /// How far back historical matches are pulled for training.
    pub training_window_days: i64,
    /// Fraction of the dataset held out, always the most recent slice.
    pub holdout_fraction: f64,
    pub min_training_samples: usize,
    pub fit_epochs: usize,
    pub fit_learning_rate: f64,
    /// Recent-form decay weights, earliest to most recent, non-decreasing.
    pub form_decay_weights: Vec<f64>,
    pub manual_trigger_limit: usize,
    pub manual_trigger_window_secs: u64,
    pub advisory_enabled: bool,
    pub advisory_url: String,
    pub advisory_timeout_ms: u64,
    pub advisory_max_suggestions: usize,
    /// Directory model versions are persisted into.
    pub model_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 3600,
            cache_capacity: 1024,
            buffer_capacity: 100,
            promotion_margin: 0.01,
            rollback_floor: 0.68,
            monitoring_window: 50,
            training_window_days: 60,
            holdout_fraction: 0.2,
            min_training_samples: 30,
            fit_epochs: 300,
            fit_learning_rate: 0.1,
            form_decay_weights: vec![1.0, 1.0, 1.0, 1.5, 2.0],
            manual_trigger_limit: 3,
            manual_trigger_window_secs: 3600,
            advisory_enabled: false,
            advisory_url: "http://127.0.0.1:8099/suggest".to_string(),
            advisory_timeout_ms: 2000,
            advisory_max_suggestions: 3,
            model_dir: PathBuf::from("./models"),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();
        let config = Self {
            cache_ttl_secs: env_parse("CACHE_TTL_SECS", defaults.cache_ttl_secs)?,
            cache_capacity: env_parse("CACHE_CAPACITY", defaults.cache_capacity)?,
            buffer_capacity: env_parse("OUTCOME_BUFFER_CAPACITY", defaults.buffer_capacity)?,
            promotion_margin: env_parse("PROMOTION_MARGIN", defaults.promotion_margin)?,
            rollback_floor: env_parse("ROLLBACK_FLOOR", defaults.rollback_floor)?,
            monitoring_window: env_parse("MONITORING_WINDOW", defaults.monitoring_window)?,
            training_window_days: env_parse("TRAINING_WINDOW_DAYS", defaults.training_window_days)?,
            holdout_fraction: env_parse("HOLDOUT_FRACTION", defaults.holdout_fraction)?,
            min_training_samples: env_parse("MIN_TRAINING_SAMPLES", defaults.min_training_samples)?,
            fit_epochs: env_parse("FIT_EPOCHS", defaults.fit_epochs)?,
            fit_learning_rate: env_parse("FIT_LEARNING_RATE", defaults.fit_learning_rate)?,
            form_decay_weights: match std::env::var("FORM_DECAY_WEIGHTS") {
                Ok(raw) => parse_decay_weights(&raw)
                    .with_context(|| format!("invalid FORM_DECAY_WEIGHTS '{raw}'"))?,
                Err(_) => defaults.form_decay_weights,
            },
            manual_trigger_limit: env_parse("MANUAL_TRIGGER_LIMIT", defaults.manual_trigger_limit)?,
            manual_trigger_window_secs: env_parse(
                "MANUAL_TRIGGER_WINDOW_SECS",
                defaults.manual_trigger_window_secs,
            )?,
            advisory_enabled: env_parse("ADVISORY_ENABLED", defaults.advisory_enabled)?,
            advisory_url: std::env::var("ADVISORY_URL").unwrap_or(defaults.advisory_url),
            advisory_timeout_ms: env_parse("ADVISORY_TIMEOUT_MS", defaults.advisory_timeout_ms)?,
            advisory_max_suggestions: env_parse(
                "ADVISORY_MAX_SUGGESTIONS",
                defaults.advisory_max_suggestions,
            )?,
            model_dir: std::env::var("MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            bail!(
                "HOLDOUT_FRACTION must be in (0, 1), got {}",
                self.holdout_fraction
            );
        }
        if !(0.0..=1.0).contains(&self.rollback_floor) {
            bail!("ROLLBACK_FLOOR must be in [0, 1], got {}", self.rollback_floor);
        }
        if self.promotion_margin < 0.0 {
            bail!(
                "PROMOTION_MARGIN must be non-negative, got {}",
                self.promotion_margin
            );
        }
        if self.buffer_capacity == 0 || self.monitoring_window == 0 || self.cache_capacity == 0 {
            bail!("capacities and windows must be positive");
        }
        if self.min_training_samples < 3 {
            bail!(
                "MIN_TRAINING_SAMPLES must be at least 3, got {}",
                self.min_training_samples
            );
        }
        validate_decay_weights(&self.form_decay_weights)?;
        Ok(())
    }
}

/// Comma-separated decay weight list, e.g. "1.0,1.0,1.0,1.5,2.0".
pub(crate) fn parse_decay_weights(raw: &str) -> Result<Vec<f64>> {
    let weights = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .with_context(|| format!("bad weight '{part}'"))
        })
        .collect::<Result<Vec<f64>>>()?;
    validate_decay_weights(&weights)?;
    Ok(weights)
}

fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("invalid {name}='{raw}': {err}")),
        Err(_) => Ok(default),
    }
}
