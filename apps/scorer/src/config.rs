use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::run::orchestrator::LabelRunConfig;
use crate::scoring::ScoringConfig;

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or a value does not parse.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    /// Enables the cross-process run lease when set.
    pub redis_url: Option<String>,
    pub scoring_secret: String,
    pub labeler_url: String,
    pub labeler_token: String,
    pub port: u16,
    pub rust_log: String,
    pub db_timeout: Duration,
    pub lease_ttl: Duration,
    pub scoring: ScoringConfig,
    pub labels: LabelRunConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(&lookup);
        let defaults = ScoringConfig::default();
        let label_defaults = LabelRunConfig::default();

        let scoring = ScoringConfig {
            helpful_threshold: env.or("HELPFUL_THRESHOLD", defaults.helpful_threshold)?,
            not_helpful_threshold: env.or("NOT_HELPFUL_THRESHOLD", defaults.not_helpful_threshold)?,
            min_ratings_for_helpful: env
                .or("MIN_RATINGS_FOR_HELPFUL", defaults.min_ratings_for_helpful)?,
            intercept_lambda: env.or("INTERCEPT_LAMBDA", defaults.intercept_lambda)?,
            factor_lambda: env.or("FACTOR_LAMBDA", defaults.factor_lambda)?,
            global_bias_lambda: env.or("GLOBAL_BIAS_LAMBDA", defaults.global_bias_lambda)?,
            max_iterations: env.or("MAX_ITERATIONS", defaults.max_iterations)?,
            convergence_tolerance: env
                .or("CONVERGENCE_TOLERANCE", defaults.convergence_tolerance)?,
        };
        if let Err(msg) = scoring.validate() {
            bail!("Invalid scoring parameters: {msg}");
        }

        let labels = LabelRunConfig {
            max_ops_per_run: env.or("MAX_LABEL_OPS_PER_RUN", label_defaults.max_ops_per_run)?,
            delay: env.millis_or("LABEL_DELAY_MS", label_defaults.delay)?,
            call_timeout: env.millis_or("LABEL_TIMEOUT_MS", label_defaults.call_timeout)?,
        };
        if labels.call_timeout.is_zero() {
            bail!("LABEL_TIMEOUT_MS must be positive");
        }

        let scoring_secret = env.require("SCORING_SECRET")?;
        if scoring_secret.trim().is_empty() {
            bail!("SCORING_SECRET must not be empty");
        }

        Ok(Config {
            database_url: env.require("DATABASE_URL")?,
            redis_url: lookup("REDIS_URL").filter(|url| !url.trim().is_empty()),
            scoring_secret,
            labeler_url: env.require("LABELER_URL")?,
            labeler_token: env.require("LABELER_TOKEN")?,
            port: env.or("PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            db_timeout: env.millis_or("DB_TIMEOUT_MS", Duration::from_secs(10))?,
            lease_ttl: env.millis_or("RUN_LEASE_TTL_MS", Duration::from_secs(300))?,
            scoring,
            labels,
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn require(&self, key: &str) -> Result<String> {
        (self.0)(key).with_context(|| format!("Required environment variable '{key}' is not set"))
    }

    fn or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match (self.0)(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("{key} has an invalid value '{raw}'")),
            None => Ok(default),
        }
    }

    fn millis_or(&self, key: &str, default: Duration) -> Result<Duration> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.or(key, default_ms).map(Duration::from_millis)
    }
}
