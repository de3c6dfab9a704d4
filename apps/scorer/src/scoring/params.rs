use serde::{Deserialize, Serialize};

/// Immutable algorithm parameters threaded through the scorer and classifier.
///
/// Built once at startup from the environment (see `Config::from_env`) and
/// cloned into each run, so tests can vary thresholds freely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Minimum note intercept for CRH.
    pub helpful_threshold: f64,
    /// Note intercepts at or below this are CRNH.
    pub not_helpful_threshold: f64,
    /// Minimum distinct raters before a note may become CRH.
    pub min_ratings_for_helpful: u32,
    /// L2 penalty on note and rater intercepts.
    pub intercept_lambda: f64,
    /// L2 penalty on note and rater factors.
    pub factor_lambda: f64,
    /// L2 penalty on the global bias, per observed rating.
    pub global_bias_lambda: f64,
    pub max_iterations: u32,
    /// Fit stops once the objective improves by less than this between passes.
    pub convergence_tolerance: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            helpful_threshold: 0.40,
            not_helpful_threshold: 0.10,
            min_ratings_for_helpful: 5,
            intercept_lambda: 0.15,
            factor_lambda: 0.15,
            global_bias_lambda: 1.0,
            max_iterations: 500,
            convergence_tolerance: 1e-9,
        }
    }
}

impl ScoringConfig {
    /// Rejects parameter combinations the fit or classifier cannot use.
    pub fn validate(&self) -> Result<(), String> {
        if self.not_helpful_threshold >= self.helpful_threshold {
            return Err(format!(
                "not_helpful_threshold ({}) must be below helpful_threshold ({})",
                self.not_helpful_threshold, self.helpful_threshold
            ));
        }
        if self.intercept_lambda <= 0.0 || self.factor_lambda <= 0.0 {
            return Err("intercept_lambda and factor_lambda must be positive".to_string());
        }
        if self.global_bias_lambda < 0.0 {
            return Err("global_bias_lambda must not be negative".to_string());
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be at least 1".to_string());
        }
        if !(self.convergence_tolerance > 0.0) {
            return Err("convergence_tolerance must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ScoringConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = ScoringConfig {
            helpful_threshold: 0.1,
            not_helpful_threshold: 0.2,
            ..ScoringConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("helpful_threshold"));
    }

    #[test]
    fn test_zero_lambda_rejected() {
        let config = ScoringConfig {
            factor_lambda: 0.0,
            ..ScoringConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = ScoringConfig {
            max_iterations: 0,
            ..ScoringConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
