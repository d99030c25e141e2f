//! Pipeline configuration.
//!
//! Every section has serde defaults equal to the built-in tables, so an empty
//! configuration file describes the stock pipeline.

use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  alert::TierPolicy,
  decision::Thresholds,
  fit::FitCriteria,
  reason::ReasonTables,
  rules::{RuleSpec, default_rules},
};

/// Numeric constants of the scorer and gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
  pub base_confidence:       f64,
  pub accept_threshold:      f64,
  pub weak_accept_threshold: f64,
  /// Evidence younger than this earns an ACCEPT rule's recency bonus.
  pub recency_window_days:   i64,
  /// Delta of the WEAK_ACCEPT signal emitted for unreadable evidence.
  pub unverifiable_delta:    f64,
  /// Episodes a backoff level needs before its prior is trusted.
  pub min_prior_samples:     usize,
  /// Evidence items beyond this count are dropped from a request.
  pub max_evidence_items:    usize,
}

impl Default for ScoringConfig {
  fn default() -> Self {
    Self {
      base_confidence:       0.70,
      accept_threshold:      0.70,
      weak_accept_threshold: 0.50,
      recency_window_days:   180,
      unverifiable_delta:    0.01,
      min_prior_samples:     3,
      max_evidence_items:    200,
    }
  }
}

impl ScoringConfig {
  pub fn thresholds(&self) -> Thresholds {
    Thresholds {
      accept:      self.accept_threshold,
      weak_accept: self.weak_accept_threshold,
    }
  }

  pub fn validate(&self) -> Result<()> {
    let unit = |name: &str, v: f64| {
      if (0.0..=1.0).contains(&v) {
        Ok(())
      } else {
        Err(Error::InvalidConfig(format!("{name} must be within [0, 1], got {v}")))
      }
    };
    unit("base_confidence", self.base_confidence)?;
    unit("accept_threshold", self.accept_threshold)?;
    unit("weak_accept_threshold", self.weak_accept_threshold)?;
    unit("unverifiable_delta", self.unverifiable_delta)?;

    if self.weak_accept_threshold > self.accept_threshold {
      return Err(Error::InvalidConfig(
        "weak_accept_threshold must not exceed accept_threshold".into(),
      ));
    }
    if self.recency_window_days < 0 {
      return Err(Error::InvalidConfig("recency_window_days must be non-negative".into()));
    }
    if self.min_prior_samples == 0 || self.max_evidence_items == 0 {
      return Err(Error::InvalidConfig(
        "min_prior_samples and max_evidence_items must be positive".into(),
      ));
    }
    Ok(())
  }
}

/// Everything a [`Pipeline`](crate::pipeline::Pipeline) is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub scoring: ScoringConfig,
  pub rules:   Vec<RuleSpec>,
  pub reasons: ReasonTables,
  pub fit:     FitCriteria,
  pub tiers:   TierPolicy,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      scoring: ScoringConfig::default(),
      rules:   default_rules(),
      reasons: ReasonTables::default(),
      fit:     FitCriteria::default(),
      tiers:   TierPolicy::default(),
    }
  }
}
