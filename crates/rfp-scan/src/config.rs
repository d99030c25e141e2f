//! Runtime configuration for `rfp-scan`.
//!
//! Layered from an optional TOML file and `RFP_`-prefixed environment
//! variables (`RFP_PORT=9000`, `RFP_SCORING__BASE_CONFIDENCE=0.65`). Every
//! field has a default, so no file is required.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use rfp_core::{
  alert::TierPolicy,
  config::{PipelineConfig, ScoringConfig},
  fit::FitCriteria,
  reason::ReasonTables,
  rules::{RuleSpec, default_rules},
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub store_path:   PathBuf,
  pub host:         String,
  pub port:         u16,
  /// Entities scored concurrently by `score`.
  pub max_parallel: usize,
  pub scoring:      ScoringConfig,
  pub fit:          FitCriteria,
  pub tiers:        TierPolicy,
  pub reasons:      ReasonTables,
  /// Replaces the built-in rule table when set.
  pub rules:        Option<Vec<RuleSpec>>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      store_path:   PathBuf::from("rfp.sqlite"),
      host:         "127.0.0.1".to_string(),
      port:         8080,
      max_parallel: 4,
      scoring:      ScoringConfig::default(),
      fit:          FitCriteria::default(),
      tiers:        TierPolicy::default(),
      reasons:      ReasonTables::default(),
      rules:        None,
    }
  }
}

impl AppConfig {
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("RFP")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise AppConfig")
  }

  pub fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig {
      scoring: self.scoring.clone(),
      rules:   self.rules.clone().unwrap_or_else(default_rules),
      reasons: self.reasons.clone(),
      fit:     self.fit.clone(),
      tiers:   self.tiers.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use config::{Config, File, FileFormat};

  use super::*;

  fn from_toml(src: &str) -> AppConfig {
    Config::builder()
      .add_source(File::from_str(src, FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_file_is_the_stock_pipeline() {
    let cfg = from_toml("");
    assert_eq!(cfg.port, 8080);
    assert_eq!(cfg.max_parallel, 4);
    assert_eq!(cfg.pipeline_config(), PipelineConfig::default());
  }

  #[test]
  fn sections_override_individual_fields() {
    let cfg = from_toml(
      r#"
        port = 9000
        store_path = "/var/lib/rfp/rfp.sqlite"

        [scoring]
        base_confidence = 0.65

        [fit]
        target_regions = ["uk"]

        [[rules]]
        category = "rfp_issued"
        pattern = "\\brfp\\b"
        decision_tag = "ACCEPT"
        raw_delta = 0.15
      "#,
    );
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.scoring.base_confidence, 0.65);
    assert_eq!(cfg.scoring.accept_threshold, 0.70);
    assert_eq!(cfg.fit.target_regions, vec!["uk".to_string()]);
    assert_eq!(cfg.fit.service_weight, 40);
    assert_eq!(cfg.pipeline_config().rules.len(), 1);
  }
}
