//! Opportunities: the persisted output of an evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  alert::PriorityTier,
  reason::{ReasonCategory, Urgency},
  signal::DecisionTag,
};

/// A scored opportunity. Written once; re-running an evaluation creates a new
/// record rather than updating an old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
  pub opportunity_id:   Uuid,
  pub entity_id:        String,
  pub entity_name:      Option<String>,
  pub category:         String,
  pub final_confidence: f64,
  /// ACCEPT or WEAK_ACCEPT; rejected evaluations are never persisted.
  pub decision:         DecisionTag,
  pub actionable:       bool,
  pub priority_tier:    PriorityTier,
  pub fit_score:        u8,
  pub primary_reason:   ReasonCategory,
  pub urgency:          Urgency,
  pub created_at:       DateTime<Utc>,
}

/// Filters for listing opportunities. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpportunityQuery {
  pub entity_id:  Option<String>,
  pub category:   Option<String>,
  pub actionable: Option<bool>,
  pub tier:       Option<PriorityTier>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}
