//! Business fit score.
//!
//! A 0–100 score over five weighted criteria: service, budget, timeline,
//! organisation size and geography. Each criterion scores in `[0, 1]`; the
//! weights sum to 100.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  Error, Result,
  reason::{ReasonProfile, Urgency},
};

/// Size tier of the organisation behind an entity.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OrgSize {
  Elite,
  Professional,
  SemiProfessional,
  Amateur,
}

impl OrgSize {
  pub fn score(&self) -> f64 {
    match self {
      Self::Elite => 1.0,
      Self::Professional => 0.8,
      Self::SemiProfessional => 0.5,
      Self::Amateur => 0.2,
    }
  }
}

/// What is known about the entity being scored. Every field is optional;
/// unknown criteria score at the midpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityProfile {
  pub sport:            Option<String>,
  pub country:          Option<String>,
  pub region:           Option<String>,
  pub org_size:         Option<OrgSize>,
  pub estimated_budget: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitCriteria {
  pub service_weight:   u32,
  pub budget_weight:    u32,
  pub timeline_weight:  u32,
  pub size_weight:      u32,
  pub geography_weight: u32,
  pub budget_min:       f64,
  pub budget_max:       f64,
  /// Regions or countries considered in-territory, matched
  /// case-insensitively.
  pub target_regions:   Vec<String>,
}

impl Default for FitCriteria {
  fn default() -> Self {
    Self {
      service_weight:   40,
      budget_weight:    25,
      timeline_weight:  15,
      size_weight:      10,
      geography_weight: 10,
      budget_min:       100_000.0,
      budget_max:       2_000_000.0,
      target_regions:   vec![
        "uk".into(),
        "united kingdom".into(),
        "europe".into(),
        "north america".into(),
      ],
    }
  }
}

impl FitCriteria {
  pub fn validate(&self) -> Result<()> {
    // Widened so user-supplied weights cannot overflow the sum.
    let total: u64 = [
      self.service_weight,
      self.budget_weight,
      self.timeline_weight,
      self.size_weight,
      self.geography_weight,
    ]
    .into_iter()
    .map(u64::from)
    .sum();
    if total != 100 {
      return Err(Error::InvalidConfig(format!(
        "fit weights must sum to 100, got {total}"
      )));
    }
    if !(self.budget_min >= 0.0 && self.budget_min <= self.budget_max) {
      return Err(Error::InvalidConfig(
        "fit budget range must satisfy 0 <= budget_min <= budget_max".into(),
      ));
    }
    Ok(())
  }

  pub fn score(&self, profile: &EntityProfile, reasons: &ReasonProfile) -> FitBreakdown {
    let service = service_score(reasons);
    let budget = self.budget_score(profile.estimated_budget);
    let timeline = timeline_score(reasons.urgency_level);
    let size = profile.org_size.map_or(0.5, |s| s.score());
    let geography = self.geography_score(profile);

    let weighted = self.service_weight as f64 * service
      + self.budget_weight as f64 * budget
      + self.timeline_weight as f64 * timeline
      + self.size_weight as f64 * size
      + self.geography_weight as f64 * geography;

    FitBreakdown {
      service,
      budget,
      timeline,
      size,
      geography,
      fit_score: weighted.round().clamp(0.0, 100.0) as u8,
    }
  }

  fn budget_score(&self, budget: Option<f64>) -> f64 {
    match budget {
      None => 0.5,
      Some(b) if !b.is_finite() || b <= 0.0 => 0.0,
      Some(b) if b < self.budget_min => b / self.budget_min,
      Some(b) if b > self.budget_max => 0.8,
      Some(_) => 1.0,
    }
  }

  fn geography_score(&self, profile: &EntityProfile) -> f64 {
    let places: Vec<&str> = [profile.region.as_deref(), profile.country.as_deref()]
      .into_iter()
      .flatten()
      .collect();
    if places.is_empty() {
      return 0.5;
    }
    let in_territory = places.iter().any(|place| {
      self
        .target_regions
        .iter()
        .any(|target| target.eq_ignore_ascii_case(place.trim()))
    });
    if in_territory { 1.0 } else { 0.3 }
  }
}

fn service_score(reasons: &ReasonProfile) -> f64 {
  let primary = reasons.primary().solution_fit;
  if reasons.secondary_reasons.is_empty() {
    return primary;
  }
  let secondary = reasons
    .secondary_reasons
    .iter()
    .map(|r| r.solution_fit)
    .sum::<f64>()
    / reasons.secondary_reasons.len() as f64;
  0.7 * primary + 0.3 * secondary
}

fn timeline_score(urgency: Urgency) -> f64 {
  match urgency {
    Urgency::Critical => 1.0,
    Urgency::High => 0.75,
    Urgency::Medium => 0.5,
    Urgency::Low => 0.25,
  }
}

/// Per-criterion scores and the combined integer fit score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitBreakdown {
  pub service:   f64,
  pub budget:    f64,
  pub timeline:  f64,
  pub size:      f64,
  pub geography: f64,
  pub fit_score: u8,
}
