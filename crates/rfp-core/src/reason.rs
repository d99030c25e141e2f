//! Reason likelihood analyzer.
//!
//! Maps the full candidate set of an entity onto a fixed taxonomy of reasons
//! an organisation might go to tender. Each reason's confidence is a noisy-OR
//! over the association weights its candidates contribute. Category weights
//! count once per candidate; keyword weights count once per evidence item,
//! scaled by the strongest tag that item produced.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::{
  Error, Result,
  evidence::EvidenceItem,
  signal::{DecisionTag, SignalCandidate},
};

// ─── Taxonomy ────────────────────────────────────────────────────────────────

/// Why an entity would issue an RFP.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCategory {
  TechnologyObsolescence,
  FanDemand,
  CompetitivePressure,
  DigitalTransformation,
  RevenueGrowth,
  OperationalEfficiency,
  RegulatoryCompliance,
  PartnershipRenewal,
}

/// Urgency derived from the primary reason's confidence.
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
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
  Critical,
  High,
  Medium,
  Low,
}

impl Urgency {
  pub fn from_confidence(confidence: f64) -> Self {
    if confidence >= 0.85 {
      Self::Critical
    } else if confidence >= 0.70 {
      Self::High
    } else if confidence >= 0.50 {
      Self::Medium
    } else {
      Self::Low
    }
  }
}

// ─── Tables ──────────────────────────────────────────────────────────────────

/// How well a reason aligns with the services on offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionFit {
  pub reason: ReasonCategory,
  pub weight: f64,
}

/// Signal category → reason association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAssociation {
  pub category: String,
  pub reason:   ReasonCategory,
  pub weight:   f64,
}

/// Keyword (matched against the lower-cased evidence text) → reason
/// association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordAssociation {
  pub keyword: String,
  pub reason:  ReasonCategory,
  pub weight:  f64,
}

/// Static association and fit tables. Loaded once; never learned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasonTables {
  pub solution_fit: Vec<SolutionFit>,
  pub categories:   Vec<CategoryAssociation>,
  pub keywords:     Vec<KeywordAssociation>,
}

impl Default for ReasonTables {
  fn default() -> Self {
    use ReasonCategory::*;

    let fit = |reason, weight| SolutionFit { reason, weight };
    let cat = |category: &str, reason, weight| CategoryAssociation {
      category: category.to_owned(),
      reason,
      weight,
    };
    let kw = |keyword: &str, reason, weight| KeywordAssociation {
      keyword: keyword.to_owned(),
      reason,
      weight,
    };

    Self {
      solution_fit: vec![
        fit(TechnologyObsolescence, 0.95),
        fit(FanDemand, 0.90),
        fit(CompetitivePressure, 0.75),
        fit(DigitalTransformation, 0.95),
        fit(RevenueGrowth, 0.80),
        fit(OperationalEfficiency, 0.70),
        fit(RegulatoryCompliance, 0.50),
        fit(PartnershipRenewal, 0.65),
      ],
      categories:   vec![
        cat("multi_year_partnership", PartnershipRenewal, 0.6),
        cat("multi_year_partnership", DigitalTransformation, 0.4),
        cat("recent_deployment", DigitalTransformation, 0.5),
        cat("recent_deployment", FanDemand, 0.2),
        cat("rfp_issued", DigitalTransformation, 0.5),
        cat("rfp_issued", OperationalEfficiency, 0.3),
        cat("rfp_issued", CompetitivePressure, 0.3),
        cat("digital_transformation", DigitalTransformation, 0.8),
        cat("technology_leadership", DigitalTransformation, 0.3),
        cat("technology_leadership", TechnologyObsolescence, 0.2),
        cat("legacy_system", TechnologyObsolescence, 0.8),
        cat("confirmed_platform", TechnologyObsolescence, 0.3),
        cat("confirmed_platform", RevenueGrowth, 0.2),
        cat("hiring_signal", OperationalEfficiency, 0.4),
        cat("hiring_signal", DigitalTransformation, 0.2),
        cat("fan_experience", FanDemand, 0.8),
      ],
      keywords:     vec![
        kw("e-commerce", RevenueGrowth, 0.4),
        kw("ecommerce", RevenueGrowth, 0.4),
        kw("merchandise", RevenueGrowth, 0.3),
        kw("sponsorship", RevenueGrowth, 0.3),
        kw("ticketing", FanDemand, 0.4),
        kw("mobile app", FanDemand, 0.4),
        kw("supporters", FanDemand, 0.3),
        kw("rival", CompetitivePressure, 0.5),
        kw("competitor", CompetitivePressure, 0.5),
        kw("gdpr", RegulatoryCompliance, 0.6),
        kw("compliance", RegulatoryCompliance, 0.5),
        kw("accessibility", RegulatoryCompliance, 0.4),
        kw("automation", OperationalEfficiency, 0.3),
        kw("efficiency", OperationalEfficiency, 0.3),
        kw("renewal", PartnershipRenewal, 0.5),
        kw("expiring", PartnershipRenewal, 0.5),
        kw("crm", TechnologyObsolescence, 0.2),
        kw("erp", TechnologyObsolescence, 0.2),
      ],
    }
  }
}

impl ReasonTables {
  /// Check that every weight is within `[0, 1]`, keywords are non-empty and
  /// every reason has a solution-fit entry.
  pub fn validate(&self) -> Result<()> {
    let in_range = |w: f64| (0.0..=1.0).contains(&w);

    for reason in ReasonCategory::iter() {
      if !self.solution_fit.iter().any(|f| f.reason == reason) {
        return Err(Error::InvalidConfig(format!(
          "missing solution_fit weight for {reason}"
        )));
      }
    }
    if let Some(f) = self.solution_fit.iter().find(|f| !in_range(f.weight)) {
      return Err(Error::InvalidConfig(format!(
        "solution_fit weight for {} out of range",
        f.reason
      )));
    }
    if let Some(a) = self.categories.iter().find(|a| !in_range(a.weight)) {
      return Err(Error::InvalidConfig(format!(
        "association weight for {:?} out of range",
        a.category
      )));
    }
    if let Some(k) = self
      .keywords
      .iter()
      .find(|k| !in_range(k.weight) || k.keyword.trim().is_empty())
    {
      return Err(Error::InvalidConfig(format!(
        "invalid keyword association {:?}",
        k.keyword
      )));
    }
    Ok(())
  }

  /// Solution-fit weight for `reason`; `0.0` if absent.
  pub fn solution_fit(&self, reason: ReasonCategory) -> f64 {
    self
      .solution_fit
      .iter()
      .find(|f| f.reason == reason)
      .map_or(0.0, |f| f.weight)
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonScore {
  pub reason:       ReasonCategory,
  pub confidence:   f64,
  pub solution_fit: f64,
}

/// Reason analysis for one evaluation pass. Recomputed, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasonProfile {
  pub entity_id:          String,
  pub primary_reason:     ReasonCategory,
  pub primary_confidence: f64,
  /// Up to two runner-up reasons with non-zero confidence.
  pub secondary_reasons:  Vec<ReasonScore>,
  pub urgency_level:      Urgency,
  /// All reasons, highest confidence first.
  pub scores:             Vec<ReasonScore>,
}

impl ReasonProfile {
  pub fn primary(&self) -> &ReasonScore {
    // `scores` always holds the full taxonomy.
    &self.scores[0]
  }
}

// ─── Analyzer ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReasonAnalyzer {
  tables: ReasonTables,
}

impl ReasonAnalyzer {
  pub fn new(tables: ReasonTables) -> Result<Self> {
    tables.validate()?;
    Ok(Self { tables })
  }

  pub fn tables(&self) -> &ReasonTables { &self.tables }

  fn tag_scale(tag: DecisionTag) -> f64 {
    match tag {
      DecisionTag::Accept => 1.0,
      DecisionTag::WeakAccept => 0.5,
      DecisionTag::Reject => 0.0,
    }
  }

  /// Score the taxonomy for one entity. `items` are the normalized evidence
  /// the `candidates` were matched from.
  pub fn analyze(
    &self,
    entity_id: &str,
    items: &[EvidenceItem],
    candidates: &[SignalCandidate],
  ) -> ReasonProfile {
    // Product of (1 - w) per reason; confidence is its complement.
    let mut miss: BTreeMap<ReasonCategory, f64> =
      ReasonCategory::iter().map(|r| (r, 1.0)).collect();
    let mut apply = |reason: ReasonCategory, weight: f64, scale: f64| {
      if let Some(m) = miss.get_mut(&reason) {
        *m *= 1.0 - (weight * scale).clamp(0.0, 1.0);
      }
    };

    let mut evidence_scale: BTreeMap<&str, f64> = BTreeMap::new();
    for candidate in candidates {
      let scale = Self::tag_scale(candidate.decision_tag);
      let strongest = evidence_scale
        .entry(candidate.evidence_id.as_str())
        .or_insert(0.0);
      *strongest = strongest.max(scale);
      if scale == 0.0 {
        continue;
      }
      for a in self
        .tables
        .categories
        .iter()
        .filter(|a| a.category == candidate.category)
      {
        apply(a.reason, a.weight, scale);
      }
    }

    let mut seen = BTreeSet::new();
    for item in items {
      if item.is_unreadable() || !seen.insert(item.evidence_id.as_str()) {
        continue;
      }
      let scale = evidence_scale
        .get(item.evidence_id.as_str())
        .copied()
        .unwrap_or(0.0);
      if scale == 0.0 {
        continue;
      }
      let text = item.text.to_lowercase();
      for k in self.tables.keywords.iter().filter(|k| text.contains(&k.keyword)) {
        apply(k.reason, k.weight, scale);
      }
    }

    let mut scores: Vec<ReasonScore> = ReasonCategory::iter()
      .map(|reason| ReasonScore {
        reason,
        confidence: 1.0 - miss.get(&reason).copied().unwrap_or(1.0),
        solution_fit: self.tables.solution_fit(reason),
      })
      .collect();
    // Stable sort keeps taxonomy order on ties.
    scores.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let primary = scores[0].clone();
    let secondary_reasons = scores[1..]
      .iter()
      .filter(|s| s.confidence > 0.0)
      .take(2)
      .cloned()
      .collect();

    ReasonProfile {
      entity_id: entity_id.to_owned(),
      primary_reason: primary.reason,
      primary_confidence: primary.confidence,
      secondary_reasons,
      urgency_level: Urgency::from_confidence(primary.confidence),
      scores,
    }
  }
}
