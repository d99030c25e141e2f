//! Pattern rule tables.
//!
//! A [`RuleSpec`] is the serialisable description of one category rule; a
//! [`RuleSet`] is the compiled, immutable form used by the matcher. The
//! built-in table lives in [`default_rules`] so every weight in the system can
//! be audited in one place.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, signal::DecisionTag};

// ─── Descriptions ────────────────────────────────────────────────────────────

/// Which part of an evidence item a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
  #[default]
  Text,
  Url,
}

/// Serialisable rule description, as found in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
  pub category:      String,
  /// Case-insensitive regular expression.
  pub pattern:       String,
  #[serde(default)]
  pub target:        RuleTarget,
  pub decision_tag:  DecisionTag,
  pub raw_delta:     f64,
  #[serde(default)]
  pub recency_bonus: f64,
}

impl RuleSpec {
  fn new(
    category: &str,
    pattern: &str,
    decision_tag: DecisionTag,
    raw_delta: f64,
    recency_bonus: f64,
  ) -> Self {
    Self {
      category: category.to_owned(),
      pattern: pattern.to_owned(),
      target: RuleTarget::Text,
      decision_tag,
      raw_delta,
      recency_bonus,
    }
  }

  fn on_url(mut self) -> Self {
    self.target = RuleTarget::Url;
    self
  }

  fn validate(&self) -> Result<()> {
    let invalid = |reason: &str| {
      Err(Error::InvalidRule {
        category: self.category.clone(),
        reason:   reason.to_owned(),
      })
    };

    if self.category.trim().is_empty() {
      return invalid("category must not be empty");
    }
    if !self.raw_delta.is_finite() || self.raw_delta.abs() > 1.0 {
      return invalid("raw_delta must be within [-1, 1]");
    }
    if !(0.0..=1.0).contains(&self.recency_bonus) {
      return invalid("recency_bonus must be within [0, 1]");
    }
    match self.decision_tag {
      DecisionTag::Reject if self.raw_delta > 0.0 => {
        invalid("REJECT rules must carry a non-positive delta")
      }
      DecisionTag::Accept | DecisionTag::WeakAccept if self.raw_delta < 0.0 => {
        invalid("positive rules must carry a non-negative delta")
      }
      _ => Ok(()),
    }
  }
}

// ─── Compiled ────────────────────────────────────────────────────────────────

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct PatternRule {
  spec:  RuleSpec,
  regex: Regex,
}

impl PatternRule {
  pub fn spec(&self) -> &RuleSpec { &self.spec }

  /// Return the first matching fragment of `haystack`, if any.
  pub fn find<'h>(&self, haystack: &'h str) -> Option<&'h str> {
    self.regex.find(haystack).map(|m| m.as_str())
  }
}

/// An ordered, immutable set of compiled rules.
#[derive(Debug, Clone)]
pub struct RuleSet {
  rules: Vec<PatternRule>,
}

impl RuleSet {
  /// Validate and compile `specs`, preserving their order.
  pub fn compile(specs: &[RuleSpec]) -> Result<Self> {
    let rules = specs
      .iter()
      .map(|spec| {
        spec.validate()?;
        let regex = RegexBuilder::new(&spec.pattern)
          .case_insensitive(true)
          .build()
          .map_err(|source| Error::InvalidPattern {
            category: spec.category.clone(),
            source,
          })?;
        Ok(PatternRule { spec: spec.clone(), regex })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self { rules })
  }

  /// Compile the built-in table.
  pub fn builtin() -> Result<Self> { Self::compile(&default_rules()) }

  pub fn rules(&self) -> &[PatternRule] { &self.rules }

  pub fn len(&self) -> usize { self.rules.len() }

  pub fn is_empty(&self) -> bool { self.rules.is_empty() }
}

// ─── Built-in table ──────────────────────────────────────────────────────────

/// The built-in rule table.
///
/// Only the last two rules fire REJECT, and only on explicitly negative
/// evidence.
pub fn default_rules() -> Vec<RuleSpec> {
  use DecisionTag::{Accept, Reject, WeakAccept};

  vec![
    // ── Hard positives ──────────────────────────────────────────────────
    RuleSpec::new(
      "multi_year_partnership",
      r"\bmulti[- ]?year\s+(?:strategic\s+)?(?:partnership|agreement|contract|deal)\b|\bstrategic\s+partnership\b",
      Accept,
      0.10,
      0.05,
    ),
    RuleSpec::new(
      "recent_deployment",
      r"\b(?:deploys|deployed|deploying|launches|launched|rolls\s+out|rolled\s+out|goes\s+live|went\s+live)\b",
      Accept,
      0.05,
      0.0,
    ),
    RuleSpec::new(
      "rfp_issued",
      r"\b(?:requests?\s+for\s+proposals?|rfp|rfq|invitation\s+to\s+tender|tender\s+(?:notice|opportunity|process)|procurement\s+(?:notice|process))\b",
      Accept,
      0.15,
      0.05,
    ),
    RuleSpec::new(
      "digital_transformation",
      r"\bdigital\s+transformation\s+(?:programme|program|initiative|strategy|project|roadmap)\b",
      Accept,
      0.05,
      0.0,
    ),
    // ── Soft positives ──────────────────────────────────────────────────
    RuleSpec::new(
      "technology_leadership",
      r"\b(?:head|director|chief|vp|vice\s+president)\b[^.\n]{0,40}?\b(?:technology|digital|information|data|innovation)\b|\b(?:cto|cio|cdo)\b",
      WeakAccept,
      0.03,
      0.0,
    ),
    RuleSpec::new(
      "legacy_system",
      r"\b(?:legacy|bespoke|outdated|ageing|aging|end[- ]of[- ]life|home[- ]?grown)\b|\binstalled\s+in\s+(?:19|20)\d{2}\b",
      WeakAccept,
      0.01,
      0.0,
    ),
    RuleSpec::new(
      "confirmed_platform",
      r"\b(?:uses|using|runs\s+on|running|powered\s+by|built\s+on)\s+(?:sap|salesforce|microsoft\s+dynamics|oracle|adobe|shopify|ticketmaster|ibm|hubspot|zendesk)\b",
      WeakAccept,
      0.01,
      0.0,
    ),
    RuleSpec::new(
      "hiring_signal",
      r"\b(?:hiring|recruiting|job\s+opening|vacancy|vacancies)\b",
      WeakAccept,
      0.02,
      0.0,
    ),
    RuleSpec::new(
      "fan_experience",
      r"\b(?:fan\s+(?:experience|engagement|app|platform)|supporter\s+experience|matchday\s+experience|season\s+ticket\s+holders?)\b",
      WeakAccept,
      0.02,
      0.0,
    ),
    // ── Negatives ───────────────────────────────────────────────────────
    RuleSpec::new(
      "placeholder_url",
      r"^(?:https?://)?(?:www\.)?(?:example\.(?:com|org|net)|localhost|127\.0\.0\.1|placeholder\.[a-z]+)(?:[:/?#]|$)|^(?:#|about:blank)$",
      Reject,
      -0.25,
      0.0,
    )
    .on_url(),
    RuleSpec::new(
      "expired_listing",
      r"\b(?:deadline\s+(?:has\s+)?passed|tender\s+(?:has\s+)?closed|no\s+longer\s+accepting|submissions?\s+(?:are\s+)?closed|listing\s+(?:has\s+)?expired|contract\s+(?:was\s+)?awarded\s+to)\b",
      Reject,
      -0.20,
      0.0,
    ),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_table_compiles() {
    let set = RuleSet::builtin().unwrap();
    assert_eq!(set.len(), default_rules().len());
  }

  #[test]
  fn only_negative_rules_reject() {
    for spec in default_rules() {
      if spec.decision_tag == DecisionTag::Reject {
        assert!(spec.raw_delta < 0.0, "{}", spec.category);
      } else {
        assert!(spec.raw_delta >= 0.0, "{}", spec.category);
      }
    }
  }

  #[test]
  fn invalid_regex_is_a_config_error() {
    let mut spec = default_rules().remove(0);
    spec.pattern = "(unclosed".into();
    let err = RuleSet::compile(&[spec]).unwrap_err();
    assert!(matches!(err, Error::InvalidPattern { .. }));
  }

  #[test]
  fn positive_reject_rule_is_refused() {
    let spec = RuleSpec::new("bogus", "x", DecisionTag::Reject, 0.1, 0.0);
    let err = RuleSet::compile(&[spec]).unwrap_err();
    assert!(matches!(err, Error::InvalidRule { .. }));
  }

  #[test]
  fn negative_accept_rule_is_refused() {
    let spec = RuleSpec::new("bogus", "x", DecisionTag::Accept, -0.1, 0.0);
    assert!(RuleSet::compile(&[spec]).is_err());
  }

  #[test]
  fn matching_is_case_insensitive() {
    let set = RuleSet::builtin().unwrap();
    let rule = set
      .rules()
      .iter()
      .find(|r| r.spec().category == "rfp_issued")
      .unwrap();
    assert_eq!(
      rule.find("The club has issued an RFP for ticketing"),
      Some("RFP")
    );
  }

  #[test]
  fn rule_specs_deserialize_with_defaults() {
    let spec: RuleSpec = serde_json::from_str(
      r#"{"category":"c","pattern":"p","decision_tag":"WEAK_ACCEPT","raw_delta":0.02}"#,
    )
    .unwrap();
    assert_eq!(spec.target, RuleTarget::Text);
    assert_eq!(spec.recency_bonus, 0.0);
    assert_eq!(spec.decision_tag, DecisionTag::WeakAccept);
  }
}
