//! Evidence pattern matcher.
//!
//! Tests every rule of a [`RuleSet`] against an [`EvidenceItem`] and emits one
//! [`SignalCandidate`] per matching rule. Overlapping categories are kept.
//! When a URL rule rejects an item's source, every candidate from that item
//! is marked `source_rejected`.

use crate::{
  evidence::EvidenceItem,
  rules::{RuleSet, RuleTarget},
  signal::{DecisionTag, SignalCandidate, UNVERIFIABLE_CATEGORY},
};

#[derive(Debug, Clone)]
pub struct PatternMatcher {
  rules:              RuleSet,
  unverifiable_delta: f64,
}

impl PatternMatcher {
  pub fn new(rules: RuleSet, unverifiable_delta: f64) -> Self {
    Self { rules, unverifiable_delta }
  }

  pub fn rules(&self) -> &RuleSet { &self.rules }

  /// Match one evidence item. Blank text yields nothing; unreadable text
  /// yields a single `unverifiable` WEAK_ACCEPT candidate.
  pub fn match_evidence(
    &self,
    entity_id: &str,
    item: &EvidenceItem,
  ) -> Vec<SignalCandidate> {
    if item.is_blank() {
      return Vec::new();
    }

    if item.is_unreadable() {
      return vec![SignalCandidate {
        entity_id:          entity_id.to_owned(),
        evidence_id:        item.evidence_id.clone(),
        category:           UNVERIFIABLE_CATEGORY.to_owned(),
        matched_pattern:    String::new(),
        decision_tag:       DecisionTag::WeakAccept,
        raw_delta:          self.unverifiable_delta,
        recency_bonus:      0.0,
        evidence_timestamp: item.timestamp,
        source_rejected:    false,
      }];
    }

    let mut source_rejected = false;
    let mut candidates: Vec<SignalCandidate> = self
      .rules
      .rules()
      .iter()
      .filter_map(|rule| {
        let haystack = match rule.spec().target {
          RuleTarget::Text => item.text.as_str(),
          RuleTarget::Url => item.url.as_deref()?,
        };
        let fragment = rule.find(haystack)?;
        let spec = rule.spec();
        if spec.target == RuleTarget::Url && spec.decision_tag == DecisionTag::Reject {
          source_rejected = true;
        }
        Some(SignalCandidate {
          entity_id:          entity_id.to_owned(),
          evidence_id:        item.evidence_id.clone(),
          category:           spec.category.clone(),
          matched_pattern:    fragment.to_owned(),
          decision_tag:       spec.decision_tag,
          raw_delta:          spec.raw_delta,
          recency_bonus:      spec.recency_bonus,
          evidence_timestamp: item.timestamp,
          source_rejected:    false,
        })
      })
      .collect();

    if source_rejected {
      for candidate in &mut candidates {
        candidate.source_rejected = true;
      }
    }
    candidates
  }

  /// Match every item in order, concatenating the candidates.
  pub fn match_all(
    &self,
    entity_id: &str,
    items: &[EvidenceItem],
  ) -> Vec<SignalCandidate> {
    items
      .iter()
      .flat_map(|item| self.match_evidence(entity_id, item))
      .collect()
  }
}
