//! Signal candidates: one categorised reading of one evidence item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// The verdict a matching rule attaches to its signal. Also reused as the
/// final decision of the gate.
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
pub enum DecisionTag {
  /// A hard positive signal.
  Accept,
  /// A soft positive signal; never enough on its own.
  WeakAccept,
  /// Explicit negative or contradictory evidence.
  Reject,
}

/// Category assigned to binary or otherwise undecodable evidence.
pub const UNVERIFIABLE_CATEGORY: &str = "unverifiable";

/// A categorised, weighted reading of a single [`EvidenceItem`].
///
/// Derived deterministically by the pattern matcher; `evidence_id` always
/// names the item it came from.
///
/// [`EvidenceItem`]: crate::evidence::EvidenceItem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCandidate {
  pub entity_id:          String,
  pub evidence_id:        String,
  pub category:           String,
  /// The fragment of evidence the rule matched.
  pub matched_pattern:    String,
  pub decision_tag:       DecisionTag,
  pub raw_delta:          f64,
  /// Extra delta for ACCEPT signals whose evidence is recent.
  pub recency_bonus:      f64,
  pub evidence_timestamp: Option<DateTime<Utc>>,
  /// Set when a URL rule rejected the evidence's source. The delta still
  /// applies, but the signal never counts as a hard positive.
  #[serde(default)]
  pub source_rejected:    bool,
}

impl SignalCandidate {
  pub fn is_accept(&self) -> bool { self.decision_tag == DecisionTag::Accept }

  /// An ACCEPT signal from a source that was not itself rejected.
  pub fn is_hard_positive(&self) -> bool { self.is_accept() && !self.source_rejected }
}
