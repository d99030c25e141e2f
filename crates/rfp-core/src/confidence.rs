//! Confidence scorer.
//!
//! Folds signal candidates into a [`ConfidenceState`]. Deltas are summed in
//! integer micro-units so that the fold is exactly associative: below the
//! clamp boundary the result does not depend on arrival order. The state is
//! clamped to `[0, 1]` after every step.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::signal::{DecisionTag, SignalCandidate};

const MICROS_PER_UNIT: i64 = 1_000_000;

/// Convert a confidence value into integer micro-units.
pub fn to_micros(value: f64) -> i64 { (value * MICROS_PER_UNIT as f64).round() as i64 }

/// Convert integer micro-units back into a confidence value.
pub fn from_micros(micros: i64) -> f64 { micros as f64 / MICROS_PER_UNIT as f64 }

// ─── State ───────────────────────────────────────────────────────────────────

/// Running confidence for one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceState {
  pub entity_id:              String,
  pub accumulated_confidence: f64,
  pub signal_count:           usize,
  /// ACCEPT candidates whose source was not rejected.
  pub accept_count:           usize,
  pub category_counts:        BTreeMap<String, usize>,
  #[serde(skip)]
  micros:                     i64,
}

impl ConfidenceState {
  fn new(entity_id: &str, base_micros: i64) -> Self {
    let micros = base_micros.clamp(0, MICROS_PER_UNIT);
    Self {
      entity_id:              entity_id.to_owned(),
      accumulated_confidence: from_micros(micros),
      signal_count:           0,
      accept_count:           0,
      category_counts:        BTreeMap::new(),
      micros,
    }
  }

  /// `true` if at least one hard-positive candidate has been folded in.
  pub fn has_hard_positive(&self) -> bool { self.accept_count > 0 }
}

/// One step of the fold, kept for observability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoldStep {
  pub category: String,
  pub tag:      DecisionTag,
  pub delta:    f64,
  pub before:   f64,
  pub after:    f64,
  /// `true` if the unclamped sum left `[0, 1]` on this step.
  pub clamped:  bool,
}

// ─── Scorer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
  base_micros:    i64,
  recency_window: Duration,
}

impl ConfidenceScorer {
  pub fn new(base_confidence: f64, recency_window_days: i64) -> Self {
    Self {
      base_micros:    to_micros(base_confidence),
      recency_window: Duration::days(recency_window_days),
    }
  }

  pub fn base_confidence(&self) -> f64 { from_micros(self.base_micros) }

  /// Fresh state at the base confidence with no signals.
  pub fn start(&self, entity_id: &str) -> ConfidenceState {
    ConfidenceState::new(entity_id, self.base_micros)
  }

  /// `true` if the candidate's evidence falls inside the recency window.
  /// Evidence dated after `as_of` is never recent.
  pub fn is_recent(&self, candidate: &SignalCandidate, as_of: DateTime<Utc>) -> bool {
    candidate
      .evidence_timestamp
      .is_some_and(|ts| ts <= as_of && as_of.signed_duration_since(ts) <= self.recency_window)
  }

  /// The signed contribution of a candidate, in micro-units.
  ///
  /// ACCEPT adds its delta plus the recency bonus when recent; WEAK_ACCEPT
  /// adds its delta; REJECT adds its (non-positive) delta.
  pub fn delta_micros(&self, candidate: &SignalCandidate, as_of: DateTime<Utc>) -> i64 {
    let base = to_micros(candidate.raw_delta);
    match candidate.decision_tag {
      DecisionTag::Accept if self.is_recent(candidate, as_of) => {
        base + to_micros(candidate.recency_bonus)
      }
      DecisionTag::Accept | DecisionTag::WeakAccept => base.max(0),
      DecisionTag::Reject => base.min(0),
    }
  }

  /// Fold a single candidate into `state`.
  pub fn step(
    &self,
    state: &mut ConfidenceState,
    candidate: &SignalCandidate,
    as_of: DateTime<Utc>,
  ) -> FoldStep {
    let delta = self.delta_micros(candidate, as_of);
    let before = state.micros;
    let unclamped = before + delta;
    let after = unclamped.clamp(0, MICROS_PER_UNIT);

    state.micros = after;
    state.accumulated_confidence = from_micros(after);
    state.signal_count += 1;
    if candidate.is_hard_positive() {
      state.accept_count += 1;
    }
    *state
      .category_counts
      .entry(candidate.category.clone())
      .or_default() += 1;

    FoldStep {
      category: candidate.category.clone(),
      tag:      candidate.decision_tag,
      delta:    from_micros(delta),
      before:   from_micros(before),
      after:    from_micros(after),
      clamped:  after != unclamped,
    }
  }

  /// Fold `candidates` in arrival order.
  pub fn fold(
    &self,
    entity_id: &str,
    candidates: &[SignalCandidate],
    as_of: DateTime<Utc>,
  ) -> (ConfidenceState, Vec<FoldStep>) {
    let mut state = self.start(entity_id);
    let trace = candidates
      .iter()
      .map(|c| self.step(&mut state, c, as_of))
      .collect();
    (state, trace)
  }
}
