//! Decision gate.
//!
//! Combines the folded confidence with the temporal multiplier and applies
//! the two thresholds. Numeric confidence alone never makes an entity
//! actionable: the gate only opens when at least one ACCEPT-tagged signal
//! was seen from a source no URL rule rejected.

use serde::{Deserialize, Serialize};

use crate::{confidence::ConfidenceState, signal::DecisionTag};

/// Bounds for thresholds after multiplier adjustment.
pub const ADJUSTED_THRESHOLD_MIN: f64 = 0.05;
pub const ADJUSTED_THRESHOLD_MAX: f64 = 0.99;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
  pub accept:      f64,
  pub weak_accept: f64,
}

impl Default for Thresholds {
  fn default() -> Self { Self { accept: 0.70, weak_accept: 0.50 } }
}

/// Base thresholds and the same thresholds after dividing by the multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAdjustment {
  pub base:       Thresholds,
  pub multiplier: f64,
  pub adjusted:   Thresholds,
}

impl ThresholdAdjustment {
  pub fn new(base: Thresholds, multiplier: f64) -> Self {
    let adjust = |t: f64| {
      if multiplier > 0.0 {
        (t / multiplier).clamp(ADJUSTED_THRESHOLD_MIN, ADJUSTED_THRESHOLD_MAX)
      } else {
        t
      }
    };
    Self {
      base,
      multiplier,
      adjusted: Thresholds {
        accept:      adjust(base.accept),
        weak_accept: adjust(base.weak_accept),
      },
    }
  }
}

/// Result of the gate for one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateOutcome {
  pub final_confidence: f64,
  /// `None` when the gate is closed.
  pub decision:         Option<DecisionTag>,
  pub actionable:       bool,
  /// `true` if at least one hard-positive signal was present.
  pub gate_open:        bool,
}

impl GateOutcome {
  /// Whether this outcome produces a persisted opportunity.
  pub fn emits_opportunity(&self) -> bool {
    matches!(
      self.decision,
      Some(DecisionTag::Accept) | Some(DecisionTag::WeakAccept)
    )
  }
}

#[derive(Debug, Clone, Copy)]
pub struct DecisionGate {
  adjustment: ThresholdAdjustment,
}

impl DecisionGate {
  pub fn new(adjustment: ThresholdAdjustment) -> Self { Self { adjustment } }

  pub fn adjustment(&self) -> &ThresholdAdjustment { &self.adjustment }

  pub fn decide(&self, state: &ConfidenceState) -> GateOutcome {
    let m = self.adjustment.multiplier;
    let final_confidence = (state.accumulated_confidence * m).clamp(0.0, 1.0);
    let gate_open = state.has_hard_positive();

    if !gate_open {
      return GateOutcome {
        final_confidence,
        decision: None,
        actionable: false,
        gate_open,
      };
    }

    let t = self.adjustment.adjusted;
    let decision = if final_confidence >= t.accept {
      DecisionTag::Accept
    } else if final_confidence >= t.weak_accept {
      DecisionTag::WeakAccept
    } else {
      DecisionTag::Reject
    };

    GateOutcome {
      final_confidence,
      decision: Some(decision),
      actionable: decision == DecisionTag::Accept,
      gate_open,
    }
  }
}
