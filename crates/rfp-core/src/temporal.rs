//! Temporal priors.
//!
//! A temporal prior is a multiplier derived from the timestamps of past
//! procurement episodes: seasonality × recurrence × momentum, clamped to
//! [`MULTIPLIER_MIN`]..=[`MULTIPLIER_MAX`].
//!
//! [`PriorBuilder`] is the offline (nightly) job that turns episodes into
//! stored [`PriorRecord`]s at three levels of specificity. [`PriorResolver`]
//! is the read side used while scoring: exact → cluster → global → neutral.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::PriorStore;

pub const MULTIPLIER_MIN: f64 = 0.75;
pub const MULTIPLIER_MAX: f64 = 1.40;

pub const SEASONALITY_RANGE: (f64, f64) = (0.90, 1.10);
pub const RECURRENCE_RANGE: (f64, f64) = (0.95, 1.10);
pub const MOMENTUM_RANGE: (f64, f64) = (0.95, 1.20);

/// Window, in days, counted as "recent" for momentum.
const MOMENTUM_WINDOW_DAYS: i64 = 90;

/// Tolerance of the recurrence fit, as a fraction of the mean interval.
const RECURRENCE_SIGMA: f64 = 0.25;

// ─── Types ───────────────────────────────────────────────────────────────────

/// A past procurement event for an entity and category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
  pub entity_id:   String,
  pub category:    String,
  pub observed_at: DateTime<Utc>,
}

/// Which level of the backoff chain produced a prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffLevel {
  Exact,
  Cluster,
  Global,
  /// No level had enough history; multiplier is 1.0.
  Neutral,
}

impl BackoffLevel {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Exact => "exact",
      Self::Cluster => "cluster",
      Self::Global => "global",
      Self::Neutral => "neutral",
    }
  }
}

/// Lookup key into a prior store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum PriorKey {
  Exact { entity_id: String, category: String },
  Cluster { category: String },
  Global,
}

impl PriorKey {
  pub fn level(&self) -> BackoffLevel {
    match self {
      Self::Exact { .. } => BackoffLevel::Exact,
      Self::Cluster { .. } => BackoffLevel::Cluster,
      Self::Global => BackoffLevel::Global,
    }
  }

  /// The backoff chain for an (entity, category) pair, most specific first.
  pub fn chain(entity_id: &str, category: &str) -> [PriorKey; 3] {
    [
      Self::Exact {
        entity_id: entity_id.to_owned(),
        category:  category.to_owned(),
      },
      Self::Cluster { category: category.to_owned() },
      Self::Global,
    ]
  }
}

/// The three independently computed sub-factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorFactors {
  pub seasonality: f64,
  pub recurrence:  f64,
  pub momentum:    f64,
}

impl PriorFactors {
  pub const NEUTRAL: Self = Self { seasonality: 1.0, recurrence: 1.0, momentum: 1.0 };

  /// Product of the sub-factors, clamped to the multiplier range.
  pub fn multiplier(&self) -> f64 { clamp_multiplier(self.seasonality * self.recurrence * self.momentum) }
}

pub fn clamp_multiplier(raw: f64) -> f64 {
  if raw.is_nan() {
    return 1.0;
  }
  raw.clamp(MULTIPLIER_MIN, MULTIPLIER_MAX)
}

/// A stored prior, as written by the nightly job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorRecord {
  pub key:          PriorKey,
  pub multiplier:   f64,
  pub factors:      PriorFactors,
  pub sample_count: usize,
  pub computed_at:  DateTime<Utc>,
}

/// The prior applied to one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalPrior {
  pub entity_id:     String,
  pub category:      String,
  pub multiplier:    f64,
  pub backoff_level: BackoffLevel,
  pub sample_count:  usize,
  pub computed_at:   Option<DateTime<Utc>>,
}

impl TemporalPrior {
  pub fn neutral(entity_id: &str, category: &str) -> Self {
    Self {
      entity_id:     entity_id.to_owned(),
      category:      category.to_owned(),
      multiplier:    1.0,
      backoff_level: BackoffLevel::Neutral,
      sample_count:  0,
      computed_at:   None,
    }
  }
}

// ─── Sub-factors ─────────────────────────────────────────────────────────────

fn days_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
  (later - earlier).num_seconds() as f64 / 86_400.0
}

/// Share of episodes within ±1 month of `as_of`'s month, against the uniform
/// expectation of 3/12.
pub fn seasonality(timestamps: &[DateTime<Utc>], as_of: DateTime<Utc>) -> f64 {
  if timestamps.is_empty() {
    return 1.0;
  }
  const EXPECTED: f64 = 3.0 / 12.0;
  let (lo, hi) = SEASONALITY_RANGE;

  let month = as_of.month0() as i32;
  let in_window = timestamps
    .iter()
    .filter(|ts| {
      let d = (ts.month0() as i32 - month).rem_euclid(12);
      d.min(12 - d) <= 1
    })
    .count();
  let share = in_window as f64 / timestamps.len() as f64;

  let factor = if share >= EXPECTED {
    1.0 + (hi - 1.0) * (share - EXPECTED) / (1.0 - EXPECTED)
  } else {
    1.0 - (1.0 - lo) * (EXPECTED - share) / EXPECTED
  };
  factor.clamp(lo, hi)
}

/// How well "days since the last episode" fits the mean interval between
/// episodes. Needs at least two past episodes.
pub fn recurrence(timestamps: &[DateTime<Utc>], as_of: DateTime<Utc>) -> f64 {
  let mut past: Vec<DateTime<Utc>> =
    timestamps.iter().copied().filter(|ts| *ts <= as_of).collect();
  if past.len() < 2 {
    return 1.0;
  }
  past.sort();
  let (lo, hi) = RECURRENCE_RANGE;

  let span = days_between(past[past.len() - 1], past[0]);
  let mean_interval = span / (past.len() - 1) as f64;
  if mean_interval <= 0.0 {
    return 1.0;
  }

  let since_last = days_between(as_of, past[past.len() - 1]);
  let ratio = since_last / mean_interval;
  let fit = (-(ratio - 1.0).powi(2) / (2.0 * RECURRENCE_SIGMA.powi(2))).exp();
  (lo + (hi - lo) * fit).clamp(lo, hi)
}

/// Episodes in the last 90 days against the count the long-run rate
/// predicts.
pub fn momentum(timestamps: &[DateTime<Utc>], as_of: DateTime<Utc>) -> f64 {
  let past: Vec<DateTime<Utc>> =
    timestamps.iter().copied().filter(|ts| *ts <= as_of).collect();
  let Some(first) = past.iter().min().copied() else {
    return 1.0;
  };
  let (lo, hi) = MOMENTUM_RANGE;

  let window = Duration::days(MOMENTUM_WINDOW_DAYS);
  let span = days_between(as_of, first).max(MOMENTUM_WINDOW_DAYS as f64);
  let expected = past.len() as f64 * MOMENTUM_WINDOW_DAYS as f64 / span;
  let recent = past.iter().filter(|ts| as_of - **ts <= window).count() as f64;
  let ratio = recent / expected;

  let factor = if ratio >= 1.0 {
    1.0 + (hi - 1.0) * ((ratio - 1.0) / 2.0).min(1.0)
  } else {
    1.0 - (1.0 - lo) * (1.0 - ratio)
  };
  factor.clamp(lo, hi)
}

pub fn factors(timestamps: &[DateTime<Utc>], as_of: DateTime<Utc>) -> PriorFactors {
  PriorFactors {
    seasonality: seasonality(timestamps, as_of),
    recurrence:  recurrence(timestamps, as_of),
    momentum:    momentum(timestamps, as_of),
  }
}

// ─── Builder ─────────────────────────────────────────────────────────────────

/// Offline job turning episode history into prior records.
#[derive(Debug, Clone, Copy)]
pub struct PriorBuilder {
  min_samples: usize,
}

impl PriorBuilder {
  pub fn new(min_samples: usize) -> Self { Self { min_samples: min_samples.max(1) } }

  /// Build exact, cluster and global records for every group with at least
  /// `min_samples` episodes. Output is ordered by key.
  pub fn build(&self, episodes: &[Episode], as_of: DateTime<Utc>) -> Vec<PriorRecord> {
    let mut groups: BTreeMap<PriorKey, Vec<DateTime<Utc>>> = BTreeMap::new();

    for ep in episodes {
      for key in PriorKey::chain(&ep.entity_id, &ep.category) {
        groups.entry(key).or_default().push(ep.observed_at);
      }
    }

    groups
      .into_iter()
      .filter(|(_, ts)| ts.len() >= self.min_samples)
      .map(|(key, ts)| {
        let factors = factors(&ts, as_of);
        PriorRecord {
          key,
          multiplier: factors.multiplier(),
          factors,
          sample_count: ts.len(),
          computed_at: as_of,
        }
      })
      .collect()
  }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Read-side lookup through the backoff chain.
#[derive(Debug, Clone)]
pub struct PriorResolver<P> {
  store:       P,
  min_samples: usize,
}

impl<P: PriorStore> PriorResolver<P> {
  pub fn new(store: P, min_samples: usize) -> Self { Self { store, min_samples } }

  pub fn store(&self) -> &P { &self.store }

  /// Resolve the prior for `(entity_id, category)`. Never fails: store errors
  /// and missing levels fall through to the next level, ending at neutral.
  pub async fn resolve(&self, entity_id: &str, category: &str) -> TemporalPrior {
    for key in PriorKey::chain(entity_id, category) {
      let level = key.level();
      match self.store.get_prior(key).await {
        Ok(Some(record)) if record.sample_count >= self.min_samples => {
          tracing::debug!(
            entity_id,
            category,
            level = level.as_str(),
            multiplier = record.multiplier,
            "resolved temporal prior"
          );
          return TemporalPrior {
            entity_id:     entity_id.to_owned(),
            category:      category.to_owned(),
            multiplier:    clamp_multiplier(record.multiplier),
            backoff_level: level,
            sample_count:  record.sample_count,
            computed_at:   Some(record.computed_at),
          };
        }
        Ok(_) => {}
        Err(e) => {
          tracing::warn!(
            entity_id,
            category,
            level = level.as_str(),
            error = %e,
            "prior lookup failed; backing off"
          );
        }
      }
    }
    TemporalPrior::neutral(entity_id, category)
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::store::InMemoryPriorStore;

  fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
  }

  fn ep(entity: &str, category: &str, ts: DateTime<Utc>) -> Episode {
    Episode {
      entity_id:   entity.into(),
      category:    category.into(),
      observed_at: ts,
    }
  }

  #[test]
  fn empty_history_is_neutral() {
    let f = factors(&[], at(2025, 9, 1));
    assert_eq!(f, PriorFactors::NEUTRAL);
    assert_eq!(f.multiplier(), 1.0);
  }

  #[test]
  fn seasonality_bounds() {
    let now = at(2025, 9, 15);
    // All in September → maximal.
    let all_in = vec![at(2022, 9, 1), at(2023, 9, 1), at(2024, 9, 1)];
    assert!((seasonality(&all_in, now) - 1.10).abs() < 1e-12);
    // All in March → minimal.
    let all_out = vec![at(2022, 3, 1), at(2023, 3, 1)];
    assert!((seasonality(&all_out, now) - 0.90).abs() < 1e-12);
    // Wraps around the year end.
    let december = vec![at(2024, 12, 1)];
    assert!((seasonality(&december, at(2025, 1, 10)) - 1.10).abs() < 1e-12);
  }

  #[test]
  fn recurrence_peaks_when_due() {
    let history = vec![at(2022, 9, 1), at(2023, 9, 1), at(2024, 9, 1)];
    let due = recurrence(&history, at(2025, 9, 1));
    let early = recurrence(&history, at(2024, 12, 1));
    assert!(due > 1.09, "due={due}");
    assert!(early < due);
    assert!(early >= RECURRENCE_RANGE.0);
    assert_eq!(recurrence(&history[..1], at(2025, 9, 1)), 1.0);
  }

  #[test]
  fn momentum_rewards_recent_bursts() {
    let now = at(2025, 9, 1);
    let burst = vec![at(2021, 1, 1), at(2025, 7, 1), at(2025, 8, 1), at(2025, 8, 20)];
    let quiet = vec![at(2021, 1, 1), at(2022, 1, 1), at(2023, 1, 1)];
    assert!(momentum(&burst, now) > 1.10);
    assert!(momentum(&quiet, now) < 1.0);
    assert!(momentum(&quiet, now) >= MOMENTUM_RANGE.0);
  }

  #[test]
  fn future_episodes_are_ignored() {
    let now = at(2025, 1, 1);
    assert_eq!(momentum(&[at(2026, 1, 1)], now), 1.0);
    assert_eq!(recurrence(&[at(2026, 1, 1), at(2027, 1, 1)], now), 1.0);
  }

  #[test]
  fn multiplier_is_clamped() {
    let high = PriorFactors { seasonality: 1.10, recurrence: 1.10, momentum: 1.20 };
    assert_eq!(high.multiplier(), MULTIPLIER_MAX);
    let low = PriorFactors { seasonality: 0.5, recurrence: 0.5, momentum: 0.5 };
    assert_eq!(low.multiplier(), MULTIPLIER_MIN);
    assert_eq!(clamp_multiplier(f64::NAN), 1.0);
  }

  #[test]
  fn builder_respects_min_samples() {
    let now = at(2025, 9, 1);
    let episodes = vec![
      ep("arsenal", "crm", at(2022, 9, 1)),
      ep("arsenal", "crm", at(2023, 9, 1)),
      ep("arsenal", "crm", at(2024, 9, 1)),
      ep("chelsea", "crm", at(2024, 3, 1)),
      ep("chelsea", "ticketing", at(2024, 3, 1)),
    ];
    let records = PriorBuilder::new(3).build(&episodes, now);
    let keys: Vec<_> = records.iter().map(|r| r.key.clone()).collect();

    assert_eq!(
      keys,
      vec![
        PriorKey::Exact { entity_id: "arsenal".into(), category: "crm".into() },
        PriorKey::Cluster { category: "crm".into() },
        PriorKey::Global,
      ]
    );
    assert_eq!(records[1].sample_count, 4);
    assert_eq!(records[2].sample_count, 5);
    assert!(records.iter().all(|r| (MULTIPLIER_MIN..=MULTIPLIER_MAX).contains(&r.multiplier)));
  }

  fn record(key: PriorKey, multiplier: f64, samples: usize) -> PriorRecord {
    PriorRecord {
      key,
      multiplier,
      factors: PriorFactors::NEUTRAL,
      sample_count: samples,
      computed_at: at(2025, 9, 1),
    }
  }

  #[tokio::test]
  async fn resolver_backs_off_exact_cluster_global_neutral() {
    let store = InMemoryPriorStore::from_records([
      record(
        PriorKey::Exact { entity_id: "arsenal".into(), category: "crm".into() },
        1.2,
        5,
      ),
      record(PriorKey::Cluster { category: "crm".into() }, 1.1, 9),
      record(PriorKey::Global, 0.9, 40),
    ]);
    let resolver = PriorResolver::new(store, 3);

    let exact = resolver.resolve("arsenal", "crm").await;
    assert_eq!(exact.backoff_level, BackoffLevel::Exact);
    assert_eq!(exact.multiplier, 1.2);

    let cluster = resolver.resolve("chelsea", "crm").await;
    assert_eq!(cluster.backoff_level, BackoffLevel::Cluster);
    assert_eq!(cluster.multiplier, 1.1);

    let global = resolver.resolve("chelsea", "ticketing").await;
    assert_eq!(global.backoff_level, BackoffLevel::Global);
    assert_eq!(global.multiplier, 0.9);
    assert_eq!(global.entity_id, "chelsea");

    let empty = PriorResolver::new(InMemoryPriorStore::default(), 3);
    let neutral = empty.resolve("chelsea", "ticketing").await;
    assert_eq!(neutral, TemporalPrior::neutral("chelsea", "ticketing"));
  }

  #[tokio::test]
  async fn resolver_skips_undersampled_records() {
    let store = InMemoryPriorStore::from_records([
      record(
        PriorKey::Exact { entity_id: "arsenal".into(), category: "crm".into() },
        1.3,
        1,
      ),
      record(PriorKey::Cluster { category: "crm".into() }, 1.05, 6),
    ]);
    let prior = PriorResolver::new(store, 3).resolve("arsenal", "crm").await;
    assert_eq!(prior.backoff_level, BackoffLevel::Cluster);
    assert_eq!(prior.multiplier, 1.05);
  }
}
