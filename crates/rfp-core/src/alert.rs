//! Alert routing.
//!
//! An opportunity's priority tier picks the channels it is announced on and
//! how soon. Routing only produces outbox rows; formatting and delivery
//! belong to whatever drains the outbox.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::{Error, Result, opportunity::Opportunity};

/// Hour (UTC) at which digests go out.
const DIGEST_HOUR: i64 = 9;

// ─── Tiers ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  EnumIter,
)]
pub enum PriorityTier {
  #[serde(rename = "TIER_1")]
  #[strum(serialize = "TIER_1")]
  Tier1,
  #[serde(rename = "TIER_2")]
  #[strum(serialize = "TIER_2")]
  Tier2,
  #[serde(rename = "TIER_3")]
  #[strum(serialize = "TIER_3")]
  Tier3,
  #[serde(rename = "TIER_4")]
  #[strum(serialize = "TIER_4")]
  Tier4,
}

impl PriorityTier {
  pub fn channels(&self) -> &'static [AlertChannel] {
    use AlertChannel::*;
    match self {
      Self::Tier1 => &[Email, Webhook, Slack, Dashboard],
      Self::Tier2 => &[Email, Slack, Dashboard],
      Self::Tier3 => &[Email, Dashboard],
      Self::Tier4 => &[Dashboard],
    }
  }

  pub fn sla(&self) -> DeliverySla {
    match self {
      Self::Tier1 => DeliverySla::Immediate,
      Self::Tier2 => DeliverySla::WithinHour,
      Self::Tier3 => DeliverySla::DailyDigest,
      Self::Tier4 => DeliverySla::WeeklyDigest,
    }
  }
}

/// Minimum confidence and fit score for a tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRule {
  pub tier:           PriorityTier,
  pub min_confidence: f64,
  pub min_fit:        u8,
}

/// Ordered tier rules; the first satisfied rule wins, TIER_4 otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierPolicy {
  pub rules: Vec<TierRule>,
}

impl Default for TierPolicy {
  fn default() -> Self {
    let rule = |tier, min_confidence, min_fit| TierRule { tier, min_confidence, min_fit };
    Self {
      rules: vec![
        rule(PriorityTier::Tier1, 0.85, 80),
        rule(PriorityTier::Tier2, 0.75, 60),
        rule(PriorityTier::Tier3, 0.70, 40),
      ],
    }
  }
}

impl TierPolicy {
  pub fn validate(&self) -> Result<()> {
    for rule in &self.rules {
      if !(0.0..=1.0).contains(&rule.min_confidence) || rule.min_fit > 100 {
        return Err(Error::InvalidConfig(format!(
          "tier rule {} out of range",
          rule.tier
        )));
      }
    }
    Ok(())
  }

  pub fn classify(&self, final_confidence: f64, fit_score: u8) -> PriorityTier {
    self
      .rules
      .iter()
      .find(|r| final_confidence >= r.min_confidence && fit_score >= r.min_fit)
      .map_or(PriorityTier::Tier4, |r| r.tier)
  }
}

// ─── Channels and SLAs ───────────────────────────────────────────────────────

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
#[strum(serialize_all = "snake_case")]
pub enum AlertChannel {
  Email,
  Webhook,
  Slack,
  Dashboard,
}

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
#[strum(serialize_all = "snake_case")]
pub enum DeliverySla {
  Immediate,
  WithinHour,
  /// Next 09:00 UTC.
  DailyDigest,
  /// Next Monday 09:00 UTC.
  WeeklyDigest,
}

impl DeliverySla {
  pub fn due_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
    let digest_today = now.date_naive().and_time(NaiveTime::MIN).and_utc()
      + Duration::hours(DIGEST_HOUR);

    match self {
      Self::Immediate => now,
      Self::WithinHour => now + Duration::hours(1),
      Self::DailyDigest => {
        if digest_today > now {
          digest_today
        } else {
          digest_today + Duration::days(1)
        }
      }
      Self::WeeklyDigest => {
        let days_to_monday = (7 - now.weekday().num_days_from_monday() as i64) % 7;
        let slot = digest_today + Duration::days(days_to_monday);
        if slot > now { slot } else { slot + Duration::days(7) }
      }
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// An outbox row: one channel's notice about one opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
  pub alert_id:       Uuid,
  pub opportunity_id: Uuid,
  pub entity_id:      String,
  pub tier:           PriorityTier,
  pub channel:        AlertChannel,
  pub sla:            DeliverySla,
  pub due_at:         DateTime<Utc>,
  pub created_at:     DateTime<Utc>,
  pub delivered_at:   Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertRouter;

impl AlertRouter {
  /// Outbox rows for an opportunity. Non-actionable opportunities are not
  /// announced.
  pub fn route(&self, opportunity: &Opportunity, now: DateTime<Utc>) -> Vec<Alert> {
    if !opportunity.actionable {
      return Vec::new();
    }
    let tier = opportunity.priority_tier;
    let sla = tier.sla();
    let due_at = sla.due_at(now);

    tier
      .channels()
      .iter()
      .map(|channel| Alert {
        alert_id: Uuid::new_v4(),
        opportunity_id: opportunity.opportunity_id,
        entity_id: opportunity.entity_id.clone(),
        tier,
        channel: *channel,
        sla,
        due_at,
        created_at: now,
        delivered_at: None,
      })
      .collect()
  }
}
