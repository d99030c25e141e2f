//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings with nanosecond
//! precision and a `Z` suffix, so they round-trip exactly and sort
//! lexicographically. Floats are stored as REAL. Enums use their wire names.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rfp_core::{
  Opportunity,
  alert::Alert,
  temporal::{Episode, PriorFactors, PriorKey, PriorRecord},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Nanos, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_enum<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| {
    Error::Core(rfp_core::Error::UnknownVariant {
      kind,
      value: s.to_owned(),
    })
  })
}

fn corrupt(table: &'static str, reason: impl Into<String>) -> Error {
  Error::CorruptRow { table, reason: reason.into() }
}

// ─── Prior keys ──────────────────────────────────────────────────────────────

/// `(level, entity_id, category)` columns for a key.
pub fn encode_prior_key(key: &PriorKey) -> (&'static str, String, String) {
  match key {
    PriorKey::Exact { entity_id, category } => ("exact", entity_id.clone(), category.clone()),
    PriorKey::Cluster { category } => ("cluster", String::new(), category.clone()),
    PriorKey::Global => ("global", String::new(), String::new()),
  }
}

pub fn decode_prior_key(level: &str, entity_id: String, category: String) -> Result<PriorKey> {
  match level {
    "exact" => Ok(PriorKey::Exact { entity_id, category }),
    "cluster" => Ok(PriorKey::Cluster { category }),
    "global" => Ok(PriorKey::Global),
    other => Err(corrupt("temporal_priors", format!("unknown level {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `opportunities` row.
pub struct RawOpportunity {
  pub opportunity_id:   String,
  pub entity_id:        String,
  pub entity_name:      Option<String>,
  pub category:         String,
  pub final_confidence: f64,
  pub decision:         String,
  pub actionable:       bool,
  pub priority_tier:    String,
  pub fit_score:        i64,
  pub primary_reason:   String,
  pub urgency:          String,
  pub created_at:       String,
}

impl RawOpportunity {
  pub const COLUMNS: &'static str = "opportunity_id, entity_id, entity_name, category, \
     final_confidence, decision, actionable, priority_tier, fit_score, primary_reason, \
     urgency, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      opportunity_id:   row.get(0)?,
      entity_id:        row.get(1)?,
      entity_name:      row.get(2)?,
      category:         row.get(3)?,
      final_confidence: row.get(4)?,
      decision:         row.get(5)?,
      actionable:       row.get(6)?,
      priority_tier:    row.get(7)?,
      fit_score:        row.get(8)?,
      primary_reason:   row.get(9)?,
      urgency:          row.get(10)?,
      created_at:       row.get(11)?,
    })
  }

  pub fn into_opportunity(self) -> Result<Opportunity> {
    let fit_score = u8::try_from(self.fit_score)
      .map_err(|_| corrupt("opportunities", format!("fit_score {}", self.fit_score)))?;

    Ok(Opportunity {
      opportunity_id: decode_uuid(&self.opportunity_id)?,
      entity_id: self.entity_id,
      entity_name: self.entity_name,
      category: self.category,
      final_confidence: self.final_confidence,
      decision: decode_enum("decision", &self.decision)?,
      actionable: self.actionable,
      priority_tier: decode_enum("priority_tier", &self.priority_tier)?,
      fit_score,
      primary_reason: decode_enum("primary_reason", &self.primary_reason)?,
      urgency: decode_enum("urgency", &self.urgency)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `temporal_priors` row.
pub struct RawPrior {
  pub level:        String,
  pub entity_id:    String,
  pub category:     String,
  pub multiplier:   f64,
  pub seasonality:  f64,
  pub recurrence:   f64,
  pub momentum:     f64,
  pub sample_count: i64,
  pub computed_at:  String,
}

impl RawPrior {
  pub fn into_record(self) -> Result<PriorRecord> {
    let sample_count = usize::try_from(self.sample_count)
      .map_err(|_| corrupt("temporal_priors", format!("sample_count {}", self.sample_count)))?;

    Ok(PriorRecord {
      key: decode_prior_key(&self.level, self.entity_id, self.category)?,
      multiplier: self.multiplier,
      factors: PriorFactors {
        seasonality: self.seasonality,
        recurrence:  self.recurrence,
        momentum:    self.momentum,
      },
      sample_count,
      computed_at: decode_dt(&self.computed_at)?,
    })
  }
}

/// Raw values read directly from an `episodes` row.
pub struct RawEpisode {
  pub entity_id:   String,
  pub category:    String,
  pub observed_at: String,
}

impl RawEpisode {
  pub fn into_episode(self) -> Result<Episode> {
    Ok(Episode {
      entity_id:   self.entity_id,
      category:    self.category,
      observed_at: decode_dt(&self.observed_at)?,
    })
  }
}

/// Raw values read directly from an `alerts` row.
pub struct RawAlert {
  pub alert_id:       String,
  pub opportunity_id: String,
  pub entity_id:      String,
  pub tier:           String,
  pub channel:        String,
  pub sla:            String,
  pub due_at:         String,
  pub created_at:     String,
  pub delivered_at:   Option<String>,
}

impl RawAlert {
  pub const COLUMNS: &'static str =
    "alert_id, opportunity_id, entity_id, tier, channel, sla, due_at, created_at, delivered_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      alert_id:       row.get(0)?,
      opportunity_id: row.get(1)?,
      entity_id:      row.get(2)?,
      tier:           row.get(3)?,
      channel:        row.get(4)?,
      sla:            row.get(5)?,
      due_at:         row.get(6)?,
      created_at:     row.get(7)?,
      delivered_at:   row.get(8)?,
    })
  }

  pub fn into_alert(self) -> Result<Alert> {
    Ok(Alert {
      alert_id:       decode_uuid(&self.alert_id)?,
      opportunity_id: decode_uuid(&self.opportunity_id)?,
      entity_id:      self.entity_id,
      tier:           decode_enum("tier", &self.tier)?,
      channel:        decode_enum("channel", &self.channel)?,
      sla:            decode_enum("sla", &self.sla)?,
      due_at:         decode_dt(&self.due_at)?,
      created_at:     decode_dt(&self.created_at)?,
      delivered_at:   self.delivered_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
