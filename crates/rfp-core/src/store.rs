//! Storage traits.
//!
//! The scoring path only ever reads priors ([`PriorStore`]). Everything else
//! is written by the layers around it: the API and batch runner record
//! opportunities and enqueue alerts, and the nightly job replaces the prior
//! table from episode history. Backends (e.g. `rfp-store-sqlite`) implement
//! all four traits.

use std::{collections::HashMap, convert::Infallible, future::Future, sync::Arc};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  alert::Alert,
  opportunity::{Opportunity, OpportunityQuery},
  temporal::{Episode, PriorKey, PriorRecord},
};

// ─── Priors ──────────────────────────────────────────────────────────────────

/// Read-only lookup of precomputed temporal priors.
///
/// All methods return `Send` futures so stores can be shared across tokio
/// tasks.
pub trait PriorStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch the stored prior for `key`. `None` if the level has no row.
  fn get_prior(
    &self,
    key: PriorKey,
  ) -> impl Future<Output = Result<Option<PriorRecord>, Self::Error>> + Send + '_;
}

impl<T: PriorStore> PriorStore for Arc<T> {
  type Error = T::Error;

  fn get_prior(
    &self,
    key: PriorKey,
  ) -> impl Future<Output = Result<Option<PriorRecord>, Self::Error>> + Send + '_ {
    (**self).get_prior(key)
  }
}

/// Fixed, in-process prior table. Used by tests and offline scoring.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPriorStore {
  records: HashMap<PriorKey, PriorRecord>,
}

impl InMemoryPriorStore {
  pub fn from_records(records: impl IntoIterator<Item = PriorRecord>) -> Self {
    Self {
      records: records.into_iter().map(|r| (r.key.clone(), r)).collect(),
    }
  }

  pub fn insert(&mut self, record: PriorRecord) { self.records.insert(record.key.clone(), record); }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }
}

impl PriorStore for InMemoryPriorStore {
  type Error = Infallible;

  async fn get_prior(&self, key: PriorKey) -> Result<Option<PriorRecord>, Infallible> {
    Ok(self.records.get(&key).cloned())
  }
}

// ─── Opportunities ───────────────────────────────────────────────────────────

/// Insert-only opportunity sink.
pub trait OpportunityStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new opportunity. Fails if the id already exists.
  fn record_opportunity(
    &self,
    opportunity: Opportunity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Persist a new opportunity and enqueue its alerts in one write. Either
  /// both land or neither does.
  fn record_with_alerts(
    &self,
    opportunity: Opportunity,
    alerts: Vec<Alert>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_opportunity(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Opportunity>, Self::Error>> + Send + '_;

  /// List opportunities matching `query`, newest first.
  fn list_opportunities(
    &self,
    query: OpportunityQuery,
  ) -> impl Future<Output = Result<Vec<Opportunity>, Self::Error>> + Send + '_;
}

// ─── Episodes ────────────────────────────────────────────────────────────────

/// Historical episodes and the prior table derived from them.
pub trait EpisodeStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Append episodes. Returns the number inserted; exact duplicates are
  /// ignored.
  fn record_episodes(
    &self,
    episodes: Vec<Episode>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  fn list_episodes(&self) -> impl Future<Output = Result<Vec<Episode>, Self::Error>> + Send + '_;

  /// Atomically swap the whole prior table for `records`.
  fn replace_priors(
    &self,
    records: Vec<PriorRecord>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Alerts ──────────────────────────────────────────────────────────────────

/// Outbox of alerts awaiting external delivery.
pub trait AlertOutbox: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn enqueue_alerts(
    &self,
    alerts: Vec<Alert>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Undelivered alerts with `due_at <= now`, earliest first.
  fn due_alerts(
    &self,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Alert>, Self::Error>> + Send + '_;

  /// Mark an alert delivered. Returns `false` if it was unknown or already
  /// delivered.
  fn mark_delivered(
    &self,
    alert_id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;
}
