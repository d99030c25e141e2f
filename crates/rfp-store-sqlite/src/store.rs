//! [`SqliteStore`]: the SQLite implementation of the `rfp-core` store traits.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use rfp_core::{
  Opportunity,
  alert::Alert,
  opportunity::OpportunityQuery,
  store::{AlertOutbox, EpisodeStore, OpportunityStore, PriorStore},
  temporal::{Episode, PriorKey, PriorRecord},
};

use crate::{
  Error, Result,
  encode::{
    RawAlert, RawEpisode, RawOpportunity, RawPrior, encode_dt, encode_prior_key,
    encode_uuid,
  },
  schema::SCHEMA,
};

/// Default page size for opportunity listings.
const DEFAULT_LIMIT: usize = 100;

// ─── Store ───────────────────────────────────────────────────────────────────

/// An opportunity store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row writers ─────────────────────────────────────────────────────────────

fn insert_opportunity(conn: &rusqlite::Connection, o: &Opportunity) -> rusqlite::Result<()> {
  conn.execute(
    &format!(
      "INSERT INTO opportunities ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
      RawOpportunity::COLUMNS
    ),
    rusqlite::params![
      encode_uuid(o.opportunity_id),
      o.entity_id,
      o.entity_name,
      o.category,
      o.final_confidence,
      o.decision.as_ref(),
      o.actionable,
      o.priority_tier.as_ref(),
      o.fit_score,
      o.primary_reason.as_ref(),
      o.urgency.as_ref(),
      encode_dt(o.created_at),
    ],
  )?;
  Ok(())
}

fn insert_alerts(conn: &rusqlite::Connection, alerts: &[Alert]) -> rusqlite::Result<()> {
  let mut stmt = conn.prepare(&format!(
    "INSERT INTO alerts ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    RawAlert::COLUMNS
  ))?;
  for a in alerts {
    stmt.execute(rusqlite::params![
      encode_uuid(a.alert_id),
      encode_uuid(a.opportunity_id),
      a.entity_id,
      a.tier.as_ref(),
      a.channel.as_ref(),
      a.sla.as_ref(),
      encode_dt(a.due_at),
      encode_dt(a.created_at),
      a.delivered_at.map(encode_dt),
    ])?;
  }
  Ok(())
}

// ─── PriorStore impl ─────────────────────────────────────────────────────────

impl PriorStore for SqliteStore {
  type Error = Error;

  async fn get_prior(&self, key: PriorKey) -> Result<Option<PriorRecord>> {
    let (level, entity_id, category) = encode_prior_key(&key);

    let raw: Option<RawPrior> = self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row(
            "SELECT level, entity_id, category, multiplier, seasonality, recurrence,
                    momentum, sample_count, computed_at
             FROM temporal_priors
             WHERE level = ?1 AND entity_id = ?2 AND category = ?3",
            rusqlite::params![level, entity_id, category],
            |row| {
              Ok(RawPrior {
                level:        row.get(0)?,
                entity_id:    row.get(1)?,
                category:     row.get(2)?,
                multiplier:   row.get(3)?,
                seasonality:  row.get(4)?,
                recurrence:   row.get(5)?,
                momentum:     row.get(6)?,
                sample_count: row.get(7)?,
                computed_at:  row.get(8)?,
              })
            },
          )
          .optional()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawPrior::into_record).transpose()
  }
}

// ─── OpportunityStore impl ───────────────────────────────────────────────────

impl OpportunityStore for SqliteStore {
  type Error = Error;

  async fn record_opportunity(&self, opportunity: Opportunity) -> Result<()> {
    self.record_with_alerts(opportunity, Vec::new()).await
  }

  async fn record_with_alerts(&self, opportunity: Opportunity, alerts: Vec<Alert>) -> Result<()> {
    let opportunity_id = opportunity.opportunity_id;
    let alert_count = alerts.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        insert_opportunity(&tx, &opportunity)?;
        insert_alerts(&tx, &alerts)?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::debug!(%opportunity_id, alerts = alert_count, "stored opportunity");
    Ok(())
  }

  async fn get_opportunity(&self, id: Uuid) -> Result<Option<Opportunity>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawOpportunity> = self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row(
            &format!(
              "SELECT {} FROM opportunities WHERE opportunity_id = ?1",
              RawOpportunity::COLUMNS
            ),
            rusqlite::params![id_str],
            RawOpportunity::from_row,
          )
          .optional()?;
        Ok(raw)
      })
      .await?;

    raw.map(RawOpportunity::into_opportunity).transpose()
  }

  async fn list_opportunities(&self, query: OpportunityQuery) -> Result<Vec<Opportunity>> {
    let tier       = query.tier.map(|t| t.as_ref().to_owned());
    let limit_val  = query.limit.unwrap_or(DEFAULT_LIMIT) as i64;
    let offset_val = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawOpportunity> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM opportunities
           WHERE (?1 IS NULL OR entity_id = ?1)
             AND (?2 IS NULL OR category = ?2)
             AND (?3 IS NULL OR actionable = ?3)
             AND (?4 IS NULL OR priority_tier = ?4)
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?5 OFFSET ?6",
          RawOpportunity::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              query.entity_id,
              query.category,
              query.actionable,
              tier,
              limit_val,
              offset_val,
            ],
            RawOpportunity::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawOpportunity::into_opportunity).collect()
  }
}

// ─── EpisodeStore impl ───────────────────────────────────────────────────────

impl EpisodeStore for SqliteStore {
  type Error = Error;

  async fn record_episodes(&self, episodes: Vec<Episode>) -> Result<usize> {
    let rows: Vec<(String, String, String)> = episodes
      .into_iter()
      .map(|e| (e.entity_id, e.category, encode_dt(e.observed_at)))
      .collect();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO episodes (entity_id, category, observed_at)
             VALUES (?1, ?2, ?3)",
          )?;
          for (entity_id, category, observed_at) in &rows {
            inserted += stmt.execute(rusqlite::params![entity_id, category, observed_at])?;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;

    tracing::debug!(inserted, "recorded episodes");
    Ok(inserted)
  }

  async fn list_episodes(&self) -> Result<Vec<Episode>> {
    let raws: Vec<RawEpisode> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT entity_id, category, observed_at FROM episodes
           ORDER BY entity_id, category, observed_at",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawEpisode {
              entity_id:   row.get(0)?,
              category:    row.get(1)?,
              observed_at: row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEpisode::into_episode).collect()
  }

  async fn replace_priors(&self, records: Vec<PriorRecord>) -> Result<()> {
    let count = records.len();
    let rows: Vec<_> = records
      .into_iter()
      .map(|r| {
        let (level, entity_id, category) = encode_prior_key(&r.key);
        (
          level,
          entity_id,
          category,
          r.multiplier,
          r.factors,
          r.sample_count as i64,
          encode_dt(r.computed_at),
        )
      })
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM temporal_priors", [])?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO temporal_priors (
               level, entity_id, category, multiplier, seasonality, recurrence,
               momentum, sample_count, computed_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          )?;
          for (level, entity_id, category, multiplier, f, samples, computed_at) in &rows {
            stmt.execute(rusqlite::params![
              level,
              entity_id,
              category,
              multiplier,
              f.seasonality,
              f.recurrence,
              f.momentum,
              samples,
              computed_at,
            ])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::info!(count, "replaced temporal prior table");
    Ok(())
  }
}

// ─── AlertOutbox impl ────────────────────────────────────────────────────────

impl AlertOutbox for SqliteStore {
  type Error = Error;

  async fn enqueue_alerts(&self, alerts: Vec<Alert>) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        insert_alerts(&tx, &alerts)?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn due_alerts(&self, now: DateTime<Utc>) -> Result<Vec<Alert>> {
    let now_str = encode_dt(now);

    let raws: Vec<RawAlert> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM alerts
           WHERE delivered_at IS NULL AND due_at <= ?1
           ORDER BY due_at, rowid",
          RawAlert::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![now_str], RawAlert::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAlert::into_alert).collect()
  }

  async fn mark_delivered(&self, alert_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
    let id_str = encode_uuid(alert_id);
    let at_str = encode_dt(at);

    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "UPDATE alerts SET delivered_at = ?2
           WHERE alert_id = ?1 AND delivered_at IS NULL",
          rusqlite::params![id_str, at_str],
        )?;
        Ok(n)
      })
      .await?;
    Ok(changed == 1)
  }
}
