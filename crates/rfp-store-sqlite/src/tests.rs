//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rfp_core::{
  Opportunity,
  alert::{AlertRouter, PriorityTier},
  config::PipelineConfig,
  opportunity::OpportunityQuery,
  pipeline::{EvaluationRequest, Pipeline},
  reason::{ReasonCategory, Urgency},
  signal::DecisionTag,
  store::{AlertOutbox, EpisodeStore, OpportunityStore, PriorStore},
  temporal::{BackoffLevel, Episode, PriorBuilder, PriorKey},
};
use serde_json::json;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

fn opportunity(entity: &str, tier: PriorityTier, created_at: DateTime<Utc>) -> Opportunity {
  Opportunity {
    opportunity_id: Uuid::new_v4(),
    entity_id: entity.into(),
    entity_name: Some(format!("{entity} FC")),
    category: "crm".into(),
    // Not representable in a short decimal; must survive REAL storage.
    final_confidence: 0.1 + 0.2 + 0.6,
    decision: DecisionTag::Accept,
    actionable: true,
    priority_tier: tier,
    fit_score: 73,
    primary_reason: ReasonCategory::TechnologyObsolescence,
    urgency: Urgency::Critical,
    created_at: created_at + Duration::nanoseconds(987_654_321),
  }
}

// ─── Opportunities ───────────────────────────────────────────────────────────

#[tokio::test]
async fn opportunity_round_trip_is_exact() {
  let s = store().await;
  let opp = opportunity("arsenal", PriorityTier::Tier1, at(2025, 9, 1, 12));
  s.record_opportunity(opp.clone()).await.unwrap();

  let fetched = s.get_opportunity(opp.opportunity_id).await.unwrap().unwrap();
  assert_eq!(fetched, opp);
  assert_eq!(fetched.final_confidence.to_bits(), opp.final_confidence.to_bits());
}

#[tokio::test]
async fn missing_opportunity_returns_none() {
  let s = store().await;
  assert!(s.get_opportunity(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn opportunities_are_insert_only() {
  let s = store().await;
  let opp = opportunity("arsenal", PriorityTier::Tier1, at(2025, 9, 1, 12));
  s.record_opportunity(opp.clone()).await.unwrap();
  assert!(s.record_opportunity(opp).await.is_err());
}

#[tokio::test]
async fn opportunity_and_alerts_are_written_together() {
  let s = store().await;
  let now = at(2025, 9, 1, 12);
  let opp = opportunity("arsenal", PriorityTier::Tier1, now);
  let alerts = AlertRouter.route(&opp, now);
  assert!(!alerts.is_empty());

  // A repeated alert id violates the primary key after the opportunity row
  // has been inserted; the whole write must roll back.
  let mut broken = alerts.clone();
  broken.push(alerts[0].clone());
  assert!(s.record_with_alerts(opp.clone(), broken).await.is_err());
  assert!(s.get_opportunity(opp.opportunity_id).await.unwrap().is_none());
  assert!(s.due_alerts(now).await.unwrap().is_empty());

  s.record_with_alerts(opp.clone(), alerts.clone()).await.unwrap();
  assert_eq!(s.get_opportunity(opp.opportunity_id).await.unwrap(), Some(opp));
  assert_eq!(s.due_alerts(now).await.unwrap().len(), alerts.len());
}

#[tokio::test]
async fn reruns_create_new_records() {
  let s = store().await;
  let config = PipelineConfig::default();
  let pipeline = Pipeline::new(&config, s.clone()).unwrap();
  let request = EvaluationRequest {
    entity_id:   "arsenal".into(),
    entity_name: None,
    category:    "crm".into(),
    profile:     Default::default(),
    evidence:    vec![json!({"text": "RFP issued for a new CRM platform"})],
  };

  for hour in [10, 11] {
    let eval = pipeline.evaluate(&request, at(2025, 9, 1, hour)).await;
    assert!(eval.record(&s).await.unwrap());
  }

  let all = s
    .list_opportunities(OpportunityQuery {
      entity_id: Some("arsenal".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(all.len(), 2);
  assert_ne!(all[0].opportunity_id, all[1].opportunity_id);
  assert!(all[0].created_at > all[1].created_at);
}

#[tokio::test]
async fn list_filters_and_pages() {
  let s = store().await;
  let base = at(2025, 9, 1, 0);
  for (i, (entity, tier)) in [
    ("arsenal", PriorityTier::Tier1),
    ("chelsea", PriorityTier::Tier2),
    ("arsenal", PriorityTier::Tier3),
  ]
  .into_iter()
  .enumerate()
  {
    let mut opp = opportunity(entity, tier, base + Duration::hours(i as i64));
    opp.actionable = tier != PriorityTier::Tier3;
    s.record_opportunity(opp).await.unwrap();
  }

  let arsenal = s
    .list_opportunities(OpportunityQuery {
      entity_id: Some("arsenal".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(arsenal.len(), 2);
  assert_eq!(arsenal[0].priority_tier, PriorityTier::Tier3);

  let actionable = s
    .list_opportunities(OpportunityQuery {
      actionable: Some(true),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(actionable.len(), 2);

  let tier2 = s
    .list_opportunities(OpportunityQuery {
      tier: Some(PriorityTier::Tier2),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(tier2.len(), 1);
  assert_eq!(tier2[0].entity_id, "chelsea");

  let page = s
    .list_opportunities(OpportunityQuery {
      limit: Some(1),
      offset: Some(1),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(page.len(), 1);
  assert_eq!(page[0].entity_id, "chelsea");
}

// ─── Priors and episodes ─────────────────────────────────────────────────────

fn history() -> Vec<Episode> {
  [2022, 2023, 2024]
    .into_iter()
    .map(|year| Episode {
      entity_id:   "arsenal".into(),
      category:    "crm".into(),
      observed_at: at(year, 9, 1, 0),
    })
    .collect()
}

#[tokio::test]
async fn duplicate_episodes_are_ignored() {
  let s = store().await;
  assert_eq!(s.record_episodes(history()).await.unwrap(), 3);
  assert_eq!(s.record_episodes(history()).await.unwrap(), 0);
  assert_eq!(s.list_episodes().await.unwrap(), history());
}

#[tokio::test]
async fn priors_round_trip_and_replace() {
  let s = store().await;
  let now = at(2025, 9, 1, 12);
  let records = PriorBuilder::new(3).build(&history(), now);
  assert_eq!(records.len(), 3);
  s.replace_priors(records.clone()).await.unwrap();

  for record in &records {
    let fetched = s.get_prior(record.key.clone()).await.unwrap().unwrap();
    assert_eq!(&fetched, record);
  }

  // A rebuild drops rows that no longer qualify.
  s.replace_priors(vec![records[2].clone()]).await.unwrap();
  let exact = PriorKey::Exact {
    entity_id: "arsenal".into(),
    category:  "crm".into(),
  };
  assert!(s.get_prior(exact).await.unwrap().is_none());
  assert!(s.get_prior(PriorKey::Global).await.unwrap().is_some());
}

#[tokio::test]
async fn pipeline_resolves_priors_from_sqlite() {
  let s = store().await;
  let now = at(2025, 9, 1, 12);
  s.replace_priors(PriorBuilder::new(3).build(&history(), now))
    .await
    .unwrap();

  let pipeline = Pipeline::new(&PipelineConfig::default(), s.clone()).unwrap();
  let prior = pipeline.resolver().resolve("chelsea", "crm").await;
  assert_eq!(prior.backoff_level, BackoffLevel::Cluster);
  assert_eq!(prior.sample_count, 3);
}

// ─── Alerts ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn outbox_returns_due_alerts_and_marks_delivery() {
  let s = store().await;
  let now = at(2025, 9, 1, 12);

  let urgent = opportunity("arsenal", PriorityTier::Tier1, now);
  let digest = opportunity("chelsea", PriorityTier::Tier3, now);
  s.record_opportunity(urgent.clone()).await.unwrap();
  s.record_opportunity(digest.clone()).await.unwrap();

  let mut alerts = AlertRouter.route(&urgent, now);
  alerts.extend(AlertRouter.route(&digest, now));
  assert_eq!(alerts.len(), 6);
  s.enqueue_alerts(alerts).await.unwrap();

  let due = s.due_alerts(now).await.unwrap();
  assert_eq!(due.len(), 4);
  assert!(due.iter().all(|a| a.opportunity_id == urgent.opportunity_id));

  // The daily digest falls due at 09:00 the next day.
  let tomorrow = s.due_alerts(at(2025, 9, 2, 9)).await.unwrap();
  assert_eq!(tomorrow.len(), 6);

  assert!(s.mark_delivered(due[0].alert_id, now).await.unwrap());
  assert!(!s.mark_delivered(due[0].alert_id, now).await.unwrap());
  assert_eq!(s.due_alerts(now).await.unwrap().len(), 3);
}
