//! One evaluation, end to end.
//!
//! ```text
//! evidence ─► matcher ─► scorer ─► gate ─► fit ─► tier ─► opportunity ─► alerts
//!                    └─► reasons ──────────┘
//! prior (resolved once) ─► thresholds ─► gate
//! ```
//!
//! The prior lookup is the only I/O. Everything after it is a pure function
//! of the request, the prior and `as_of`, exposed as [`Pipeline::score`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  Result,
  alert::{Alert, AlertRouter, PriorityTier, TierPolicy},
  confidence::{ConfidenceScorer, ConfidenceState, FoldStep},
  config::{PipelineConfig, ScoringConfig},
  decision::{DecisionGate, GateOutcome, ThresholdAdjustment},
  evidence::normalize_batch,
  fit::{EntityProfile, FitBreakdown, FitCriteria},
  matcher::PatternMatcher,
  opportunity::Opportunity,
  reason::{ReasonAnalyzer, ReasonProfile},
  rules::RuleSet,
  signal::SignalCandidate,
  store::{OpportunityStore, PriorStore},
  temporal::{PriorResolver, TemporalPrior},
};

/// A request to score one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
  pub entity_id:   String,
  #[serde(default)]
  pub entity_name: Option<String>,
  /// Procurement category, used for the prior lookup and the opportunity.
  pub category:    String,
  #[serde(default)]
  pub profile:     EntityProfile,
  /// Raw collaborator payloads; see [`normalize`](crate::evidence::normalize).
  #[serde(default)]
  pub evidence:    Vec<Value>,
}

/// Everything computed for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
  pub entity_id:      String,
  pub category:       String,
  /// Evidence items that survived normalization.
  pub evidence_count: usize,
  pub candidates:     Vec<SignalCandidate>,
  pub confidence:     ConfidenceState,
  pub trace:          Vec<FoldStep>,
  pub prior:          TemporalPrior,
  pub thresholds:     ThresholdAdjustment,
  pub reasons:        ReasonProfile,
  pub outcome:        GateOutcome,
  pub fit:            FitBreakdown,
  pub priority_tier:  PriorityTier,
  pub opportunity:    Option<Opportunity>,
  pub alerts:         Vec<Alert>,
  pub evaluated_at:   DateTime<Utc>,
}

impl Evaluation {
  /// Persist the opportunity (if any) together with its alerts.
  pub async fn record<S: OpportunityStore>(&self, store: &S) -> Result<bool, S::Error> {
    let Some(opportunity) = &self.opportunity else {
      return Ok(false);
    };
    store
      .record_with_alerts(opportunity.clone(), self.alerts.clone())
      .await?;
    tracing::info!(
      opportunity_id = %opportunity.opportunity_id,
      entity_id = %opportunity.entity_id,
      tier = %opportunity.priority_tier,
      alerts = self.alerts.len(),
      "recorded opportunity"
    );
    Ok(true)
  }
}

#[derive(Debug)]
pub struct Pipeline<P> {
  scoring:  ScoringConfig,
  matcher:  PatternMatcher,
  scorer:   ConfidenceScorer,
  analyzer: ReasonAnalyzer,
  fit:      FitCriteria,
  tiers:    TierPolicy,
  router:   AlertRouter,
  resolver: PriorResolver<P>,
}

impl<P: PriorStore> Pipeline<P> {
  /// Validate `config`, compile its rules, and bind the prior store.
  pub fn new(config: &PipelineConfig, priors: P) -> Result<Self> {
    let scoring = config.scoring.clone();
    scoring.validate()?;
    config.fit.validate()?;
    config.tiers.validate()?;

    let rules = RuleSet::compile(&config.rules)?;
    tracing::debug!(rules = rules.len(), "compiled rule table");

    Ok(Self {
      matcher: PatternMatcher::new(rules, scoring.unverifiable_delta),
      scorer: ConfidenceScorer::new(scoring.base_confidence, scoring.recency_window_days),
      analyzer: ReasonAnalyzer::new(config.reasons.clone())?,
      fit: config.fit.clone(),
      tiers: config.tiers.clone(),
      router: AlertRouter,
      resolver: PriorResolver::new(priors, scoring.min_prior_samples),
      scoring,
    })
  }

  pub fn scoring(&self) -> &ScoringConfig { &self.scoring }

  pub fn resolver(&self) -> &PriorResolver<P> { &self.resolver }

  /// Resolve the prior for the request, then score it.
  pub async fn evaluate(&self, request: &EvaluationRequest, as_of: DateTime<Utc>) -> Evaluation {
    let prior = self
      .resolver
      .resolve(&request.entity_id, &request.category)
      .await;
    self.score(request, prior, as_of)
  }

  /// Score a request against an already resolved prior.
  pub fn score(
    &self,
    request: &EvaluationRequest,
    prior: TemporalPrior,
    as_of: DateTime<Utc>,
  ) -> Evaluation {
    let entity_id = request.entity_id.as_str();

    // The multiplier is fixed here and used for both thresholds and the
    // final confidence.
    let thresholds = ThresholdAdjustment::new(self.scoring.thresholds(), prior.multiplier);
    let gate = DecisionGate::new(thresholds);

    let items = normalize_batch(&request.evidence, self.scoring.max_evidence_items);
    let candidates = self.matcher.match_all(entity_id, &items);
    let (confidence, trace) = self.scorer.fold(entity_id, &candidates, as_of);
    let reasons = self.analyzer.analyze(entity_id, &items, &candidates);
    let outcome = gate.decide(&confidence);
    let fit = self.fit.score(&request.profile, &reasons);
    let priority_tier = self.tiers.classify(outcome.final_confidence, fit.fit_score);

    let opportunity = match outcome.decision {
      Some(decision) if outcome.emits_opportunity() => Some(Opportunity {
        opportunity_id: Uuid::new_v4(),
        entity_id: entity_id.to_owned(),
        entity_name: request.entity_name.clone(),
        category: request.category.clone(),
        final_confidence: outcome.final_confidence,
        decision,
        actionable: outcome.actionable,
        priority_tier,
        fit_score: fit.fit_score,
        primary_reason: reasons.primary_reason,
        urgency: reasons.urgency_level,
        created_at: as_of,
      }),
      _ => None,
    };

    let alerts = opportunity
      .as_ref()
      .map(|o| self.router.route(o, as_of))
      .unwrap_or_default();

    tracing::debug!(
      entity_id,
      category = %request.category,
      evidence = items.len(),
      signals = candidates.len(),
      accumulated = confidence.accumulated_confidence,
      multiplier = prior.multiplier,
      backoff = prior.backoff_level.as_str(),
      final_confidence = outcome.final_confidence,
      decision = ?outcome.decision,
      actionable = outcome.actionable,
      "evaluated entity"
    );

    Evaluation {
      entity_id: entity_id.to_owned(),
      category: request.category.clone(),
      evidence_count: items.len(),
      candidates,
      confidence,
      trace,
      prior,
      thresholds,
      reasons,
      outcome,
      fit,
      priority_tier,
      opportunity,
      alerts,
      evaluated_at: as_of,
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;
  use crate::{
    signal::DecisionTag,
    store::InMemoryPriorStore,
    temporal::BackoffLevel,
  };

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap() }

  fn pipeline() -> Pipeline<InMemoryPriorStore> {
    Pipeline::new(&PipelineConfig::default(), InMemoryPriorStore::default()).unwrap()
  }

  fn request(evidence: Vec<Value>) -> EvaluationRequest {
    EvaluationRequest {
      entity_id: "arsenal".into(),
      entity_name: Some("Arsenal FC".into()),
      category: "crm".into(),
      profile: EntityProfile::default(),
      evidence,
    }
  }

  #[test]
  fn invalid_config_is_refused() {
    let mut config = PipelineConfig::default();
    config.fit.service_weight = 0;
    assert!(Pipeline::new(&config, InMemoryPriorStore::default()).is_err());
  }

  #[tokio::test]
  async fn empty_request_has_no_opportunity() {
    let eval = pipeline().evaluate(&request(vec![]), now()).await;
    assert_eq!(eval.confidence.accumulated_confidence, 0.70);
    assert_eq!(eval.outcome.decision, None);
    assert!(eval.opportunity.is_none());
    assert!(eval.alerts.is_empty());
    assert_eq!(eval.prior.backoff_level, BackoffLevel::Neutral);
  }

  #[tokio::test]
  async fn unrecognised_payloads_are_skipped() {
    let eval = pipeline()
      .evaluate(
        &request(vec![json!(42), json!({"content": "RFP issued for ticketing"})]),
        now(),
      )
      .await;
    assert_eq!(eval.evidence_count, 1);
    assert_eq!(eval.outcome.decision, Some(DecisionTag::Accept));
  }

  #[test]
  fn prior_scales_final_confidence() {
    let p = pipeline();
    let req = request(vec![json!({"content": "RFP issued for ticketing"})]);
    let mut prior = TemporalPrior::neutral("arsenal", "crm");
    prior.multiplier = 0.75;
    prior.backoff_level = BackoffLevel::Global;

    let eval = p.score(&req, prior, now());
    // 0.85 × 0.75
    assert!((eval.outcome.final_confidence - 0.6375).abs() < 1e-9);
    assert_eq!(eval.thresholds.multiplier, 0.75);
    assert_eq!(eval.outcome.decision, Some(DecisionTag::Reject));
    assert!(eval.opportunity.is_none());
  }

  #[test]
  fn weak_accept_is_persisted_but_not_alerted() {
    let p = pipeline();
    let req = request(vec![json!({"content": "RFP issued for ticketing"})]);
    let mut prior = TemporalPrior::neutral("arsenal", "crm");
    prior.multiplier = 0.80;

    let eval = p.score(&req, prior, now());
    // 0.85 × 0.80 = 0.68; weak bar 0.625, accept bar 0.875.
    assert_eq!(eval.outcome.decision, Some(DecisionTag::WeakAccept));
    let opp = eval.opportunity.as_ref().unwrap();
    assert!(!opp.actionable);
    assert!(eval.alerts.is_empty());
  }
}
