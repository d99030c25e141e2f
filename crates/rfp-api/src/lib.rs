//! JSON REST API for the RFP pipeline.
//!
//! Exposes an axum [`Router`] backed by any store implementing the
//! `rfp-core` storage traits. Auth, TLS, and transport concerns are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", rfp_api::api_router(state))
//! ```

pub mod error;
pub mod evaluate;
pub mod opportunities;
pub mod priors;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use rfp_core::{
  Pipeline,
  config::PipelineConfig,
  store::{AlertOutbox, OpportunityStore, PriorStore},
};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

/// Everything the API needs from a storage backend.
pub trait Backend: PriorStore + OpportunityStore + AlertOutbox + 'static {}

impl<T> Backend for T where T: PriorStore + OpportunityStore + AlertOutbox + 'static {}

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub pipeline: Arc<Pipeline<Arc<S>>>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      pipeline: self.pipeline.clone(),
    }
  }
}

impl<S: Backend> AppState<S> {
  /// Build the pipeline from `config`, reading priors from `store`.
  pub fn new(store: Arc<S>, config: &PipelineConfig) -> rfp_core::Result<Self> {
    let pipeline = Pipeline::new(config, store.clone())?;
    Ok(Self {
      store,
      pipeline: Arc::new(pipeline),
    })
  }
}

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S: Backend>(state: AppState<S>) -> Router<()> {
  Router::new()
    .route("/evaluate", post(evaluate::handler::<S>))
    .route("/opportunities", get(opportunities::list::<S>))
    .route("/opportunities/{id}", get(opportunities::get_one::<S>))
    .route("/priors/{entity_id}/{category}", get(priors::get_one::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
  };
  use chrono::{TimeZone, Utc};
  use rfp_core::{
    store::EpisodeStore,
    temporal::{Episode, PriorBuilder},
  };
  use rfp_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  use super::*;

  async fn make_state() -> AppState<SqliteStore> {
    let store = SqliteStore::open_in_memory().await.unwrap();
    AppState::new(Arc::new(store), &PipelineConfig::default()).unwrap()
  }

  async fn send(
    state: AppState<SqliteStore>,
    method: &str,
    uri: &str,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = api_router(state)
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
  }

  fn arsenal_request() -> Value {
    json!({
      "entity_id": "arsenal",
      "entity_name": "Arsenal FC",
      "category": "crm",
      "profile": { "country": "UK", "org_size": "elite", "estimated_budget": 750000.0 },
      "evidence": [
        { "text": "NTT Data multi-year partnership for digital transformation",
          "url": "https://www.arsenal.com/news" },
        { "text": "Arsenal deploys customer experience systems (July 2025)",
          "url": "https://www.arsenal.com/news" },
        "John Maguire - Head of Operational Technology",
        42
      ]
    })
  }

  #[tokio::test]
  async fn evaluate_persists_actionable_opportunity() {
    let state = make_state().await;
    let (status, body) = send(state.clone(), "POST", "/evaluate", Some(arsenal_request())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["evidence_count"], 3);
    assert_eq!(body["outcome"]["decision"], "ACCEPT");
    assert_eq!(body["outcome"]["actionable"], true);

    let id = body["opportunity"]["opportunity_id"].as_str().unwrap().to_owned();
    let (status, fetched) = send(state.clone(), "GET", &format!("/opportunities/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["entity_name"], "Arsenal FC");
    assert_eq!(fetched["priority_tier"], body["priority_tier"]);

    let due = state.store.due_alerts(Utc::now()).await.unwrap();
    assert!(!due.is_empty());
  }

  #[tokio::test]
  async fn evaluate_without_hard_positive_persists_nothing() {
    let state = make_state().await;
    let request = json!({
      "entity_id": "chelsea",
      "category": "crm",
      "evidence": ["Chelsea is hiring a Head of Digital"]
    });
    let (status, body) = send(state.clone(), "POST", "/evaluate", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"]["decision"], Value::Null);
    assert_eq!(body["opportunity"], Value::Null);

    let (_, list) = send(state, "GET", "/opportunities", None).await;
    assert_eq!(list, json!([]));
  }

  #[tokio::test]
  async fn evaluate_rejects_blank_entity() {
    let state = make_state().await;
    let (status, body) = send(
      state,
      "POST",
      "/evaluate",
      Some(json!({ "entity_id": " ", "category": "crm" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("entity_id"));
  }

  #[tokio::test]
  async fn list_filters_by_entity() {
    let state = make_state().await;
    send(state.clone(), "POST", "/evaluate", Some(arsenal_request())).await;
    let mut other = arsenal_request();
    other["entity_id"] = json!("spurs");
    send(state.clone(), "POST", "/evaluate", Some(other)).await;

    let (status, all) = send(state.clone(), "GET", "/opportunities", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 2);

    let (_, spurs) = send(state, "GET", "/opportunities?entity_id=spurs&actionable=true", None).await;
    let spurs = spurs.as_array().unwrap();
    assert_eq!(spurs.len(), 1);
    assert_eq!(spurs[0]["entity_id"], "spurs");
  }

  #[tokio::test]
  async fn unknown_opportunity_is_404() {
    let state = make_state().await;
    let (status, body) = send(
      state,
      "GET",
      "/opportunities/00000000-0000-0000-0000-000000000000",
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
  }

  #[tokio::test]
  async fn priors_report_backoff_level() {
    let state = make_state().await;
    let (status, body) = send(state.clone(), "GET", "/priors/arsenal/crm", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backoff_level"], "neutral");
    assert_eq!(body["multiplier"], 1.0);

    let history: Vec<Episode> = [2022, 2023, 2024]
      .into_iter()
      .map(|year| Episode {
        entity_id:   "arsenal".into(),
        category:    "crm".into(),
        observed_at: Utc.with_ymd_and_hms(year, 9, 1, 0, 0, 0).unwrap(),
      })
      .collect();
    let records = PriorBuilder::new(3).build(&history, Utc::now());
    state.store.replace_priors(records).await.unwrap();

    let (_, body) = send(state, "GET", "/priors/arsenal/crm", None).await;
    assert_eq!(body["backoff_level"], "exact");
    assert_eq!(body["sample_count"], 3);
  }
}
