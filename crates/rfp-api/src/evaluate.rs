//! Handler for `POST /evaluate`.
//!
//! Body: an [`EvaluationRequest`] with raw evidence payloads. Runs the
//! pipeline, persists any opportunity with its alerts, and returns the full
//! [`Evaluation`].

use axum::{Json, extract::State};
use chrono::Utc;
use rfp_core::pipeline::{Evaluation, EvaluationRequest};

use crate::{AppState, Backend, error::ApiError};

pub async fn handler<S: Backend>(
  State(state): State<AppState<S>>,
  Json(request): Json<EvaluationRequest>,
) -> Result<Json<Evaluation>, ApiError> {
  if request.entity_id.trim().is_empty() {
    return Err(ApiError::BadRequest("entity_id must not be empty".into()));
  }
  if request.category.trim().is_empty() {
    return Err(ApiError::BadRequest("category must not be empty".into()));
  }

  let evaluation = state.pipeline.evaluate(&request, Utc::now()).await;
  evaluation
    .record(state.store.as_ref())
    .await
    .map_err(ApiError::store)?;

  Ok(Json(evaluation))
}
