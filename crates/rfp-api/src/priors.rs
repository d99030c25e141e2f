//! Handler for `GET /priors/{entity_id}/{category}`.
//!
//! Returns the prior scoring would use right now, including which backoff
//! level supplied it. Never 404s: missing history resolves to neutral.

use axum::{
  Json,
  extract::{Path, State},
};
use rfp_core::temporal::TemporalPrior;

use crate::{AppState, Backend};

pub async fn get_one<S: Backend>(
  State(state): State<AppState<S>>,
  Path((entity_id, category)): Path<(String, String)>,
) -> Json<TemporalPrior> {
  Json(state.pipeline.resolver().resolve(&entity_id, &category).await)
}
