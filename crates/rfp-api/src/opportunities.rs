//! Handlers for `/opportunities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/opportunities` | `?entity_id`, `?category`, `?actionable`, `?tier`, `?limit`, `?offset` |
//! | `GET`  | `/opportunities/{id}` | 404 if not found |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use rfp_core::{Opportunity, opportunity::OpportunityQuery, store::OpportunityStore};
use uuid::Uuid;

use crate::{AppState, Backend, error::ApiError};

/// Largest page a client may request.
const MAX_LIMIT: usize = 500;

/// `GET /opportunities`
pub async fn list<S: Backend>(
  State(state): State<AppState<S>>,
  Query(mut query): Query<OpportunityQuery>,
) -> Result<Json<Vec<Opportunity>>, ApiError> {
  query.limit = query.limit.map(|l| l.min(MAX_LIMIT));
  let opportunities = state
    .store
    .list_opportunities(query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(opportunities))
}

/// `GET /opportunities/{id}`
pub async fn get_one<S: Backend>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Opportunity>, ApiError> {
  state
    .store
    .get_opportunity(id)
    .await
    .map_err(ApiError::store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("opportunity {id}")))
}
