//! Referral entry-link tracking.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use document_store::DocumentStore;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ClickResponse {
    pub affiliate_id: String,
    pub click_count: u64,
}

/// POST /referrals/{code}/clicks: counts one visit through an entry link.
#[tracing::instrument(skip(state))]
pub async fn click<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(code): Path<String>,
) -> Result<Json<ClickResponse>, ApiError> {
    let resolved = state
        .affiliates
        .record_click(&code)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Referral code {code} not found")))?;

    Ok(Json(ClickResponse {
        affiliate_id: resolved.id.to_string(),
        click_count: resolved.affiliate.click_count,
    }))
}
