//! Manual trigger for a reconciliation pass.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use checkout::ReconciliationReport;
use document_store::DocumentStore;

use crate::error::ApiError;
use crate::state::AppState;

/// POST /reconciliation: settles every order left unsettled and reports
/// the counts.
#[tracing::instrument(skip(state))]
pub async fn run<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<ReconciliationReport>, ApiError> {
    let report = state.reconciler.run_once().await?;
    Ok(Json(report))
}
