//! Affiliate ledger endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use document_store::{DocumentId, DocumentQuery, DocumentStore, DocumentStoreExt, collections};
use serde::Serialize;
use storefront::{Affiliate, Commission, CommissionStatus, Money};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct AffiliateResponse {
    pub id: String,
    pub name: String,
    pub referral_code: String,
    pub commission_percent: u32,
    pub balance_cents: i64,
    pub sale_count: u64,
    pub click_count: u64,
    /// Sum of commissions not yet paid out.
    pub pending_cents: i64,
    pub commissions: Vec<CommissionResponse>,
}

#[derive(Serialize)]
pub struct CommissionResponse {
    pub order_id: String,
    pub amount_cents: i64,
    pub status: CommissionStatus,
    pub created_at: String,
}

impl From<Commission> for CommissionResponse {
    fn from(commission: Commission) -> Self {
        Self {
            order_id: commission.order_id.to_string(),
            amount_cents: commission.amount.cents(),
            status: commission.status,
            created_at: commission.created_at.to_rfc3339(),
        }
    }
}

/// GET /affiliates/{id}: ledger counters plus commissions, newest first.
#[tracing::instrument(skip(state))]
pub async fn get<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<AffiliateResponse>, ApiError> {
    let affiliate_id = DocumentId::new(id.trim());
    if affiliate_id.is_empty() {
        return Err(ApiError::BadRequest("Affiliate id must not be empty".to_string()));
    }

    let affiliate: Affiliate = state
        .store
        .get_as(collections::AFFILIATES, &affiliate_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Affiliate {affiliate_id} not found")))?;

    let query = DocumentQuery::collection(collections::COMMISSIONS)
        .where_eq("affiliateId", affiliate_id.as_str())
        .newest_first();
    let commissions: Vec<Commission> = state
        .store
        .query_as::<Commission>(query)
        .await?
        .into_iter()
        .map(|(_, commission)| commission)
        .collect();

    let pending: Money = commissions
        .iter()
        .filter(|c| c.status == CommissionStatus::Pending)
        .map(|c| c.amount)
        .sum();

    Ok(Json(AffiliateResponse {
        id: affiliate_id.to_string(),
        commission_percent: affiliate.commission_percent(),
        name: affiliate.name,
        referral_code: affiliate.referral_code,
        balance_cents: affiliate.balance.cents(),
        sale_count: affiliate.sale_count,
        click_count: affiliate.click_count,
        pending_cents: pending.cents(),
        commissions: commissions.into_iter().map(CommissionResponse::from).collect(),
    }))
}
