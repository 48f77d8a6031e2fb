//! Order history for a buyer.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use document_store::{DocumentId, DocumentQuery, DocumentStore, DocumentStoreExt, collections};
use serde::Serialize;
use storefront::{FulfillmentStatus, Order, OrderLine, PaymentMethod, PaymentStatus};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub buyer_name: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub affiliate_id: Option<String>,
    pub commission_cents: Option<i64>,
    pub settled: bool,
    /// Line keys that could not be fulfilled from stock.
    pub shortfalls: Vec<String>,
    pub created_at: String,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub name: String,
    pub size: String,
    pub color: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

impl From<&OrderLine> for OrderItemResponse {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id.to_string(),
            name: line.name.clone(),
            size: line.size.clone(),
            color: line.color.clone(),
            quantity: line.quantity,
            unit_price_cents: line.unit_price.cents(),
        }
    }
}

impl OrderResponse {
    fn new(id: DocumentId, order: Order) -> Self {
        Self {
            id: id.to_string(),
            buyer_name: order.buyer_name,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            fulfillment_status: order.fulfillment_status,
            items: order.line_items.iter().map(OrderItemResponse::from).collect(),
            total_cents: order.total.cents(),
            affiliate_id: order.affiliate_id.map(|id| id.to_string()),
            commission_cents: order.commission_amount.map(|c| c.cents()),
            settled: order.settlement.completed,
            shortfalls: order.settlement.shortfalls,
            created_at: order.created_at.to_rfc3339(),
        }
    }
}

/// GET /buyers/{id}/orders: the buyer's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn orders<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let buyer_id = DocumentId::new(id.trim());
    if buyer_id.is_empty() {
        return Err(ApiError::BadRequest("Buyer id must not be empty".to_string()));
    }

    let query = DocumentQuery::collection(collections::ORDERS)
        .where_eq("buyerId", buyer_id.as_str())
        .newest_first();
    let orders = state.store.query_as::<Order>(query).await?;

    Ok(Json(
        orders
            .into_iter()
            .map(|(id, order)| OrderResponse::new(id, order))
            .collect(),
    ))
}
