//! Post-commit settlement of an order.
//!
//! Settlement is driven entirely by the markers stored on the order, so it
//! can be resumed by anyone (the coordinator right after the commit, or the
//! reconciler later) and rerun any number of times. The affiliate credit and
//! each stock decrement also leave a marker on their own document in the same
//! atomic update, so a crash between an effect and its order marker never
//! applies the effect twice. Once every effect is recorded on the order
//! those markers are removed again, so the affiliate and product documents
//! only carry markers for orders still being settled.

use document_store::{
    DocumentStore, DocumentStoreExt, DocumentUpdate, StoreError, collections, update::lookup,
};
use serde::{Deserialize, Serialize};
use storefront::{
    Affiliate, AffiliateId, Commission, FulfillmentStatus, LineKey, Money, Order, OrderId,
    OrderLine, Product, Settlement,
};
use tracing::{debug, info, instrument, warn};

use crate::config::RetryPolicy;

/// How settlement ended for the checkout that committed the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Every effect has been applied. Lines listed in `shortfalls` found
    /// their stock exhausted and the order is backordered.
    Completed { shortfalls: Vec<LineKey> },
    /// Retries ran out; the reconciler will finish the work.
    Deferred { attempts: u32, last_error: String },
}

impl SettlementStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, SettlementStatus::Completed { .. })
    }
}

/// Result of one settlement pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub order_id: OrderId,
    /// Lines whose stock was exhausted.
    pub shortfalls: Vec<LineKey>,
    /// True if the order had already been fully settled before this pass.
    pub already_completed: bool,
}

enum StockEffect {
    Decremented,
    Exhausted,
}

/// Applies the post-commit effects of an order.
#[derive(Debug, Clone)]
pub struct Settler<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: DocumentStore> Settler<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Runs one settlement pass over `order_id`, doing only the steps its
    /// markers say are outstanding.
    #[instrument(skip(self))]
    pub async fn settle(&self, order_id: &OrderId) -> Result<SettlementOutcome, StoreError> {
        let order: Order = self
            .store
            .get_as(collections::ORDERS, order_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                collection: collections::ORDERS.to_string(),
                id: order_id.clone(),
            })?;

        let mut shortfalls = recorded_shortfalls(&order);
        if order.settlement.completed {
            return Ok(SettlementOutcome {
                order_id: order_id.clone(),
                shortfalls,
                already_completed: true,
            });
        }

        if !order.settlement.effects_applied {
            if let (Some(affiliate_id), Some(amount)) =
                (&order.affiliate_id, order.commission_amount)
            {
                if !order.settlement.commission_recorded {
                    self.record_commission(order_id, affiliate_id, amount).await?;
                }
                if !order.settlement.affiliate_credited {
                    self.credit_affiliate(order_id, affiliate_id, amount).await?;
                }
            }

            for line in &order.line_items {
                let key = line.key();
                if order.settlement.is_line_settled(&key) {
                    continue;
                }
                match self.decrement_stock(order_id, line).await? {
                    StockEffect::Decremented => {
                        let update = DocumentUpdate::new()
                            .array_union(Settlement::STOCK_SETTLED, key.to_string());
                        self.mark(order_id, update).await?;
                    }
                    StockEffect::Exhausted => {
                        warn!(
                            %order_id,
                            line = %key,
                            quantity = line.quantity,
                            "stock exhausted, order backordered"
                        );
                        self.mark(
                            order_id,
                            DocumentUpdate::new()
                                .array_union(Settlement::SHORTFALLS, key.to_string())
                                .set(
                                    Order::FULFILLMENT_STATUS,
                                    FulfillmentStatus::Backordered.as_str(),
                                ),
                        )
                        .await?;
                        shortfalls.push(key);
                    }
                }
            }

            self.mark(
                order_id,
                DocumentUpdate::new().set(Settlement::EFFECTS_APPLIED, true),
            )
            .await?;
        }

        self.release_markers(order_id, &order).await?;
        self.mark(order_id, DocumentUpdate::new().set(Settlement::COMPLETED, true))
            .await?;
        info!(%order_id, shortfalls = shortfalls.len(), "order settled");

        Ok(SettlementOutcome {
            order_id: order_id.clone(),
            shortfalls,
            already_completed: false,
        })
    }

    /// Settles with exponential backoff on transient store errors.
    ///
    /// Never fails: when retries run out the work is reported as deferred.
    #[instrument(skip(self))]
    pub async fn settle_with_retry(&self, order_id: &OrderId) -> SettlementStatus {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.settle(order_id).await {
                Ok(outcome) => {
                    return SettlementStatus::Completed {
                        shortfalls: outcome.shortfalls,
                    };
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(%order_id, attempt, ?backoff, error = %e, "settlement failed, retrying");
                    metrics::counter!("settlement_retries_total").increment(1);
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    return SettlementStatus::Deferred {
                        attempts: attempt,
                        last_error: e.to_string(),
                    };
                }
            }
        }
    }

    async fn record_commission(
        &self,
        order_id: &OrderId,
        affiliate_id: &AffiliateId,
        amount: Money,
    ) -> Result<(), StoreError> {
        let commission = Commission::pending(order_id.clone(), affiliate_id.clone(), amount);
        match self
            .store
            .create_from(collections::COMMISSIONS, Some(order_id.clone()), &commission)
            .await
        {
            Ok(_) => debug!(%order_id, %amount, "commission recorded"),
            Err(StoreError::AlreadyExists { .. }) => {
                debug!(%order_id, "commission already recorded");
            }
            Err(e) => return Err(e),
        }
        self.mark(
            order_id,
            DocumentUpdate::new().set(Settlement::COMMISSION_RECORDED, true),
        )
        .await
    }

    async fn credit_affiliate(
        &self,
        order_id: &OrderId,
        affiliate_id: &AffiliateId,
        amount: Money,
    ) -> Result<(), StoreError> {
        let update = DocumentUpdate::new()
            .require_absent(Affiliate::CREDITED_ORDERS, order_id.as_str())
            .increment(Affiliate::BALANCE, amount.cents())
            .increment(Affiliate::SALE_COUNT, 1)
            .array_union(Affiliate::CREDITED_ORDERS, order_id.as_str());

        match self
            .store
            .update(collections::AFFILIATES, affiliate_id, update)
            .await
        {
            Ok(_) => debug!(%order_id, %affiliate_id, %amount, "affiliate credited"),
            Err(StoreError::ConditionFailed { .. }) => {
                debug!(%order_id, %affiliate_id, "affiliate already credited");
            }
            Err(StoreError::NotFound { .. }) => {
                warn!(
                    %order_id,
                    %affiliate_id,
                    %amount,
                    "affiliate no longer exists, credit skipped"
                );
            }
            Err(e) => return Err(e),
        }
        self.mark(
            order_id,
            DocumentUpdate::new().set(Settlement::AFFILIATE_CREDITED, true),
        )
        .await
    }

    async fn decrement_stock(
        &self,
        order_id: &OrderId,
        line: &OrderLine,
    ) -> Result<StockEffect, StoreError> {
        let marker = stock_marker(order_id, line);
        let quantity = i64::from(line.quantity);
        let update = DocumentUpdate::new()
            .require_absent(Product::SETTLED_LINES, marker.as_str())
            .require_at_least(Product::STOCK, quantity)
            .increment(Product::STOCK, -quantity)
            .array_union(Product::SETTLED_LINES, marker.as_str());

        match self
            .store
            .update(collections::PRODUCTS, &line.product_id, update)
            .await
        {
            Ok(_) => Ok(StockEffect::Decremented),
            Err(StoreError::ConditionFailed { .. }) => {
                // Either an earlier pass already applied it or stock ran out.
                let applied = self
                    .store
                    .get(collections::PRODUCTS, &line.product_id)
                    .await?
                    .and_then(|doc| {
                        lookup(&doc.body, Product::SETTLED_LINES)
                            .and_then(|v| v.as_array())
                            .map(|items| items.iter().any(|v| v.as_str() == Some(marker.as_str())))
                    })
                    .unwrap_or(false);
                Ok(if applied {
                    StockEffect::Decremented
                } else {
                    StockEffect::Exhausted
                })
            }
            Err(StoreError::NotFound { .. }) => {
                warn!(%order_id, product_id = %line.product_id, "product no longer exists");
                Ok(StockEffect::Exhausted)
            }
            Err(e) => Err(e),
        }
    }

    /// Drops this order's idempotency markers from the affiliate and product
    /// documents so they do not grow with every sale. Only runs once all
    /// effects are recorded on the order.
    async fn release_markers(&self, order_id: &OrderId, order: &Order) -> Result<(), StoreError> {
        if let Some(affiliate_id) = &order.affiliate_id {
            let update =
                DocumentUpdate::new().array_remove(Affiliate::CREDITED_ORDERS, order_id.as_str());
            ignore_missing(
                self.store
                    .update(collections::AFFILIATES, affiliate_id, update)
                    .await,
            )?;
        }
        for line in &order.line_items {
            let update = DocumentUpdate::new()
                .array_remove(Product::SETTLED_LINES, stock_marker(order_id, line));
            ignore_missing(
                self.store
                    .update(collections::PRODUCTS, &line.product_id, update)
                    .await,
            )?;
        }
        Ok(())
    }

    async fn mark(&self, order_id: &OrderId, update: DocumentUpdate) -> Result<(), StoreError> {
        self.store
            .update(collections::ORDERS, order_id, update)
            .await
            .map(|_| ())
    }
}

fn stock_marker(order_id: &OrderId, line: &OrderLine) -> String {
    format!("{order_id}|{}", line.key())
}

fn ignore_missing<T>(result: Result<T, StoreError>) -> Result<(), StoreError> {
    match result {
        Ok(_) | Err(StoreError::NotFound { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

fn recorded_shortfalls(order: &Order) -> Vec<LineKey> {
    order
        .line_items
        .iter()
        .map(OrderLine::key)
        .filter(|key| order.settlement.shortfalls.contains(&key.to_string()))
        .collect()
}
