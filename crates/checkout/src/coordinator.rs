//! Checkout coordinator: runs one checkout attempt end to end.

use std::collections::BTreeMap;
use std::time::Instant;

use document_store::{DocumentStore, DocumentStoreExt, collections};
use serde::Serialize;
use storefront::{
    AffiliateId, AffiliateResolver, BuyerId, CartLedger, CartLine, LocalStore, Money, Order,
    OrderId, OrderLine, PaymentMethod, Product, ProductId, ReferralTracker, ShippingDetails,
    UserProfile,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::attempt::CheckoutAttempt;
use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, Result};
use crate::events::CheckoutEvent;
use crate::services::payment::PaymentGateway;
use crate::settler::{SettlementStatus, Settler};
use crate::state::CheckoutState;

/// Input collected by the checkout form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// The signed-in buyer, if any.
    pub buyer_id: Option<BuyerId>,
    pub shipping: ShippingDetails,
    pub payment_method: PaymentMethod,
}

impl CheckoutRequest {
    pub fn new(buyer_id: Option<BuyerId>, shipping: ShippingDetails) -> Self {
        Self {
            buyer_id,
            shipping,
            payment_method: PaymentMethod::default(),
        }
    }

    pub fn with_payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }
}

/// Result of a committed checkout.
///
/// A receipt is returned whenever the order was created, even if
/// settlement had to be deferred.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckoutReceipt {
    pub attempt_id: Uuid,
    pub order_id: OrderId,
    pub total: Money,
    pub affiliate_id: Option<AffiliateId>,
    pub commission: Option<Money>,
    pub settlement: SettlementStatus,
    pub history: Vec<CheckoutEvent>,
}

struct Committed {
    order_id: OrderId,
    total: Money,
    affiliate_id: Option<AffiliateId>,
    commission: Option<Money>,
}

/// Orchestrates checkout attempts.
///
/// The coordinator itself holds no per-attempt state. Every call to
/// [`checkout`](Self::checkout) runs a fresh [`CheckoutAttempt`], and the
/// cart and referral tracker are borrowed mutably for its whole duration.
pub struct CheckoutCoordinator<S, P>
where
    S: DocumentStore + Clone,
    P: PaymentGateway,
{
    store: S,
    payment: P,
    resolver: AffiliateResolver<S>,
    settler: Settler<S>,
    config: CheckoutConfig,
}

impl<S, P> CheckoutCoordinator<S, P>
where
    S: DocumentStore + Clone,
    P: PaymentGateway,
{
    pub fn new(store: S, payment: P, config: CheckoutConfig) -> Self {
        Self {
            resolver: AffiliateResolver::new(store.clone()),
            settler: Settler::new(store.clone(), config.settlement_retry),
            store,
            payment,
            config,
        }
    }

    /// Returns the settler used after the commit point.
    pub fn settler(&self) -> &Settler<S> {
        &self.settler
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Turns the cart into a paid order.
    ///
    /// Errors are only returned before the order exists, and in that case
    /// the cart and the captured referral are left exactly as they were. Once
    /// the order exists the cart is cleared, the referral consumed, and a
    /// receipt returned.
    #[tracing::instrument(
        skip(self, cart, referral, request),
        fields(buyer_id = ?request.buyer_id, lines = cart.lines().len())
    )]
    pub async fn checkout<C, R>(
        &self,
        cart: &mut CartLedger<C>,
        referral: &mut ReferralTracker<R>,
        request: CheckoutRequest,
    ) -> Result<CheckoutReceipt>
    where
        C: LocalStore,
        R: LocalStore,
    {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = Instant::now();
        let mut attempt = CheckoutAttempt::new();

        let committed = match self.commit(&mut attempt, cart, referral, &request).await {
            Ok(committed) => committed,
            Err(e) => {
                if let Err(transition) = attempt.fail(&e) {
                    error!(attempt_id = %attempt.id(), error = %transition, "could not record failure");
                }
                metrics::counter!("checkout_failed_total", "reason" => e.reason()).increment(1);
                metrics::histogram!("checkout_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                warn!(
                    attempt_id = %attempt.id(),
                    kind = %e.kind(),
                    error = %e,
                    "checkout failed"
                );
                return Err(e);
            }
        };

        let receipt = self.finish(attempt, cart, referral, committed).await;

        let duration = started.elapsed().as_secs_f64();
        metrics::histogram!("checkout_duration_seconds").record(duration);
        metrics::counter!("checkout_succeeded_total").increment(1);
        info!(
            attempt_id = %receipt.attempt_id,
            order_id = %receipt.order_id,
            total = %receipt.total,
            duration,
            "checkout succeeded"
        );
        Ok(receipt)
    }

    /// Runs every step up to and including order creation.
    async fn commit<C, R>(
        &self,
        attempt: &mut CheckoutAttempt,
        cart: &CartLedger<C>,
        referral: &ReferralTracker<R>,
        request: &CheckoutRequest,
    ) -> Result<Committed>
    where
        C: LocalStore,
        R: LocalStore,
    {
        attempt.transition(CheckoutState::Validating)?;
        let (buyer_id, profile) = self.validate(cart, request).await?;
        let lines: Vec<OrderLine> = cart.lines().iter().map(OrderLine::from).collect();
        let total: Money = lines.iter().map(OrderLine::line_total).sum();

        attempt.transition(CheckoutState::Paying)?;
        let payment = self.pay(&buyer_id, total, request.payment_method).await?;
        attempt.record(CheckoutEvent::payment_authorized(payment, total));

        attempt.transition(CheckoutState::Attributing)?;
        let code = referral.peek()?;
        let resolved = match &code {
            Some(code) => self.resolver.resolve(code.as_str()).await?,
            None => None,
        };
        let commission = resolved.as_ref().map(|r| r.commission_on(total));
        let affiliate_id = resolved.map(|r| r.id);
        attempt.record(CheckoutEvent::affiliate_resolved(
            code.map(|c| c.as_str().to_string()),
            affiliate_id.clone(),
            commission,
        ));

        attempt.transition(CheckoutState::Persisting)?;
        let buyer_name = if profile.name.trim().is_empty() {
            request.shipping.name.clone()
        } else {
            profile.name.clone()
        };
        let mut order = Order::paid(
            buyer_id,
            buyer_name,
            request.shipping.clone(),
            request.payment_method,
            lines,
        );
        if !profile.email.trim().is_empty() {
            order.buyer_email = profile.email;
        }
        if let (Some(id), Some(amount)) = (&affiliate_id, commission) {
            order = order.with_affiliate(id.clone(), amount);
        }

        let order_id = OrderId::generate();
        self.store
            .create_from(collections::ORDERS, Some(order_id.clone()), &order)
            .await?;
        attempt.record(CheckoutEvent::order_committed(order_id.clone(), order.total));
        info!(attempt_id = %attempt.id(), %order_id, total = %order.total, "order committed");

        Ok(Committed {
            order_id,
            total: order.total,
            affiliate_id,
            commission,
        })
    }

    /// Post-commit steps. Nothing here is reported to the buyer as a failure.
    async fn finish<C, R>(
        &self,
        mut attempt: CheckoutAttempt,
        cart: &mut CartLedger<C>,
        referral: &mut ReferralTracker<R>,
        committed: Committed,
    ) -> CheckoutReceipt
    where
        C: LocalStore,
        R: LocalStore,
    {
        advance(&mut attempt, CheckoutState::Settling);
        let settlement = self.settler.settle_with_retry(&committed.order_id).await;
        if let SettlementStatus::Deferred {
            attempts,
            last_error,
        } = &settlement
        {
            metrics::counter!("settlement_deferred_total").increment(1);
            error!(
                order_id = %committed.order_id,
                attempts,
                error = %last_error,
                "settlement deferred to reconciliation"
            );
        }
        attempt.record(CheckoutEvent::settlement_reported(settlement.clone()));

        advance(&mut attempt, CheckoutState::Succeeded);
        if let Err(e) = referral.consume() {
            warn!(order_id = %committed.order_id, error = %e, "could not clear referral code");
        }
        if let Err(e) = cart.clear() {
            warn!(order_id = %committed.order_id, error = %e, "could not clear cart");
        }
        attempt.record(CheckoutEvent::attempt_succeeded());

        CheckoutReceipt {
            attempt_id: attempt.id(),
            order_id: committed.order_id,
            total: committed.total,
            affiliate_id: committed.affiliate_id,
            commission: committed.commission,
            settlement,
            history: attempt.into_history(),
        }
    }

    async fn validate<C: LocalStore>(
        &self,
        cart: &CartLedger<C>,
        request: &CheckoutRequest,
    ) -> Result<(BuyerId, UserProfile)> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let buyer_id = request
            .buyer_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(CheckoutError::Unauthenticated)?;

        let missing = request.shipping.missing_fields();
        if !missing.is_empty() {
            return Err(CheckoutError::MissingFields { fields: missing });
        }

        let profile: UserProfile = self
            .store
            .get_as(collections::USERS, &buyer_id)
            .await?
            .ok_or(CheckoutError::Unauthenticated)?;

        self.check_stock(cart.lines()).await?;
        Ok((buyer_id, profile))
    }

    /// Advisory availability check. Settlement still guards every decrement.
    async fn check_stock(&self, lines: &[CartLine]) -> Result<()> {
        let mut wanted: BTreeMap<&ProductId, u64> = BTreeMap::new();
        for line in lines {
            let total = wanted.entry(&line.product_id).or_default();
            *total = total.saturating_add(u64::from(line.quantity));
        }

        for (product_id, requested) in wanted {
            let product: Product = self
                .store
                .get_as(collections::PRODUCTS, product_id)
                .await?
                .ok_or_else(|| CheckoutError::UnknownProduct {
                    product_id: product_id.clone(),
                })?;
            if product.stock < i64::try_from(requested).unwrap_or(i64::MAX) {
                return Err(CheckoutError::InsufficientStock {
                    product_id: product_id.clone(),
                    requested,
                    available: product.stock,
                });
            }
        }
        Ok(())
    }

    async fn pay(&self, buyer_id: &BuyerId, amount: Money, method: PaymentMethod) -> Result<String> {
        let timeout = self.config.payment_timeout;
        match tokio::time::timeout(timeout, self.payment.charge(buyer_id, amount, method)).await {
            Ok(result) => Ok(result?.payment_id),
            Err(_) => Err(CheckoutError::PaymentTimeout { after: timeout }),
        }
    }
}

fn advance(attempt: &mut CheckoutAttempt, to: CheckoutState) {
    if let Err(e) = attempt.transition(to) {
        error!(attempt_id = %attempt.id(), error = %e, "unexpected checkout transition");
    }
}
