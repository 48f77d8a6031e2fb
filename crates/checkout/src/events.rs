//! Events recorded by a checkout attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storefront::{AffiliateId, Money, OrderId};
use uuid::Uuid;

use crate::error::FaultKind;
use crate::settler::SettlementStatus;
use crate::state::CheckoutState;

/// Events that can occur during a checkout attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CheckoutEvent {
    /// The attempt left `Idle`.
    AttemptStarted(AttemptStartedData),

    /// The attempt moved between states.
    Transitioned(TransitionData),

    /// The payment gateway accepted the charge.
    PaymentAuthorized(PaymentAuthorizedData),

    /// The referral code (if any) was resolved.
    AffiliateResolved(AffiliateResolvedData),

    /// The order was created. Everything after this is committed.
    OrderCommitted(OrderCommittedData),

    /// Settlement finished or was deferred.
    SettlementReported(SettlementReportedData),

    /// The attempt succeeded.
    AttemptSucceeded(AttemptFinishedData),

    /// The attempt failed before the commit point.
    AttemptFailed(AttemptFailedData),
}

impl CheckoutEvent {
    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            CheckoutEvent::AttemptStarted(_) => "AttemptStarted",
            CheckoutEvent::Transitioned(_) => "Transitioned",
            CheckoutEvent::PaymentAuthorized(_) => "PaymentAuthorized",
            CheckoutEvent::AffiliateResolved(_) => "AffiliateResolved",
            CheckoutEvent::OrderCommitted(_) => "OrderCommitted",
            CheckoutEvent::SettlementReported(_) => "SettlementReported",
            CheckoutEvent::AttemptSucceeded(_) => "AttemptSucceeded",
            CheckoutEvent::AttemptFailed(_) => "AttemptFailed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptStartedData {
    pub attempt_id: Uuid,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionData {
    pub from: CheckoutState,
    pub to: CheckoutState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentAuthorizedData {
    pub payment_id: String,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffiliateResolvedData {
    /// The captured code, if there was one.
    pub code: Option<String>,
    /// None when there was no code or it did not resolve.
    pub affiliate_id: Option<AffiliateId>,
    pub commission: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCommittedData {
    pub order_id: OrderId,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementReportedData {
    pub status: SettlementStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFinishedData {
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailedData {
    /// The state the attempt was in when it failed.
    pub from: CheckoutState,
    pub kind: FaultKind,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

// Convenience constructors
impl CheckoutEvent {
    pub fn attempt_started(attempt_id: Uuid) -> Self {
        CheckoutEvent::AttemptStarted(AttemptStartedData {
            attempt_id,
            started_at: Utc::now(),
        })
    }

    pub fn transitioned(from: CheckoutState, to: CheckoutState) -> Self {
        CheckoutEvent::Transitioned(TransitionData {
            from,
            to,
            at: Utc::now(),
        })
    }

    pub fn payment_authorized(payment_id: impl Into<String>, amount: Money) -> Self {
        CheckoutEvent::PaymentAuthorized(PaymentAuthorizedData {
            payment_id: payment_id.into(),
            amount,
        })
    }

    pub fn affiliate_resolved(
        code: Option<String>,
        affiliate_id: Option<AffiliateId>,
        commission: Option<Money>,
    ) -> Self {
        CheckoutEvent::AffiliateResolved(AffiliateResolvedData {
            code,
            affiliate_id,
            commission,
        })
    }

    pub fn order_committed(order_id: OrderId, total: Money) -> Self {
        CheckoutEvent::OrderCommitted(OrderCommittedData { order_id, total })
    }

    pub fn settlement_reported(status: SettlementStatus) -> Self {
        CheckoutEvent::SettlementReported(SettlementReportedData { status })
    }

    pub fn attempt_succeeded() -> Self {
        CheckoutEvent::AttemptSucceeded(AttemptFinishedData {
            completed_at: Utc::now(),
        })
    }

    pub fn attempt_failed(from: CheckoutState, kind: FaultKind, reason: impl Into<String>) -> Self {
        CheckoutEvent::AttemptFailed(AttemptFailedData {
            from,
            kind,
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }
}
