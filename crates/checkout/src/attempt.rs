//! A single checkout attempt.

use storefront::{AffiliateId, OrderId};
use uuid::Uuid;

use crate::error::{CheckoutError, Result};
use crate::events::CheckoutEvent;
use crate::state::CheckoutState;

/// State of one checkout attempt, rebuilt from the events it records.
///
/// Attempts are single-shot: once terminal, every further transition is
/// rejected, so a stale caller cannot run Attributing or Persisting twice.
#[derive(Debug, Clone)]
pub struct CheckoutAttempt {
    id: Uuid,
    state: CheckoutState,
    history: Vec<CheckoutEvent>,
    payment_id: Option<String>,
    affiliate_id: Option<AffiliateId>,
    order_id: Option<OrderId>,
    failure_reason: Option<String>,
}

impl Default for CheckoutAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckoutAttempt {
    /// Creates an idle attempt with a fresh id.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: CheckoutState::Idle,
            history: Vec::new(),
            payment_id: None,
            affiliate_id: None,
            order_id: None,
            failure_reason: None,
        }
    }

    /// Moves to `to`, recording the transition.
    pub fn transition(&mut self, to: CheckoutState) -> Result<()> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(CheckoutError::InvalidTransition { from, to });
        }
        if from == CheckoutState::Idle {
            self.record(CheckoutEvent::attempt_started(self.id));
        }
        self.record(CheckoutEvent::transitioned(from, to));
        tracing::info!(attempt_id = %self.id, %from, %to, "checkout step started");
        Ok(())
    }

    /// Marks the attempt failed with the given error.
    pub fn fail(&mut self, error: &CheckoutError) -> Result<()> {
        let from = self.state;
        self.transition(CheckoutState::Failed)?;
        self.record(CheckoutEvent::attempt_failed(
            from,
            error.kind(),
            error.to_string(),
        ));
        Ok(())
    }

    /// Records an event and applies it.
    pub fn record(&mut self, event: CheckoutEvent) {
        self.apply(&event);
        self.history.push(event);
    }

    fn apply(&mut self, event: &CheckoutEvent) {
        match event {
            CheckoutEvent::AttemptStarted(_) => {}
            CheckoutEvent::Transitioned(data) => {
                self.state = data.to;
            }
            CheckoutEvent::PaymentAuthorized(data) => {
                self.payment_id = Some(data.payment_id.clone());
            }
            CheckoutEvent::AffiliateResolved(data) => {
                self.affiliate_id = data.affiliate_id.clone();
            }
            CheckoutEvent::OrderCommitted(data) => {
                self.order_id = Some(data.order_id.clone());
            }
            CheckoutEvent::SettlementReported(_) => {}
            CheckoutEvent::AttemptSucceeded(_) => {}
            CheckoutEvent::AttemptFailed(data) => {
                self.failure_reason = Some(data.reason.clone());
            }
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> CheckoutState {
        self.state
    }

    /// Returns true once the order has been created.
    pub fn is_committed(&self) -> bool {
        self.order_id.is_some()
    }

    pub fn payment_id(&self) -> Option<&str> {
        self.payment_id.as_deref()
    }

    pub fn affiliate_id(&self) -> Option<&AffiliateId> {
        self.affiliate_id.as_ref()
    }

    pub fn order_id(&self) -> Option<&OrderId> {
        self.order_id.as_ref()
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Every event recorded so far, oldest first.
    pub fn history(&self) -> &[CheckoutEvent] {
        &self.history
    }

    /// Consumes the attempt, returning its history.
    pub fn into_history(self) -> Vec<CheckoutEvent> {
        self.history
    }
}
