//! Payment gateway trait and simulated implementation.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use storefront::{BuyerId, Money, PaymentMethod};

use crate::error::CheckoutError;

/// Result of a successful charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentResult {
    /// The payment id assigned by the gateway.
    pub payment_id: String,
}

/// Trait for charging a buyer.
///
/// Callers bound `charge` with a timeout; implementations may take as long
/// as the real gateway would.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(
        &self,
        buyer_id: &BuyerId,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<PaymentResult, CheckoutError>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn charge(
        &self,
        buyer_id: &BuyerId,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<PaymentResult, CheckoutError> {
        (**self).charge(buyer_id, amount, method).await
    }
}

#[derive(Debug, Default)]
struct SimulatedPaymentState {
    charges: Vec<(String, BuyerId, Money, PaymentMethod)>,
    next_id: u32,
    decline: bool,
}

/// Gateway that waits a fixed delay and then approves the charge.
#[derive(Debug, Clone)]
pub struct SimulatedPaymentGateway {
    delay: Duration,
    state: Arc<RwLock<SimulatedPaymentState>>,
}

impl Default for SimulatedPaymentGateway {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl SimulatedPaymentGateway {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Arc::default(),
        }
    }

    /// A gateway that approves immediately.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Declines every subsequent charge while set.
    pub fn set_decline(&self, decline: bool) {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .decline = decline;
    }

    /// Returns the number of approved charges.
    pub fn charge_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .charges
            .len()
    }

    /// Returns the amount of every approved charge, oldest first.
    pub fn charged_amounts(&self) -> Vec<Money> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .charges
            .iter()
            .map(|(_, _, amount, _)| *amount)
            .collect()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn charge(
        &self,
        buyer_id: &BuyerId,
        amount: Money,
        method: PaymentMethod,
    ) -> Result<PaymentResult, CheckoutError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if state.decline {
            return Err(CheckoutError::PaymentDeclined {
                reason: "declined by issuer".to_string(),
            });
        }

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        state
            .charges
            .push((payment_id.clone(), buyer_id.clone(), amount, method));

        Ok(PaymentResult { payment_id })
    }
}
