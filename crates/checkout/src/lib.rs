//! Checkout saga for the storefront.
//!
//! A checkout attempt moves through these states:
//! 1. Validating: cart, buyer identity, form fields, advisory stock check
//! 2. Paying: simulated payment, bounded by a timeout
//! 3. Attributing: resolve the captured referral code, if any
//! 4. Persisting: create the order (the commit point)
//! 5. Settling: commission, affiliate credit and stock decrements
//!
//! Failures before the order exists are returned to the caller and leave
//! every piece of state untouched. After the order exists the outcome is a
//! success; settlement work that cannot finish is deferred to the
//! [`Reconciler`].

pub mod attempt;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod reconciler;
pub mod services;
pub mod settler;
pub mod state;

pub use attempt::CheckoutAttempt;
pub use config::{CheckoutConfig, RetryPolicy};
pub use coordinator::{CheckoutCoordinator, CheckoutReceipt, CheckoutRequest};
pub use error::{CheckoutError, FaultKind, Result};
pub use events::CheckoutEvent;
pub use reconciler::{ReconciliationReport, Reconciler};
pub use services::{PaymentGateway, PaymentResult, SimulatedPaymentGateway};
pub use settler::{SettlementOutcome, SettlementStatus, Settler};
pub use state::CheckoutState;
