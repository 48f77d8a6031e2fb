//! Checkout error types.

use std::time::Duration;

use document_store::StoreError;
use serde::{Deserialize, Serialize};
use storefront::{LocalStateError, ProductId};
use thiserror::Error;

use crate::state::CheckoutState;

/// How a failure is reported to the buyer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Bad or missing input; the buyer corrects it and retries.
    UserInput,
    /// No signed-in buyer; redirect to sign-in, the cart is kept.
    AuthenticationRequired,
    /// Declined or timed-out payment; nothing changed, retry allowed.
    Payment,
    /// The store was unreachable before the order was created.
    Persistence,
    /// A bug in the caller, such as reusing a finished attempt.
    Internal,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::UserInput => "user_input",
            FaultKind::AuthenticationRequired => "authentication_required",
            FaultKind::Payment => "payment",
            FaultKind::Persistence => "persistence",
            FaultKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned by a checkout attempt.
///
/// Every variant is raised before the order exists. Problems after the
/// commit point surface as a deferred settlement on the receipt instead.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Missing required checkout fields: {}", .fields.join(", "))]
    MissingFields { fields: Vec<&'static str> },

    #[error("Product not found: {product_id}")]
    UnknownProduct { product_id: ProductId },

    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u64,
        available: i64,
    },

    #[error("Buyer is not authenticated")]
    Unauthenticated,

    #[error("Payment declined: {reason}")]
    PaymentDeclined { reason: String },

    #[error("Payment timed out after {after:?}")]
    PaymentTimeout { after: Duration },

    #[error("Document store error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Local state error: {0}")]
    LocalState(#[from] LocalStateError),

    #[error("Invalid checkout transition: {from} -> {to}")]
    InvalidTransition {
        from: CheckoutState,
        to: CheckoutState,
    },
}

impl CheckoutError {
    /// Maps the error onto the buyer-facing fault taxonomy.
    pub fn kind(&self) -> FaultKind {
        match self {
            CheckoutError::EmptyCart
            | CheckoutError::MissingFields { .. }
            | CheckoutError::UnknownProduct { .. }
            | CheckoutError::InsufficientStock { .. } => FaultKind::UserInput,
            CheckoutError::Unauthenticated => FaultKind::AuthenticationRequired,
            CheckoutError::PaymentDeclined { .. } | CheckoutError::PaymentTimeout { .. } => {
                FaultKind::Payment
            }
            CheckoutError::Persistence(_) | CheckoutError::LocalState(_) => {
                FaultKind::Persistence
            }
            CheckoutError::InvalidTransition { .. } => FaultKind::Internal,
        }
    }

    /// Returns true if submitting the same checkout again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), FaultKind::Payment | FaultKind::Persistence)
    }

    /// Short label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::MissingFields { .. } => "missing_fields",
            CheckoutError::UnknownProduct { .. } => "unknown_product",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::Unauthenticated => "unauthenticated",
            CheckoutError::PaymentDeclined { .. } => "payment_declined",
            CheckoutError::PaymentTimeout { .. } => "payment_timeout",
            CheckoutError::Persistence(_) => "persistence",
            CheckoutError::LocalState(_) => "local_state",
            CheckoutError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
