//! Storefront error types.

use thiserror::Error;

use crate::value_objects::LineKey;

/// Errors reading or writing client-local persisted state.
#[derive(Debug, Error)]
pub enum LocalStateError {
    /// The backing file could not be read or written.
    #[error("Local state I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored value could not be (de)serialized.
    #[error("Local state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The stored value was written by a newer schema.
    #[error("Unsupported schema version {found} for '{key}' (supported up to {supported})")]
    UnsupportedVersion {
        key: String,
        found: u32,
        supported: u32,
    },

    /// The key contains characters not allowed by the store.
    #[error("Invalid local state key: {0}")]
    InvalidKey(String),
}

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Line quantities must be between 1 and `MAX_LINE_QUANTITY`.
    #[error(
        "Invalid quantity: {quantity} (must be between 1 and {max})",
        max = crate::cart::MAX_LINE_QUANTITY
    )]
    InvalidQuantity { quantity: u32 },

    /// No line with this key exists in the cart.
    #[error("Cart line not found: {key}")]
    LineNotFound { key: LineKey },

    /// The cart could not be persisted.
    #[error(transparent)]
    LocalState(#[from] LocalStateError),
}
