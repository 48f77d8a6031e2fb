//! Shared types for the storefront workspace.

pub mod types;

pub use types::DocumentId;
