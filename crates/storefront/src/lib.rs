//! Storefront domain for the checkout workflow.
//!
//! This crate provides:
//! - Value objects (`Money`, `LineKey`, `ReferralCode`) and the document
//!   records owned by the store (products, profiles, affiliates, orders,
//!   commissions)
//! - Client-local persisted state (`LocalStore`) with a versioned cart schema
//! - The cart ledger, the buyer's intent to purchase
//! - The referral tracker, a single-slot last-touch attribution capture
//! - The affiliate resolver, which looks up affiliates and computes commissions

pub mod affiliate;
pub mod cart;
pub mod error;
pub mod local;
pub mod records;
pub mod referral;
pub mod value_objects;

pub use affiliate::{AffiliateResolver, ResolvedAffiliate, commission_for};
pub use cart::{CART_SCHEMA_VERSION, CartLedger, CartLine, CartSummary, MAX_LINE_QUANTITY};
pub use error::{CartError, LocalStateError};
pub use local::{CART_KEY, FileLocalStore, LocalStore, MemoryLocalStore, REFERRAL_KEY};
pub use records::{
    Affiliate, Commission, CommissionStatus, DEFAULT_COMMISSION_PERCENT, FulfillmentStatus, Order,
    OrderLine, PaymentMethod, PaymentStatus, Product, Settlement, ShippingDetails, UserProfile,
    UserRole,
};
pub use referral::{AttributionPolicy, ReferralTracker};
pub use value_objects::{AffiliateId, BuyerId, LineKey, Money, OrderId, ProductId, ReferralCode};
