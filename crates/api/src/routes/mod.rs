//! HTTP handlers, one module per resource.

pub mod affiliates;
pub mod buyers;
pub mod health;
pub mod metrics;
pub mod reconciliation;
pub mod referrals;
