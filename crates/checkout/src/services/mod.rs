//! External service traits and their simulated implementations.

pub mod payment;

pub use payment::{PaymentGateway, PaymentResult, SimulatedPaymentGateway};
