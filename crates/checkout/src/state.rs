//! Checkout state machine.

use serde::{Deserialize, Serialize};

/// The state of a single checkout attempt.
///
/// State transitions:
/// ```text
/// Idle ──► Validating ──► Paying ──► Attributing ──► Persisting ──► Settling ──► Succeeded
///              │             │            │               │
///              └─────────────┴────────────┴───────────────┴──► Failed
/// ```
///
/// `Settling` is past the commit point and can only end in `Succeeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckoutState {
    #[default]
    Idle,
    Validating,
    Paying,
    Attributing,
    /// Creating the order; a successful create is the commit point.
    Persisting,
    /// Post-commit effects are being applied.
    Settling,
    Succeeded,
    Failed,
}

impl CheckoutState {
    /// Returns the next state on the success path.
    pub fn next(&self) -> Option<CheckoutState> {
        match self {
            CheckoutState::Idle => Some(CheckoutState::Validating),
            CheckoutState::Validating => Some(CheckoutState::Paying),
            CheckoutState::Paying => Some(CheckoutState::Attributing),
            CheckoutState::Attributing => Some(CheckoutState::Persisting),
            CheckoutState::Persisting => Some(CheckoutState::Settling),
            CheckoutState::Settling => Some(CheckoutState::Succeeded),
            CheckoutState::Succeeded | CheckoutState::Failed => None,
        }
    }

    /// Returns true if the attempt may still be abandoned.
    pub fn can_fail(&self) -> bool {
        !self.is_terminal() && *self != CheckoutState::Settling
    }

    /// Returns true if moving to `target` is allowed.
    pub fn can_transition_to(&self, target: CheckoutState) -> bool {
        if target == CheckoutState::Failed {
            return self.can_fail();
        }
        self.next() == Some(target)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutState::Succeeded | CheckoutState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Idle => "Idle",
            CheckoutState::Validating => "Validating",
            CheckoutState::Paying => "Paying",
            CheckoutState::Attributing => "Attributing",
            CheckoutState::Persisting => "Persisting",
            CheckoutState::Settling => "Settling",
            CheckoutState::Succeeded => "Succeeded",
            CheckoutState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
