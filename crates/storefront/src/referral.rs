//! Referral Tracker: a single-slot capture of the affiliate code seen on an
//! entry link.
//!
//! Capture never validates the code against the store; resolution happens at
//! checkout.

use tracing::debug;

use crate::error::LocalStateError;
use crate::local::{LocalStore, REFERRAL_KEY};
use crate::value_objects::ReferralCode;

/// Which entry link wins when several carry a referral code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributionPolicy {
    /// A later link overwrites an earlier one.
    #[default]
    LastTouch,
    /// Only the first link is kept until it is consumed.
    FirstTouch,
}

/// The Referral Tracker.
#[derive(Debug)]
pub struct ReferralTracker<L: LocalStore> {
    store: L,
    policy: AttributionPolicy,
}

impl<L: LocalStore> ReferralTracker<L> {
    /// Creates a last-touch tracker over `store`.
    pub fn new(store: L) -> Self {
        Self::with_policy(store, AttributionPolicy::default())
    }

    /// Creates a tracker with an explicit attribution policy.
    pub fn with_policy(store: L, policy: AttributionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> AttributionPolicy {
        self.policy
    }

    /// Records a referral parameter observed on entry.
    ///
    /// Blank input is ignored. Returns true if the slot was written.
    pub fn capture(&self, raw: &str) -> Result<bool, LocalStateError> {
        let Some(code) = ReferralCode::parse(raw) else {
            return Ok(false);
        };

        if self.policy == AttributionPolicy::FirstTouch && self.peek()?.is_some() {
            debug!(code = %code, "Referral already captured, keeping first touch");
            return Ok(false);
        }

        self.store.set(REFERRAL_KEY, code.as_str())?;
        debug!(code = %code, "Captured referral code");
        Ok(true)
    }

    /// Returns the current code without clearing it.
    pub fn peek(&self) -> Result<Option<ReferralCode>, LocalStateError> {
        Ok(self
            .store
            .get(REFERRAL_KEY)?
            .as_deref()
            .and_then(ReferralCode::parse))
    }

    /// Returns the current code and clears the slot.
    ///
    /// Only call this once a checkout has succeeded.
    pub fn consume(&mut self) -> Result<Option<ReferralCode>, LocalStateError> {
        let code = self.peek()?;
        self.store.remove(REFERRAL_KEY)?;
        Ok(code)
    }
}
