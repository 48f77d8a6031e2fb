//! Shared application state.

use std::time::Duration;

use checkout::{Reconciler, RetryPolicy, Settler};
use document_store::DocumentStore;
use storefront::AffiliateResolver;

/// Shared application state accessible from all handlers.
pub struct AppState<S: DocumentStore> {
    pub store: S,
    pub affiliates: AffiliateResolver<S>,
    pub reconciler: Reconciler<S>,
}

impl<S: DocumentStore + Clone> AppState<S> {
    /// Wires the resolver and reconciler over one store handle.
    pub fn new(store: S, settlement_retry: RetryPolicy, reconcile_min_age: Duration) -> Self {
        let settler = Settler::new(store.clone(), settlement_retry);
        Self {
            affiliates: AffiliateResolver::new(store.clone()),
            reconciler: Reconciler::new(store.clone(), settler).with_min_age(reconcile_min_age),
            store,
        }
    }
}
