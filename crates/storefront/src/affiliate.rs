//! Affiliate Resolver: maps a referral code to an affiliate ledger and
//! computes commissions.

use document_store::{
    DocumentQuery, DocumentStore, DocumentStoreExt, DocumentUpdate, Result, collections,
};
use tracing::{debug, instrument, warn};

use crate::records::Affiliate;
use crate::value_objects::{AffiliateId, Money};

/// An affiliate found by its referral code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAffiliate {
    pub id: AffiliateId,
    pub affiliate: Affiliate,
}

impl ResolvedAffiliate {
    /// Commission owed on `order_total` at the affiliate's current percent.
    pub fn commission_on(&self, order_total: Money) -> Money {
        commission_for(&self.affiliate, order_total)
    }
}

/// Returns `order_total * percent / 100`, rounded half-up to the cent.
/// The percent defaults to 10 when the affiliate has none.
pub fn commission_for(affiliate: &Affiliate, order_total: Money) -> Money {
    order_total.percent(affiliate.commission_percent())
}

/// Looks up affiliates in the document store.
#[derive(Debug, Clone)]
pub struct AffiliateResolver<S> {
    store: S,
}

impl<S> AffiliateResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: DocumentStore> AffiliateResolver<S> {
    /// Finds the affiliate whose referral code equals `code`.
    ///
    /// Empty or unknown codes resolve to `None`; that is the common case and
    /// not an error.
    #[instrument(skip(self))]
    pub async fn resolve(&self, code: &str) -> Result<Option<ResolvedAffiliate>> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }

        let query = DocumentQuery::collection(collections::AFFILIATES)
            .where_eq(Affiliate::REFERRAL_CODE, code)
            .limit(2);
        let mut matches = self.store.query_as::<Affiliate>(query).await?;

        if matches.len() > 1 {
            warn!(code, "Referral code is not unique, using the oldest affiliate");
        }
        if matches.is_empty() {
            debug!(code, "Referral code did not resolve");
            return Ok(None);
        }

        let (id, affiliate) = matches.swap_remove(0);
        Ok(Some(ResolvedAffiliate { id, affiliate }))
    }

    /// Counts an entry-link click for the affiliate owning `code`.
    ///
    /// Returns the updated affiliate, or `None` if the code is unknown.
    #[instrument(skip(self))]
    pub async fn record_click(&self, code: &str) -> Result<Option<ResolvedAffiliate>> {
        let Some(resolved) = self.resolve(code).await? else {
            return Ok(None);
        };

        let doc = self
            .store
            .update(
                collections::AFFILIATES,
                &resolved.id,
                DocumentUpdate::new().increment(Affiliate::CLICK_COUNT, 1),
            )
            .await?;
        metrics::counter!("referral_clicks_total").increment(1);

        Ok(Some(ResolvedAffiliate {
            id: doc.id.clone(),
            affiliate: doc.deserialize_body()?,
        }))
    }
}
