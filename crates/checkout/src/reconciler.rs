//! Background completion of settlements that checkout could not finish.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use document_store::{DocumentQuery, DocumentStore, StoreError, collections};
use serde::Serialize;
use storefront::Settlement;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::settler::Settler;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReconciliationReport {
    /// Orders found with incomplete settlement.
    pub scanned: usize,
    /// Orders settled during this pass.
    pub settled: usize,
    /// Orders that still could not be settled.
    pub failed: usize,
    /// Orders younger than the minimum age, left for a later pass.
    pub skipped: usize,
}

/// Scans for orders whose settlement is incomplete and settles them.
///
/// Clones share one pass lock, so passes never overlap within a process.
/// Orders younger than `min_age` are left to the checkout that created them.
#[derive(Debug, Clone)]
pub struct Reconciler<S> {
    store: S,
    settler: Settler<S>,
    min_age: Duration,
    pass: Arc<Mutex<()>>,
}

impl<S: DocumentStore + Clone> Reconciler<S> {
    pub fn new(store: S, settler: Settler<S>) -> Self {
        Self {
            store,
            settler,
            min_age: Duration::ZERO,
            pass: Arc::new(Mutex::new(())),
        }
    }

    /// Skips orders created less than `min_age` ago.
    pub fn with_min_age(mut self, min_age: Duration) -> Self {
        self.min_age = min_age;
        self
    }

    /// Runs a single pass. Only a failed scan is an error; per-order
    /// failures are counted and left for the next pass.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReconciliationReport, StoreError> {
        let _pass = self.pass.lock().await;
        metrics::counter!("reconciliation_runs_total").increment(1);

        let pending = self
            .store
            .query(
                DocumentQuery::collection(collections::ORDERS)
                    .where_eq(Settlement::COMPLETED, false),
            )
            .await?;

        let mut report = ReconciliationReport {
            scanned: pending.len(),
            ..Default::default()
        };

        let cutoff = chrono::Duration::from_std(self.min_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        for doc in pending {
            if doc.created_at > cutoff {
                report.skipped += 1;
                continue;
            }
            match self.settler.settle(&doc.id).await {
                Ok(outcome) => {
                    if !outcome.already_completed {
                        report.settled += 1;
                    }
                }
                Err(e) => {
                    warn!(order_id = %doc.id, error = %e, "order still unsettled");
                    report.failed += 1;
                }
            }
        }

        metrics::counter!("reconciliation_settled_total").increment(report.settled as u64);
        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                settled = report.settled,
                failed = report.failed,
                skipped = report.skipped,
                "reconciliation pass finished"
            );
        }
        Ok(report)
    }

    /// Runs a pass every `interval` until `shutdown` resolves.
    pub async fn run(&self, interval: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("reconciler stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "reconciliation scan failed");
                    }
                }
            }
        }
    }
}
