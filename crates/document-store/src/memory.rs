use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    Document, DocumentId, DocumentQuery, DocumentUpdate, Result, SortOrder, StoreError,
    store::{DocumentStore, StoreOp},
};

/// A scripted failure: the next `remaining` operations matching the rule
/// fail with `StoreError::Unavailable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRule {
    collection: Option<String>,
    op: Option<StoreOp>,
    remaining: u32,
}

impl FaultRule {
    /// Fails every kind of operation, once.
    pub fn any() -> Self {
        Self {
            collection: None,
            op: None,
            remaining: 1,
        }
    }

    /// Fails one kind of operation, once.
    pub fn on(op: StoreOp) -> Self {
        Self {
            op: Some(op),
            ..Self::any()
        }
    }

    /// Restricts the rule to one collection.
    pub fn in_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Sets how many matching operations fail.
    pub fn times(mut self, times: u32) -> Self {
        self.remaining = times;
        self
    }

    fn matches(&self, collection: &str, op: StoreOp) -> bool {
        self.remaining > 0
            && self.collection.as_deref().is_none_or(|c| c == collection)
            && self.op.is_none_or(|o| o == op)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    doc: Document,
}

/// In-memory document store implementation for testing.
///
/// Provides the same per-document atomicity as the PostgreSQL store (every
/// update runs under the collection write lock) plus scripted faults and a
/// write counter for exercising failure paths.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, HashMap<DocumentId, Entry>>>>,
    faults: Arc<Mutex<Vec<FaultRule>>>,
    writes: Arc<AtomicUsize>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a fault.
    pub fn inject_fault(&self, rule: FaultRule) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(rule);
        }
    }

    /// Removes every pending fault.
    pub fn clear_faults(&self) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.clear();
        }
    }

    /// Returns the number of successful creates and updates so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of documents in a collection.
    pub async fn document_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, HashMap::len)
    }

    /// Clears all documents.
    pub async fn clear(&self) {
        self.collections.write().await.clear();
    }

    fn check_fault(&self, collection: &str, op: StoreOp) -> Result<()> {
        let Ok(mut faults) = self.faults.lock() else {
            return Ok(());
        };
        if let Some(rule) = faults.iter_mut().find(|r| r.matches(collection, op)) {
            rule.remaining -= 1;
            tracing::debug!(collection, %op, "injected store fault");
            return Err(StoreError::Unavailable(format!(
                "injected fault on {op} {collection}"
            )));
        }
        faults.retain(|r| r.remaining > 0);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>> {
        self.check_fault(collection, StoreOp::Get)?;

        let store = self.collections.read().await;
        Ok(store
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|entry| entry.doc.clone()))
    }

    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        self.check_fault(&query.collection, StoreOp::Query)?;

        let store = self.collections.read().await;
        let mut entries: Vec<&Entry> = store
            .get(&query.collection)
            .map(|docs| {
                docs.values()
                    .filter(|entry| query.matches(&entry.doc.body))
                    .collect()
            })
            .unwrap_or_default();

        entries.sort_by_key(|entry| (entry.doc.created_at, entry.seq));
        if query.order == SortOrder::Descending {
            entries.reverse();
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(entries
            .into_iter()
            .take(limit)
            .map(|entry| entry.doc.clone())
            .collect())
    }

    async fn create(
        &self,
        collection: &str,
        id: Option<DocumentId>,
        body: serde_json::Value,
    ) -> Result<DocumentId> {
        self.check_fault(collection, StoreOp::Create)?;

        let id = id.unwrap_or_else(DocumentId::generate);
        let mut store = self.collections.write().await;
        let docs = store.entry(collection.to_string()).or_default();

        if docs.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                collection: collection.to_string(),
                id,
            });
        }

        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        docs.insert(
            id.clone(),
            Entry {
                seq,
                doc: Document::new(collection, id.clone(), body),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        update: DocumentUpdate,
    ) -> Result<Document> {
        self.check_fault(collection, StoreOp::Update)?;

        let mut store = self.collections.write().await;
        let entry = store
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.clone(),
            })?;

        let body = update.apply_to(collection, id, &entry.doc.body)?;
        entry.doc.body = body;
        entry.doc.updated_at = Utc::now();
        self.writes.fetch_add(1, Ordering::SeqCst);

        Ok(entry.doc.clone())
    }
}
