use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

use crate::{Document, DocumentId, DocumentQuery, DocumentUpdate, Result};

/// The kind of store operation, used for fault injection and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Query,
    Create,
    Update,
}

impl StoreOp {
    /// Returns the operation name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Get => "get",
            StoreOp::Query => "query",
            StoreOp::Create => "create",
            StoreOp::Update => "update",
        }
    }
}

impl std::fmt::Display for StoreOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Core trait for document store implementations.
///
/// Every operation touches a single document (or reads a collection).
/// There is no cross-document transaction: callers that need several
/// writes to happen together must design for partial failure.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Retrieves a document by collection and id.
    ///
    /// Returns None if the document doesn't exist.
    async fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>>;

    /// Retrieves the documents matching a query.
    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>>;

    /// Creates a document, generating an id when none is given.
    ///
    /// Fails with `AlreadyExists` if the id is taken, which makes creates
    /// with a deterministic id safe to retry.
    async fn create(
        &self,
        collection: &str,
        id: Option<DocumentId>,
        body: serde_json::Value,
    ) -> Result<DocumentId>;

    /// Applies an update to a single document atomically.
    ///
    /// Preconditions are evaluated against the persisted value in the same
    /// atomic step as the field operations. Returns the updated document.
    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        update: DocumentUpdate,
    ) -> Result<Document>;
}

/// Extension trait providing typed convenience methods for document stores.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Retrieves a document and deserializes its body.
    async fn get_as<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        id: &DocumentId,
    ) -> Result<Option<T>> {
        match self.get(collection, id).await? {
            Some(doc) => Ok(Some(doc.deserialize_body()?)),
            None => Ok(None),
        }
    }

    /// Runs a query and deserializes every body, paired with its id.
    async fn query_as<T: DeserializeOwned + Send>(
        &self,
        query: DocumentQuery,
    ) -> Result<Vec<(DocumentId, T)>> {
        self.query(query)
            .await?
            .into_iter()
            .map(|doc| {
                let body: T = doc.deserialize_body()?;
                Ok((doc.id, body))
            })
            .collect()
    }

    /// Serializes a record and creates it.
    async fn create_from<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: Option<DocumentId>,
        record: &T,
    ) -> Result<DocumentId> {
        let body = serde_json::to_value(record)?;
        self.create(collection, id, body).await
    }

    /// Checks if a document exists.
    async fn exists(&self, collection: &str, id: &DocumentId) -> Result<bool> {
        Ok(self.get(collection, id).await?.is_some())
    }
}

// Blanket implementation for all DocumentStore implementations
impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<T> {
    async fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>> {
        (**self).get(collection, id).await
    }

    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        (**self).query(query).await
    }

    async fn create(
        &self,
        collection: &str,
        id: Option<DocumentId>,
        body: serde_json::Value,
    ) -> Result<DocumentId> {
        (**self).create(collection, id, body).await
    }

    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        update: DocumentUpdate,
    ) -> Result<Document> {
        (**self).update(collection, id, update).await
    }
}
