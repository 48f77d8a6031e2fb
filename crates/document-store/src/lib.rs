//! Document store primitives for the storefront.
//!
//! The checkout workflow talks to a remote document database that offers
//! per-document atomic updates and nothing more: no transactions span two
//! documents. This crate models exactly those primitives:
//!
//! - `get` a document by collection and id
//! - `query` a collection by field equality
//! - `create` a document (create-only, duplicate ids are rejected)
//! - `update` one document atomically with field deltas and preconditions

pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;
pub mod update;

pub use common::DocumentId;
pub use document::{Document, collections};
pub use error::{Result, StoreError};
pub use memory::{FaultRule, InMemoryDocumentStore};
pub use postgres::PostgresDocumentStore;
pub use query::{DocumentQuery, SortOrder};
pub use store::{DocumentStore, DocumentStoreExt, StoreOp};
pub use update::{DocumentUpdate, FieldOp, Precondition};
