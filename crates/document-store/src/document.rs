use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{DocumentId, Result};

/// Collection names used by the storefront.
pub mod collections {
    /// Buyer profiles, keyed by authentication uid.
    pub const USERS: &str = "users";
    /// Catalog products with their stock counts.
    pub const PRODUCTS: &str = "products";
    /// Affiliate ledgers, keyed by the affiliate's uid.
    pub const AFFILIATES: &str = "affiliates";
    /// Paid orders.
    pub const ORDERS: &str = "orders";
    /// Commissions owed to affiliates, keyed by order id.
    pub const COMMISSIONS: &str = "commissions";
}

/// A stored document: a JSON body addressed by collection and id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// The collection the document belongs to.
    pub collection: String,

    /// The document id, unique within its collection.
    pub id: DocumentId,

    /// The document body.
    pub body: serde_json::Value,

    /// When the document was created (store clock).
    pub created_at: DateTime<Utc>,

    /// When the document was last written (store clock).
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Creates a new document stamped with the current time.
    pub fn new(collection: impl Into<String>, id: DocumentId, body: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            collection: collection.into(),
            id,
            body,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deserializes the body into a typed record.
    pub fn deserialize_body<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }

    /// Reads the value at a dotted field path, if present.
    pub fn field(&self, path: &str) -> Option<&serde_json::Value> {
        crate::update::lookup(&self.body, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_reads_nested_paths() {
        let doc = Document::new(
            "orders",
            DocumentId::new("o1"),
            json!({"total": 100, "settlement": {"completed": false}}),
        );

        assert_eq!(doc.field("total"), Some(&json!(100)));
        assert_eq!(doc.field("settlement.completed"), Some(&json!(false)));
        assert_eq!(doc.field("settlement.missing"), None);
    }

    #[test]
    fn deserialize_body_into_record() {
        #[derive(Deserialize)]
        struct Product {
            stock: i64,
        }

        let doc = Document::new("products", DocumentId::new("p1"), json!({"stock": 3}));
        let product: Product = doc.deserialize_body().unwrap();
        assert_eq!(product.stock, 3);
    }
}
