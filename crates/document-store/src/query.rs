use serde_json::Value;

/// Ordering of query results by document creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

/// Builder for querying a collection.
///
/// Filters are equality matches on dotted field paths; all filters must
/// match for a document to be returned.
#[derive(Debug, Clone)]
pub struct DocumentQuery {
    /// The collection to search.
    pub collection: String,

    /// Field path / expected value pairs.
    pub filters: Vec<(String, Value)>,

    /// Result ordering by creation time.
    pub order: SortOrder,

    /// Maximum number of documents to return.
    pub limit: Option<usize>,
}

impl DocumentQuery {
    /// Creates a query over every document in a collection.
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order: SortOrder::default(),
            limit: None,
        }
    }

    /// Adds an equality filter on a field path.
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Returns newest documents first.
    pub fn newest_first(mut self) -> Self {
        self.order = SortOrder::Descending;
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if the body satisfies every filter.
    pub fn matches(&self, body: &Value) -> bool {
        self.filters
            .iter()
            .all(|(path, expected)| crate::update::lookup(body, path) == Some(expected))
    }
}
