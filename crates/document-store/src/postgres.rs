use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    Document, DocumentId, DocumentQuery, DocumentUpdate, Result, SortOrder, StoreError,
    store::DocumentStore,
};

/// PostgreSQL-backed document store.
///
/// Documents live in a single `documents` table as JSONB bodies. Updates
/// lock the target row (`SELECT ... FOR UPDATE`) and evaluate the field
/// operations inside the same transaction, which gives the per-document
/// atomicity the storefront relies on.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_document(row: PgRow) -> Result<Document> {
        Ok(Document {
            collection: row.try_get("collection")?,
            id: DocumentId::new(row.try_get::<String, _>("id")?),
            body: row.try_get("body")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

fn json_path(field: &str) -> Vec<String> {
    field.split('.').map(str::to_string).collect()
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(&self, collection: &str, id: &DocumentId) -> Result<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT collection, id, body, created_at, updated_at
            FROM documents
            WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_document).transpose()
    }

    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        let mut sql = String::from(
            "SELECT collection, id, body, created_at, updated_at FROM documents WHERE collection = $1",
        );
        let mut param_count = 1;

        // Build dynamic query
        for _ in &query.filters {
            sql.push_str(&format!(
                " AND body #> ${} = ${}",
                param_count + 1,
                param_count + 2
            ));
            param_count += 2;
        }

        match query.order {
            SortOrder::Ascending => sql.push_str(" ORDER BY created_at ASC, id ASC"),
            SortOrder::Descending => sql.push_str(" ORDER BY created_at DESC, id DESC"),
        }

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql).bind(&query.collection);
        for (field, value) in &query.filters {
            sqlx_query = sqlx_query.bind(json_path(field)).bind(value.clone());
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_document).collect()
    }

    async fn create(
        &self,
        collection: &str,
        id: Option<DocumentId>,
        body: serde_json::Value,
    ) -> Result<DocumentId> {
        let id = id.unwrap_or_else(DocumentId::generate);

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, created_at, updated_at)
            VALUES ($1, $2, $3, NOW(), NOW())
            "#,
        )
        .bind(collection)
        .bind(id.as_str())
        .bind(&body)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("documents_pkey")
            {
                return StoreError::AlreadyExists {
                    collection: collection.to_string(),
                    id: id.clone(),
                };
            }
            StoreError::Database(e)
        })?;

        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &DocumentId,
        update: DocumentUpdate,
    ) -> Result<Document> {
        let mut tx = self.pool.begin().await?;

        let current: Option<serde_json::Value> = sqlx::query_scalar(
            "SELECT body FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let current = current.ok_or_else(|| StoreError::NotFound {
            collection: collection.to_string(),
            id: id.clone(),
        })?;

        // A failed precondition drops the transaction, releasing the lock
        let body = update.apply_to(collection, id, &current)?;

        let row = sqlx::query(
            r#"
            UPDATE documents
            SET body = $3, updated_at = NOW()
            WHERE collection = $1 AND id = $2
            RETURNING collection, id, body, created_at, updated_at
            "#,
        )
        .bind(collection)
        .bind(id.as_str())
        .bind(&body)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Self::row_to_document(row)
    }
}
