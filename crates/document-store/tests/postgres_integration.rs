//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p document-store --test postgres_integration
//! ```

use std::sync::Arc;

use document_store::{
    DocumentId, DocumentQuery, DocumentStore, DocumentStoreExt, DocumentUpdate,
    PostgresDocumentStore, StoreError,
};
use serde_json::json;
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    _container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_documents_table.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                _container: container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and a cleared table
async fn get_test_store() -> PostgresDocumentStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE documents")
        .execute(&pool)
        .await
        .unwrap();

    PostgresDocumentStore::new(pool)
}

#[tokio::test]
#[serial]
async fn create_and_get_document() {
    let store = get_test_store().await;

    let id = store
        .create("products", None, json!({"name": "Dress", "stock": 2}))
        .await
        .unwrap();

    let doc = store.get("products", &id).await.unwrap().unwrap();
    assert_eq!(doc.id, id);
    assert_eq!(doc.body["name"], "Dress");
    assert_eq!(doc.body["stock"], 2);
}

#[tokio::test]
#[serial]
async fn create_with_existing_id_is_rejected() {
    let store = get_test_store().await;
    let id = DocumentId::new("order-1");

    store
        .create("commissions", Some(id.clone()), json!({"amount": 100}))
        .await
        .unwrap();
    let result = store
        .create("commissions", Some(id.clone()), json!({"amount": 100}))
        .await;

    assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));

    // Same id in another collection is fine
    assert!(
        store
            .create("orders", Some(id), json!({}))
            .await
            .is_ok()
    );
}

#[tokio::test]
#[serial]
async fn conditional_decrement_never_goes_negative() {
    let store = get_test_store().await;
    let id = store
        .create("products", None, json!({"stock": 1}))
        .await
        .unwrap();

    let decrement = DocumentUpdate::new()
        .require_at_least("stock", 1)
        .increment("stock", -1);

    store
        .update("products", &id, decrement.clone())
        .await
        .unwrap();
    let result = store.update("products", &id, decrement).await;
    assert!(matches!(result, Err(StoreError::ConditionFailed { .. })));

    let doc = store.get("products", &id).await.unwrap().unwrap();
    assert_eq!(doc.body["stock"], 0);
}

#[tokio::test]
#[serial]
async fn concurrent_increments_are_serialized_per_document() {
    let store = get_test_store().await;
    let id = store
        .create("affiliates", None, json!({"balance": 0, "saleCount": 0}))
        .await
        .unwrap();

    let updates = (0..20).map(|_| {
        let store = store.clone();
        let id = id.clone();
        async move {
            store
                .update(
                    "affiliates",
                    &id,
                    DocumentUpdate::new()
                        .increment("balance", 250)
                        .increment("saleCount", 1),
                )
                .await
        }
    });
    for result in futures_util::future::join_all(updates).await {
        result.unwrap();
    }

    let doc = store.get("affiliates", &id).await.unwrap().unwrap();
    assert_eq!(doc.body["balance"], 5000);
    assert_eq!(doc.body["saleCount"], 20);
}

#[tokio::test]
#[serial]
async fn query_by_nested_field_newest_first() {
    let store = get_test_store().await;

    for (id, completed) in [("o1", false), ("o2", true), ("o3", false)] {
        store
            .create(
                "orders",
                Some(id.into()),
                json!({"buyerId": "u1", "settlement": {"completed": completed}}),
            )
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let pending = store
        .query(
            DocumentQuery::collection("orders")
                .where_eq("settlement.completed", false)
                .newest_first(),
        )
        .await
        .unwrap();

    let ids: Vec<_> = pending.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["o3", "o1"]);

    let limited = store
        .query(DocumentQuery::collection("orders").limit(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id.as_str(), "o1");
}

#[tokio::test]
#[serial]
async fn array_union_marker_is_idempotent() {
    let store = get_test_store().await;
    let id = store
        .create("orders", None, json!({"settlement": {"stockSettled": []}}))
        .await
        .unwrap();

    let mark = DocumentUpdate::new().array_union("settlement.stockSettled", "p1|M|red");
    store.update("orders", &id, mark.clone()).await.unwrap();
    let doc = store.update("orders", &id, mark).await.unwrap();

    assert_eq!(doc.body["settlement"]["stockSettled"], json!(["p1|M|red"]));
}

#[tokio::test]
#[serial]
async fn typed_helpers_against_postgres() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Profile {
        name: String,
    }

    let store = get_test_store().await;
    let id = DocumentId::new("uid-1");
    store
        .create_from("users", Some(id.clone()), &Profile { name: "Ana".into() })
        .await
        .unwrap();

    let profile: Option<Profile> = store.get_as("users", &id).await.unwrap();
    assert_eq!(profile, Some(Profile { name: "Ana".into() }));

    let missing: Option<Profile> = store
        .get_as("users", &DocumentId::new("uid-2"))
        .await
        .unwrap();
    assert!(missing.is_none());
}
