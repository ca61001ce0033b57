//! PostgreSQL Store Tests
//!
//! Run only when `PGKV_TEST_DATABASE_URL` points at a database the tests may
//! create schemas in. Each test works in its own table (via the service key)
//! and drops it afterwards.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use futures_util::StreamExt;
use pgkv::query::Filter;
use pgkv::store::{BlockingDocumentStore, DocumentStore, Page, PgBackend, StoreConfig};
use serde_json::json;
use uuid::Uuid;

use common::{filter_cases, people, Person};

// =============================================================================
// Helper Functions
// =============================================================================

const TEST_DATABASE_URL_ENV: &str = "PGKV_TEST_DATABASE_URL";

fn test_config() -> Option<StoreConfig> {
    let url = std::env::var(TEST_DATABASE_URL_ENV).ok().filter(|u| !u.trim().is_empty())?;
    Some(StoreConfig::new(url).with_service_key(format!("t{}", Uuid::new_v4().simple())))
}

async fn open() -> Option<DocumentStore<PgBackend>> {
    let Some(config) = test_config() else {
        eprintln!("{} not set, skipping", TEST_DATABASE_URL_ENV);
        return None;
    };
    Some(DocumentStore::connect(&config).await.unwrap())
}

async fn drop_table(store: &DocumentStore<PgBackend>) {
    let backend = store.backend();
    sqlx::query(&format!("DROP TABLE IF EXISTS {}", backend.table().qualified()))
        .execute(backend.pool())
        .await
        .unwrap();
}

// =============================================================================
// Filter Correctness Tests
// =============================================================================

/// Compiled predicates select exactly what the oracle accepts.
#[tokio::test]
async fn test_filter_correctness_against_postgres() {
    let Some(store) = open().await else { return };
    for (id, p) in people() {
        assert!(store.create("P", id, &p, None).await.unwrap());
    }

    for (text, oracle) in filter_cases() {
        let filter = Filter::parse(text).unwrap();
        let names: Vec<String> = store
            .list::<Person>("P", Some(&filter), Page::default())
            .unwrap()
            .map(|p| p.unwrap().name)
            .collect()
            .await;
        let expected: Vec<String> = people()
            .into_iter()
            .filter(|(_, p)| oracle(p))
            .map(|(_, p)| p.name)
            .collect();

        assert_eq!(names, expected, "predicate: {}", text);
        assert_eq!(
            store.count::<Person>("P", Some(&filter)).await.unwrap(),
            expected.len() as u64,
            "count for: {}",
            text
        );
    }

    drop_table(&store).await;
}

/// Hostile text is matched literally by the database.
#[tokio::test]
async fn test_injection_attempts_match_literally() {
    let Some(store) = open().await else { return };
    let hostile = ["x' OR '1'='1", "%", "_", "a\\%b", "'; DROP TABLE t; --", "\"quoted\""];
    for (i, name) in hostile.iter().enumerate() {
        let mut p = people()[0].1.clone();
        p.name = name.to_string();
        store.create("P", &format!("h{}", i), &p, None).await.unwrap();
    }

    for name in hostile {
        let filter = Filter::parse("x => x.name == @n").unwrap().bind("n", name);
        assert_eq!(store.count::<Person>("P", Some(&filter)).await.unwrap(), 1, "{}", name);

        let filter = Filter::parse("x => x.name.StartsWith(@n)").unwrap().bind("n", name);
        let expected = hostile.iter().filter(|h| h.starts_with(name)).count() as u64;
        assert_eq!(store.count::<Person>("P", Some(&filter)).await.unwrap(), expected, "{}", name);
    }

    drop_table(&store).await;
}

// =============================================================================
// Boundary Tests
// =============================================================================

/// Expired rows are hidden from reads and removed only by the sweep.
#[tokio::test]
async fn test_expiration_boundary() {
    let Some(store) = open().await else { return };
    let past = Utc::now() - Duration::minutes(5);
    let future = Utc::now() + Duration::hours(1);

    store.create("P", "gone", &json!({"n": 1}), Some(past)).await.unwrap();
    store.create("P", "later", &json!({"n": 2}), Some(future)).await.unwrap();
    store.create("P", "forever", &json!({"n": 3}), None).await.unwrap();

    assert_eq!(store.get_raw("P", "gone").await.unwrap(), None);
    assert!(!store.exists("P", "gone").await.unwrap());
    assert!(store.exists("P", "forever").await.unwrap());
    assert_eq!(store.count::<Person>("P", None).await.unwrap(), 2);

    assert_eq!(store.remove_all_expired("P").await.unwrap(), 1);
    assert_eq!(store.remove_all_expired("P").await.unwrap(), 0);
    assert!(store.create("P", "gone", &json!({"n": 4}), None).await.unwrap());

    drop_table(&store).await;
}

/// Create, update and upsert against present and absent keys.
#[tokio::test]
async fn test_key_conflict_boundary() {
    let Some(store) = open().await else { return };

    assert!(store.create("pid", "k", "v1", None).await.unwrap());
    assert!(!store.create("pid", "k", "v2", None).await.unwrap());
    assert_eq!(store.get::<String>("pid", "k").await.unwrap().as_deref(), Some("v1"));

    assert!(!store.update("pid", "missing", "v", None).await.unwrap());
    assert!(!store.exists("pid", "missing").await.unwrap());

    assert!(store.upsert("pid", "k", "v3", None).await.unwrap());
    assert!(store.upsert("pid", "fresh", "v4", None).await.unwrap());
    assert_eq!(store.get::<String>("pid", "k").await.unwrap().as_deref(), Some("v3"));
    assert_eq!(store.get::<String>("pid", "fresh").await.unwrap().as_deref(), Some("v4"));

    drop_table(&store).await;
}

/// Concurrent creates on one key have exactly one winner.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_single_winner() {
    let Some(store) = open().await else { return };
    let store = Arc::new(store);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.create("P", "race", &format!("writer-{}", i), None).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    drop_table(&store).await;
}

// =============================================================================
// Blocking Mode Tests
// =============================================================================

/// A listing built outside any runtime reads its rows once a runtime polls it.
#[test]
fn test_list_outside_runtime_is_lazy() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let Some(store) = runtime.block_on(open()) else { return };
    for (id, p) in people() {
        assert!(runtime.block_on(store.create("P", id, &p, None)).unwrap());
    }

    let filter = Filter::parse("x => x.active").unwrap();
    let stream = store.list::<Person>("P", Some(&filter), Page::default()).unwrap();
    let names: Vec<String> = runtime.block_on(stream.map(|p| p.unwrap().name).collect());
    assert_eq!(names.len(), people().into_iter().filter(|(_, p)| p.active).count());

    runtime.block_on(drop_table(&store));
}

/// Blocking store pages through a streamed listing.
#[test]
fn test_blocking_list_pages() {
    let Some(config) = test_config() else {
        eprintln!("{} not set, skipping", TEST_DATABASE_URL_ENV);
        return;
    };
    let store = BlockingDocumentStore::connect(&config).unwrap();
    for (id, p) in people() {
        store.create("P", id, &p, None).unwrap();
    }

    let filter = Filter::parse("x => x.active").unwrap();
    let names: Vec<String> = store
        .list::<Person>("P", Some(&filter), Page::new(Some(2), Some(1)))
        .unwrap()
        .map(|p| p.unwrap().name)
        .collect();
    assert_eq!(names, vec!["Carol", "Eve 50%"]);
    assert_eq!(store.remove_all::<Person>("P", None).unwrap(), 6);

    let table = store.inner().backend().table().qualified();
    drop(store);
    let runtime = tokio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let pool = sqlx::PgPool::connect(&config.connection_string).await.unwrap();
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&pool)
            .await
            .unwrap();
    });
}
