//! Integration tests for parameterized query execution against SQLite.

use flashcard_db::db::{Pool, PoolRegistry, QueryExecutor};
use flashcard_db::error::{DbError, QueryErrorKind};
use flashcard_db::models::{ConnectionConfig, DatabaseType, Query, QueryParam};
use std::sync::Arc;
use tempfile::TempDir;

/// A Cards table holding three cards in set 42 and two in set 7.
async fn cards_fixture() -> (TempDir, Arc<PoolRegistry>, Arc<Pool>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cards.db");
    let config = ConnectionConfig::new(DatabaseType::SQLite, path.to_string_lossy()).unwrap();
    let registry = Arc::new(PoolRegistry::new());
    let pool = registry.get(&config.pool_name(), &config).await.unwrap();

    pool.request()
        .execute(
            "CREATE TABLE Cards (
                ID INTEGER PRIMARY KEY AUTOINCREMENT,
                Card_Set_ID INTEGER NOT NULL,
                Card_Front TEXT NOT NULL,
                Card_Back TEXT NOT NULL
            )",
        )
        .await
        .expect("Failed to create Cards");

    let seed = [
        (42, "perro", "dog"),
        (42, "gato", "cat"),
        (7, "chien", "dog"),
        (42, "pájaro", "bird"),
        (7, "chat", "cat"),
    ];
    for (set_id, front, back) in seed {
        pool.request()
            .input(set_id)
            .input(front)
            .input(back)
            .execute("INSERT INTO Cards (Card_Set_ID, Card_Front, Card_Back) VALUES (?, ?, ?)")
            .await
            .expect("Failed to seed Cards");
    }

    (dir, registry, pool)
}

#[tokio::test]
async fn test_positional_binding_filters_rows() {
    let (_dir, _registry, pool) = cards_fixture().await;

    let result = pool
        .request()
        .input(42)
        .query("SELECT * FROM Cards WHERE Card_Set_ID = ?")
        .await
        .unwrap();

    assert_eq!(result.rows.len(), 3);
    assert!(result.rows.iter().all(|row| row["Card_Set_ID"] == 42));
    assert_eq!(
        result.columns,
        vec!["ID", "Card_Set_ID", "Card_Front", "Card_Back"]
    );
}

#[tokio::test]
async fn test_numbered_and_named_forms() {
    let (_dir, _registry, pool) = cards_fixture().await;

    let dollar = pool
        .request()
        .input(7)
        .input("dog")
        .query("SELECT Card_Front FROM Cards WHERE Card_Set_ID = $1 AND Card_Back = $2")
        .await
        .unwrap();
    assert_eq!(dollar.rows.len(), 1);
    assert_eq!(dollar.rows[0]["Card_Front"], "chien");

    let named = pool
        .request()
        .input("cat")
        .query("SELECT Card_Front FROM Cards WHERE Card_Back = @param0 ORDER BY Card_Front")
        .await
        .unwrap();
    let fronts: Vec<_> = named.rows.iter().map(|r| r["Card_Front"].clone()).collect();
    assert_eq!(fronts, vec!["chat", "gato"]);
}

#[tokio::test]
async fn test_repeated_placeholder_binds_one_value() {
    let (_dir, _registry, pool) = cards_fixture().await;

    let result = pool
        .request()
        .input("dog")
        .query("SELECT ID FROM Cards WHERE Card_Front = $1 OR Card_Back = $1")
        .await
        .unwrap();
    assert_eq!(result.rows.len(), 2);
}

#[tokio::test]
async fn test_value_count_mismatch_is_rejected_before_execution() {
    let (_dir, _registry, pool) = cards_fixture().await;

    // The table does not exist, so reaching the server would give a different error
    let err = pool
        .request()
        .query("SELECT * FROM Missing WHERE ID = ?")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::ParameterMismatch {
            expected: 1,
            actual: 0
        }
    ));

    let err = pool
        .request()
        .input(1)
        .input(2)
        .execute("DELETE FROM Missing WHERE ID = ?")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::ParameterMismatch {
            expected: 1,
            actual: 2
        }
    ));
}

#[tokio::test]
async fn test_bound_text_is_never_sql() {
    let (_dir, _registry, pool) = cards_fixture().await;

    let result = pool
        .request()
        .input("42 OR 1=1")
        .query("SELECT * FROM Cards WHERE Card_Set_ID = ?")
        .await
        .unwrap();
    assert!(result.is_empty());

    let affected = pool
        .request()
        .input("x'; DROP TABLE Cards; --")
        .execute("DELETE FROM Cards WHERE Card_Front = ?")
        .await
        .unwrap();
    assert_eq!(affected, 0);

    let remaining = pool.request().query("SELECT COUNT(*) AS n FROM Cards").await.unwrap();
    assert_eq!(remaining.rows[0]["n"], 5);
}

#[tokio::test]
async fn test_placeholders_inside_literals_are_ignored() {
    let (_dir, _registry, pool) = cards_fixture().await;

    let result = pool
        .request()
        .input(42)
        .query("SELECT '?' AS mark, COUNT(*) AS n FROM Cards WHERE Card_Set_ID = ? -- trailing ?")
        .await
        .unwrap();
    assert_eq!(result.rows[0]["mark"], "?");
    assert_eq!(result.rows[0]["n"], 3);
}

#[tokio::test]
async fn test_value_types_round_trip() {
    let (_dir, _registry, pool) = cards_fixture().await;
    pool.request()
        .execute("CREATE TABLE scratch (n INTEGER, f REAL, t TEXT, b BLOB, z TEXT)")
        .await
        .unwrap();

    pool.request()
        .input(-9_000_000_000i64)
        .input(2.5)
        .input("¿Cómo estás? 🙂")
        .input(vec![0xde_u8, 0xad, 0xbe, 0xef])
        .input(QueryParam::Null)
        .execute("INSERT INTO scratch (n, f, t, b, z) VALUES (?, ?, ?, ?, ?)")
        .await
        .unwrap();

    let result = pool.request().query("SELECT * FROM scratch").await.unwrap();
    let row = &result.rows[0];
    assert_eq!(row["n"], -9_000_000_000i64);
    assert_eq!(row["f"], 2.5);
    assert_eq!(row["t"], "¿Cómo estás? 🙂");
    assert_eq!(row["b"], "3q2+7w==");
    assert!(row["z"].is_null());
}

#[tokio::test]
async fn test_server_errors_are_classified() {
    let (_dir, _registry, pool) = cards_fixture().await;

    let err = pool.request().query("SELEC nonsense").await.unwrap_err();
    assert_eq!(err.query_kind(), Some(QueryErrorKind::Other));
    assert!(!err.is_deadlock());

    let err = pool
        .request()
        .input(QueryParam::Null)
        .execute("INSERT INTO Cards (Card_Set_ID, Card_Front, Card_Back) VALUES (1, ?, 'x')")
        .await
        .unwrap_err();
    assert_eq!(err.query_kind(), Some(QueryErrorKind::Constraint));
}

#[tokio::test]
async fn test_executor_runs_query_values() {
    let (_dir, _registry, pool) = cards_fixture().await;
    let executor = QueryExecutor::new();

    let query = Query::new("SELECT Card_Front FROM Cards WHERE Card_Set_ID = ? AND Card_Back = ?")
        .bind(42)
        .bind("bird");
    let result = executor.run(&pool, &query).await.unwrap();
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["Card_Front"], "pájaro");

    let update = Query::new("UPDATE Cards SET Card_Back = ? WHERE Card_Set_ID = ?")
        .bind("animal")
        .bind(7);
    assert_eq!(executor.run_write(&pool, &update).await.unwrap(), 2);
}
