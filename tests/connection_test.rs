//! Integration tests for the connection lifecycle.

mod common;

use common::{Event, MockDriver, assert_paired, client};
use pgrecord::{DbError, Query, Row};
use serde_json::json;

#[tokio::test]
async fn test_create_connection_twice_fails() {
    let driver = MockDriver::new();
    let mut client = client(&driver);

    client.create_connection().await.unwrap();
    let err = client.create_connection().await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionAlreadyEstablished));

    // The first connection is still the one in use
    assert!(client.is_connected());
    assert_eq!(driver.count(|e| matches!(e, Event::Connect(_))), 1);

    client.close_connection().await.unwrap();
    assert_paired(&driver);
}

#[tokio::test]
async fn test_close_without_connection_fails() {
    let driver = MockDriver::new();
    let mut client = client(&driver);

    let err = client.close_connection().await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionNotEstablished));
    let err = client.rollback().await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionNotEstablished));
    assert!(driver.events().is_empty());
}

#[tokio::test]
async fn test_rollback_keeps_connection_open() {
    let driver = MockDriver::new();
    let mut client = client(&driver);

    client.create_connection().await.unwrap();
    client.rollback().await.unwrap();
    assert!(client.is_connected());

    client.close_connection().await.unwrap();
    assert!(!client.is_connected());
    assert_eq!(
        driver.events(),
        vec![Event::Connect(1), Event::Rollback, Event::Close(1)]
    );
}

#[tokio::test]
async fn test_auto_connections_are_paired() {
    let driver = MockDriver::new()
        .with_rows("select one", vec![json!({"id": 1})])
        .with_rows("select two", vec![json!({"id": 1}), json!({"id": 2})]);
    let mut client = client(&driver);

    let _: Row = client.get("select one").await.unwrap();
    let _ = client.get::<Row>("select two").await.unwrap_err();
    let _ = client.get::<Row>("select none").await.unwrap_err();
    let _: Option<Row> = client.find("select one").await.unwrap();
    let _: Vec<Row> = client.select("select two").await.unwrap();
    client.execute("insert into t values (1)").await.unwrap();
    let _ = client.execute("insert fail").await.unwrap_err();
    let _ = client.select::<Row>("   ").await.unwrap_err();

    assert!(!client.is_connected());
    assert_paired(&driver);
    // The blank query never reached the driver
    assert_eq!(driver.count(|e| matches!(e, Event::Connect(_))), 7);
    assert_eq!(driver.count(|e| matches!(e, Event::Close(_))), 7);
}

#[tokio::test]
async fn test_auto_connection_closed_after_marshall_error() {
    #[derive(Debug, serde::Deserialize, serde::Serialize)]
    struct Named {
        name: String,
    }

    let driver = MockDriver::new().with_rows("select id", vec![json!({"id": 1})]);
    let mut client = client(&driver);

    let err = client.get::<Named>("select id").await.unwrap_err();
    assert!(matches!(err, DbError::MarshallRecord { .. }));
    assert!(!client.is_connected());
    assert_paired(&driver);
}

#[tokio::test]
async fn test_without_auto_connection_operations_fail() {
    let driver = MockDriver::new();
    let mut client = client(&driver).with_auto_create_connection(false);

    let err = client.execute("insert into t values (1)").await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionNotEstablished));
    let err = client.select::<Row>("select 1").await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionNotEstablished));
    assert!(driver.events().is_empty());
}

#[tokio::test]
async fn test_explicit_connection_is_reused_and_not_closed() {
    let driver = MockDriver::new();
    let mut client = client(&driver);

    client.create_connection().await.unwrap();
    client.execute("insert into t values (1)").await.unwrap();
    client.execute("insert into t values (2)").await.unwrap();
    assert!(client.is_connected());

    assert_eq!(
        driver.events(),
        vec![
            Event::Connect(1),
            Event::OpenCursor(1),
            Event::Execute("insert into t values (1)".to_string()),
            Event::CloseCursor(1),
            Event::Commit,
            Event::OpenCursor(2),
            Event::Execute("insert into t values (2)".to_string()),
            Event::CloseCursor(2),
            Event::Commit,
        ]
    );

    client.close_connection().await.unwrap();
    assert_paired(&driver);
}

#[tokio::test]
async fn test_single_commit_failure_skips_commit_and_rollback() {
    let driver = MockDriver::new();
    let mut client = client(&driver);
    client.create_connection().await.unwrap();
    driver.clear_events();

    let err = client.execute("insert fail").await.unwrap_err();
    assert!(err.is_driver_error());
    assert_eq!(
        driver.events(),
        vec![
            Event::OpenCursor(1),
            Event::Execute("insert fail".to_string()),
            Event::CloseCursor(1),
        ]
    );

    client.close_connection().await.unwrap();
}

#[tokio::test]
async fn test_connect_failure_leaves_client_disconnected() {
    let driver = MockDriver::new();
    driver.set_fail_connect(true);
    let mut client = client(&driver);

    let err = client
        .execute(Query::new("insert into t values (1)"))
        .await
        .unwrap_err();
    assert!(err.is_driver_error());
    assert!(err.to_string().contains("connection refused"));
    assert!(!client.is_connected());

    driver.set_fail_connect(false);
    client.execute("insert into t values (1)").await.unwrap();
    assert_paired(&driver);
}
