//! Driver boundary.
//!
//! The client never talks to sqlx directly: it goes through [`Driver`] and
//! [`DriverConnection`], which mirror the classic cursor-based database API
//! (connect, open a cursor, execute and fetch, commit, rollback, close).
//! [`crate::db::postgres::PgDriver`] is the production implementation.

use crate::credentials::Credentials;
use crate::models::Row;
use serde_json::Value as JsonValue;
use std::future::Future;

/// How many rows to pull back after a statement runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetch {
    /// Run the statement without reading any rows
    None,
    /// Read at most this many rows; the rest of the result is discarded
    AtMost(usize),
    All,
}

/// A statement ready for the driver: SQL in `$n` form plus its bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<JsonValue>,
}

impl Statement {
    /// A statement with no bind values, sent as-is.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            binds: Vec::new(),
        }
    }
}

/// Opens physical connections.
pub trait Driver: Send + Sync {
    type Connection: DriverConnection;

    fn connect(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<Self::Connection, sqlx::Error>> + Send;
}

/// A live physical connection.
///
/// Statements run through a cursor. Cursors are cheap handles owned by the
/// caller; they borrow the connection only while a statement runs.
pub trait DriverConnection: Send {
    type Cursor: Send;

    fn cursor(&mut self) -> Self::Cursor;

    fn close_cursor(&mut self, cursor: Self::Cursor);

    /// Run one statement and fetch its rows.
    fn run(
        &mut self,
        cursor: &mut Self::Cursor,
        statement: &Statement,
        fetch: Fetch,
    ) -> impl Future<Output = Result<Vec<Row>, sqlx::Error>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn rollback(&mut self) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Close the connection. Any open unit of work is abandoned.
    fn close(self) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

/// Cursor type of a driver's connections.
pub type CursorOf<D> = <<D as Driver>::Connection as DriverConnection>::Cursor;
