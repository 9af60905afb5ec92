//! Cursor strategies.
//!
//! A client runs statements through one of two strategies:
//!
//! - `SingleCommit`: each call opens its own cursor, runs, commits and
//!   releases the cursor before returning. Every call is its own unit of work.
//! - `Transactional`: one cursor is opened lazily and reused until the
//!   strategy is closed. Nothing is committed until `commit` is called.
//!
//! Strategies never own the connection; it is passed in per call.

use crate::db::connection::require_connection;
use crate::db::driver::{DriverConnection, Fetch, Statement};
use crate::error::DbResult;
use crate::models::Row;
use tracing::debug;

#[derive(Debug)]
pub enum CursorStrategy<C> {
    SingleCommit,
    Transactional { cursor: Option<C> },
}

impl<C> Default for CursorStrategy<C> {
    fn default() -> Self {
        Self::SingleCommit
    }
}

impl<C: Send> CursorStrategy<C> {
    /// A fresh transactional strategy with no cursor yet.
    pub fn transactional() -> Self {
        Self::Transactional { cursor: None }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, Self::Transactional { .. })
    }

    /// Run statements in order, collecting the fetched rows of each.
    ///
    /// Stops at the first failing statement. Under `SingleCommit` a failure
    /// skips the commit; rolling back is left to the caller.
    pub async fn execute<Conn>(
        &mut self,
        connection: Option<&mut Conn>,
        statements: &[Statement],
        fetch: Fetch,
    ) -> DbResult<Vec<Row>>
    where
        Conn: DriverConnection<Cursor = C>,
    {
        let conn = require_connection(connection)?;

        match self {
            Self::SingleCommit => {
                let mut cursor = conn.cursor();
                let result = run_all(conn, &mut cursor, statements, fetch).await;
                conn.close_cursor(cursor);
                let rows = result?;
                conn.commit().await?;
                Ok(rows)
            }
            Self::Transactional { cursor } => {
                if cursor.is_none() {
                    debug!("Opening transaction cursor");
                }
                let cursor = cursor.get_or_insert_with(|| conn.cursor());
                run_all(conn, cursor, statements, fetch).await
            }
        }
    }

    /// Commit the current unit of work.
    pub async fn commit<Conn>(&mut self, connection: Option<&mut Conn>) -> DbResult<()>
    where
        Conn: DriverConnection<Cursor = C>,
    {
        let conn = require_connection(connection)?;
        conn.commit().await?;
        Ok(())
    }

    /// Release whatever the strategy holds on `connection`.
    pub fn close<Conn>(&mut self, connection: &mut Conn)
    where
        Conn: DriverConnection<Cursor = C>,
    {
        if let Self::Transactional { cursor } = self {
            if let Some(cursor) = cursor.take() {
                connection.close_cursor(cursor);
            }
        }
    }

    /// Drop the held cursor without a connection to close it on.
    ///
    /// Used when the connection itself is gone; the strategy is kept.
    pub fn forget(&mut self) {
        if let Self::Transactional { cursor } = self {
            if cursor.take().is_some() {
                debug!("Transaction cursor forgotten with its connection");
            }
        }
    }
}

async fn run_all<Conn: DriverConnection>(
    conn: &mut Conn,
    cursor: &mut Conn::Cursor,
    statements: &[Statement],
    fetch: Fetch,
) -> DbResult<Vec<Row>> {
    let mut rows = Vec::new();
    for statement in statements {
        rows.extend(conn.run(cursor, statement, fetch).await?);
    }
    Ok(rows)
}
