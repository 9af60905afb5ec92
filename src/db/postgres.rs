//! PostgreSQL driver over a single `sqlx::PgConnection`.
//!
//! sqlx runs every statement in autocommit mode. The client instead expects
//! cursor-style semantics where a unit of work is open from the first
//! statement until `commit` or `rollback`, so the connection issues an
//! implicit `BEGIN` before the first statement and ends the block on
//! commit/rollback. Closing a connection with an open block abandons it and
//! the server rolls it back.

use crate::credentials::Credentials;
use crate::db::driver::{Driver, DriverConnection, Fetch, Statement};
use crate::db::params::{PgParam, coerce_param};
use crate::db::types::RowToJson;
use crate::models::Row;
use futures_util::StreamExt;
use sqlx::postgres::{PgRow, PgStatement};
use sqlx::{Connection, Either, Executor, PgConnection, Statement as _, TypeInfo};
use tracing::{debug, info};

/// Connects to PostgreSQL with sqlx.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgDriver;

impl Driver for PgDriver {
    type Connection = PgHandle;

    async fn connect(&self, credentials: &Credentials) -> Result<PgHandle, sqlx::Error> {
        let conn = PgConnection::connect_with(&credentials.connect_options()).await?;
        info!(
            host = %credentials.host(),
            port = credentials.port(),
            database = %credentials.database(),
            "Connected to PostgreSQL"
        );
        Ok(PgHandle {
            conn,
            in_transaction: false,
            next_cursor: 0,
        })
    }
}

/// An open PostgreSQL connection.
pub struct PgHandle {
    conn: PgConnection,
    in_transaction: bool,
    next_cursor: u64,
}

/// Statement handle on a [`PgHandle`].
///
/// sqlx has no server-side cursor object for plain statements, so this only
/// tracks identity and usage for logging.
#[derive(Debug)]
pub struct PgCursor {
    id: u64,
    statements: u64,
}

impl PgHandle {
    /// Whether a unit of work is currently open on the server.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn begin_if_needed(&mut self) -> Result<(), sqlx::Error> {
        if !self.in_transaction {
            self.conn.execute("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    async fn fetch_rows(
        &mut self,
        statement: &Statement,
        limit: usize,
    ) -> Result<Vec<PgRow>, sqlx::Error> {
        // Without binds the simple query protocol is used, which also accepts
        // statements that cannot be prepared
        let results = if statement.binds.is_empty() {
            self.conn
                .fetch(statement.sql.as_str())
                .take(limit)
                .collect::<Vec<_>>()
                .await
        } else {
            let (prepared, params) = self.prepare_binds(statement).await?;
            let query = params
                .into_iter()
                .fold(prepared.query(), |query, param| param.bind_to(query));
            query.fetch(&mut self.conn).take(limit).collect::<Vec<_>>().await
        };
        results.into_iter().collect()
    }

    async fn execute_only(&mut self, statement: &Statement) -> Result<u64, sqlx::Error> {
        let result = if statement.binds.is_empty() {
            self.conn.execute(statement.sql.as_str()).await?
        } else {
            let (prepared, params) = self.prepare_binds(statement).await?;
            let query = params
                .into_iter()
                .fold(prepared.query(), |query, param| param.bind_to(query));
            query.execute(&mut self.conn).await?
        };
        Ok(result.rows_affected())
    }

    /// Prepare the statement and convert each bind to the parameter type the
    /// server inferred for it.
    async fn prepare_binds<'q>(
        &mut self,
        statement: &'q Statement,
    ) -> Result<(PgStatement<'q>, Vec<PgParam>), sqlx::Error> {
        let prepared = (&mut self.conn).prepare(statement.sql.as_str()).await?;
        let types = match prepared.parameters() {
            Some(Either::Left(types)) => types,
            _ => &[],
        };
        if types.len() != statement.binds.len() {
            return Err(sqlx::Error::Protocol(format!(
                "statement expects {} parameters, {} bound",
                types.len(),
                statement.binds.len()
            )));
        }

        let params = statement
            .binds
            .iter()
            .zip(types)
            .enumerate()
            .map(|(i, (value, ty))| {
                coerce_param(value, ty.name()).map_err(|msg| {
                    sqlx::Error::Encode(format!("parameter ${}: {msg}", i + 1).into())
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((prepared, params))
    }
}

impl DriverConnection for PgHandle {
    type Cursor = PgCursor;

    fn cursor(&mut self) -> PgCursor {
        self.next_cursor += 1;
        PgCursor {
            id: self.next_cursor,
            statements: 0,
        }
    }

    fn close_cursor(&mut self, cursor: PgCursor) {
        debug!(cursor = cursor.id, statements = cursor.statements, "Cursor closed");
    }

    async fn run(
        &mut self,
        cursor: &mut PgCursor,
        statement: &Statement,
        fetch: Fetch,
    ) -> Result<Vec<Row>, sqlx::Error> {
        self.begin_if_needed().await?;
        cursor.statements += 1;

        let rows = match fetch {
            Fetch::None => {
                let rows_affected = self.execute_only(statement).await?;
                debug!(cursor = cursor.id, rows_affected, "Statement executed");
                return Ok(Vec::new());
            }
            Fetch::AtMost(limit) => self.fetch_rows(statement, limit).await?,
            Fetch::All => self.fetch_rows(statement, usize::MAX).await?,
        };
        debug!(cursor = cursor.id, rows = rows.len(), "Statement fetched");
        rows.iter().map(RowToJson::to_row).collect()
    }

    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        if self.in_transaction {
            // A failed COMMIT still ends the block; the server rolls it back
            self.in_transaction = false;
            self.conn.execute("COMMIT").await?;
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        if self.in_transaction {
            // The block is gone server-side even if ROLLBACK reports an error
            self.in_transaction = false;
            self.conn.execute("ROLLBACK").await?;
        }
        Ok(())
    }

    async fn close(self) -> Result<(), sqlx::Error> {
        if self.in_transaction {
            debug!("Closing connection with an open unit of work");
        }
        self.conn.close().await
    }
}
