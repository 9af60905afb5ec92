//! The query client.
//!
//! A [`Client`] owns at most one physical connection. With
//! `auto_create_connection` enabled (the default) each call that finds no
//! connection opens one and closes it again before returning, on success and
//! on error alike. Inside [`crate::context::create_session`] the connection is
//! held open across calls instead.
//!
//! All operations take `&mut self`: a client serves one caller at a time.
//! Use one client per concurrent unit of work.

use crate::credentials::Credentials;
use crate::db::driver::{CursorOf, Driver, Fetch, Statement};
use crate::db::params::{prepare, prepare_values};
use crate::db::{ConnectionManager, CursorStrategy, PgDriver};
use crate::error::{DbError, DbResult};
use crate::marshal::{combine_into_return, record_to_row};
use crate::models::{Params, Query, Row, ValueRows};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{Instrument, debug, info, warn};

pub struct Client<D: Driver = PgDriver> {
    manager: ConnectionManager<D>,
    strategy: CursorStrategy<CursorOf<D>>,
    auto_create_connection: bool,
    default_timeout: Option<Duration>,
}

impl Client<PgDriver> {
    /// Create a PostgreSQL client. No connection is opened yet.
    pub fn new(credentials: Credentials) -> Self {
        Self::with_driver(PgDriver, credentials)
    }

    /// Create a PostgreSQL client from a `postgres://` URL.
    pub fn from_url(url: &str) -> DbResult<Self> {
        Ok(Self::new(Credentials::from_url(url)?))
    }
}

impl<D: Driver> Client<D> {
    pub fn with_driver(driver: D, credentials: Credentials) -> Self {
        Self {
            manager: ConnectionManager::new(driver, credentials),
            strategy: CursorStrategy::SingleCommit,
            auto_create_connection: true,
            default_timeout: None,
        }
    }

    /// Set whether calls may open (and then close) their own connection.
    pub fn with_auto_create_connection(mut self, enabled: bool) -> Self {
        self.auto_create_connection = enabled;
        self
    }

    /// Set the timeout applied to calls whose query has none.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn auto_create_connection(&self) -> bool {
        self.auto_create_connection
    }

    pub fn set_auto_create_connection(&mut self, enabled: bool) {
        self.auto_create_connection = enabled;
    }

    pub fn credentials(&self) -> &Credentials {
        self.manager.credentials()
    }

    pub fn is_connected(&self) -> bool {
        self.manager.is_connected()
    }

    /// Whether the client is between `start_transaction` and `end_transaction`.
    pub fn in_transaction(&self) -> bool {
        self.strategy.is_transactional()
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Open the connection.
    ///
    /// Fails with `ConnectionAlreadyEstablished` if one is already open.
    pub async fn create_connection(&mut self) -> DbResult<()> {
        self.manager.create_connection().await
    }

    /// Close the connection and release the active cursor.
    ///
    /// Fails with `ConnectionNotEstablished` if there is none.
    pub async fn close_connection(&mut self) -> DbResult<()> {
        self.manager.close_connection(&mut self.strategy).await
    }

    /// Roll back the open unit of work. The connection stays open.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.manager.rollback().await
    }

    /// Switch to the transactional strategy.
    ///
    /// Statements now share one unit of work until `end_transaction`.
    pub fn start_transaction(&mut self) {
        self.release_cursor();
        self.strategy = CursorStrategy::transactional();
        info!("Transaction started");
    }

    /// Commit the unit of work and switch back to single-commit.
    ///
    /// The switch happens even when the commit fails.
    pub async fn end_transaction(&mut self) -> DbResult<()> {
        let committed = self.strategy.commit(self.manager.connection_mut()).await;
        self.reset_transaction();
        match &committed {
            Ok(()) => info!("Transaction committed"),
            Err(e) => warn!(error = %e, "Transaction commit failed"),
        }
        committed
    }

    /// Set the schema search path for this connection.
    pub async fn set_schema(&mut self, schema: &str) -> DbResult<()> {
        if schema.trim().is_empty() {
            return Err(DbError::invalid_input("Schema name cannot be empty"));
        }
        let sql = format!("SET search_path TO {}", quote_identifier(schema));
        let query = Query::new(sql);
        let statement = Statement::raw(query.sql.as_str());
        self.run("set_schema", &query, vec![statement], Fetch::None)
            .await?;
        debug!(schema = %schema, "Schema applied");
        Ok(())
    }

    // =========================================================================
    // Query operations
    // =========================================================================

    /// Fetch exactly one record.
    ///
    /// Fails with `MultipleRecordsReturned` when two or more rows match and
    /// with `NoRecordsReturned` when none do.
    ///
    /// When the query asks to combine, its parameters are merged into the row
    /// before marshalling and override columns of the same name.
    pub async fn get<T: DeserializeOwned>(&mut self, query: impl Into<Query>) -> DbResult<T> {
        let query = query.into();
        match self.fetch_unique(&query).await? {
            Some(row) => marshal_row(row, &query),
            None => Err(DbError::no_records(&query.sql)),
        }
    }

    /// Like [`get`](Self::get), but returns `default` when no row matches.
    ///
    /// Two or more rows still fail. A combining query merges its parameters
    /// into the serialized default as well.
    pub async fn get_or<T>(&mut self, query: impl Into<Query>, default: T) -> DbResult<T>
    where
        T: DeserializeOwned + Serialize,
    {
        let query = query.into();
        match self.fetch_unique(&query).await? {
            Some(row) => marshal_row(row, &query),
            None => marshal_default(default, &query),
        }
    }

    /// Fetch the first record, if any.
    ///
    /// A row without columns counts as no row.
    pub async fn find<T: DeserializeOwned>(
        &mut self,
        query: impl Into<Query>,
    ) -> DbResult<Option<T>> {
        let query = query.into();
        self.fetch_first(&query)
            .await?
            .map(|row| marshal_row(row, &query))
            .transpose()
    }

    /// Like [`find`](Self::find), but returns `default` when no row matches.
    pub async fn find_or<T>(&mut self, query: impl Into<Query>, default: T) -> DbResult<T>
    where
        T: DeserializeOwned + Serialize,
    {
        let query = query.into();
        match self.fetch_first(&query).await? {
            Some(row) => marshal_row(row, &query),
            None => marshal_default(default, &query),
        }
    }

    /// Fetch every record, in the order the server returns them.
    pub async fn select<T: DeserializeOwned>(
        &mut self,
        query: impl Into<Query>,
    ) -> DbResult<Vec<T>> {
        let query = query.into();
        query.validate()?;
        let statement = prepare(&query.sql, &query.params)?;
        let rows = self
            .run("select", &query, vec![statement], Fetch::All)
            .await?;

        rows.into_iter()
            .map(|row| combine_into_return(row, None))
            .collect()
    }

    /// Run a statement without reading results.
    pub async fn execute(&mut self, query: impl Into<Query>) -> DbResult<()> {
        let query = query.into();
        query.validate()?;
        let statement = prepare(&query.sql, &query.params)?;
        self.run("execute", &query, vec![statement], Fetch::None)
            .await?;
        Ok(())
    }

    /// Run a statement once per parameter set, all in one unit of work.
    ///
    /// Each set is layered over the query's own parameters.
    pub async fn execute_many<I>(
        &mut self,
        query: impl Into<Query>,
        param_sets: I,
    ) -> DbResult<()>
    where
        I: IntoIterator<Item = Params>,
    {
        let query = query.into();
        query.validate()?;
        let statements = param_sets
            .into_iter()
            .map(|set| {
                let mut params = query.params.clone().into_map();
                params.extend(set.into_map());
                prepare(&query.sql, &Params::from(params))
            })
            .collect::<DbResult<Vec<_>>>()?;

        if statements.is_empty() {
            debug!("execute_many called without parameter sets");
            return Ok(());
        }
        self.run("execute_many", &query, statements, Fetch::None)
            .await?;
        Ok(())
    }

    /// Bulk statement over many rows, e.g. `INSERT INTO t (a, b) VALUES %s`.
    ///
    /// The `%s` placeholder is expanded into one tuple per row. Rows are
    /// sent in pages, all inside one unit of work. Empty input does nothing.
    pub async fn execute_values(
        &mut self,
        query: impl Into<Query>,
        rows: ValueRows,
    ) -> DbResult<()> {
        let query = query.into();
        query.validate()?;
        if rows.is_empty() {
            debug!("execute_values called without rows");
            return Ok(());
        }
        rows.width()?;

        let statements = rows
            .pages()
            .map(|page| prepare_values(&query.sql, &query.params, page))
            .collect::<DbResult<Vec<_>>>()?;
        self.run("execute_values", &query, statements, Fetch::None)
            .await?;
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Drop back to single-commit without committing.
    pub(crate) fn reset_transaction(&mut self) {
        self.release_cursor();
        self.strategy = CursorStrategy::SingleCommit;
    }

    /// Drop the connection without awaiting a close.
    ///
    /// The strategy stays as it is; only the scope that started a
    /// transaction ends it.
    pub(crate) fn discard_connection(&mut self) -> bool {
        self.strategy.forget();
        self.manager.discard()
    }

    fn release_cursor(&mut self) {
        if let Some(connection) = self.manager.connection_mut() {
            self.strategy.close(connection);
        }
    }

    /// Open a connection for this call if allowed and needed.
    ///
    /// Returns whether the call owns the connection and must close it.
    async fn acquire_connection(&mut self) -> DbResult<bool> {
        if self.manager.is_connected() {
            return Ok(false);
        }
        if !self.auto_create_connection {
            return Err(DbError::ConnectionNotEstablished);
        }
        self.manager.create_connection().await?;
        debug!("Auto-created connection for call");
        Ok(true)
    }

    async fn fetch_unique(&mut self, query: &Query) -> DbResult<Option<Row>> {
        query.validate()?;
        let statement = prepare(&query.sql, &query.params)?;
        let mut rows = self
            .run("get", query, vec![statement], Fetch::AtMost(2))
            .await?;

        if rows.len() >= 2 {
            return Err(DbError::multiple_records(&query.sql));
        }
        Ok(rows.pop())
    }

    async fn fetch_first(&mut self, query: &Query) -> DbResult<Option<Row>> {
        query.validate()?;
        let statement = prepare(&query.sql, &query.params)?;
        let rows = self
            .run("find", query, vec![statement], Fetch::AtMost(1))
            .await?;

        Ok(rows.into_iter().next().filter(|row| !row.is_empty()))
    }

    async fn run(
        &mut self,
        operation: &'static str,
        query: &Query,
        statements: Vec<Statement>,
        fetch: Fetch,
    ) -> DbResult<Vec<Row>> {
        let span = query_span(operation, query, statements.len());
        let timeout = query.timeout.or(self.default_timeout);

        async move {
            debug!(
                params = query.params.len(),
                statements = statements.len(),
                timeout_ms = ?timeout.map(|t| t.as_millis()),
                "Executing query"
            );

            if !self.acquire_connection().await? {
                return self.run_statements(&statements, fetch, timeout).await;
            }

            let mut guard = AutoConnection {
                client: self,
                armed: true,
            };
            let result = guard
                .client
                .run_statements(&statements, fetch, timeout)
                .await;
            guard.armed = false;
            let closed = guard.client.close_connection().await;

            match (result, closed) {
                (Ok(rows), Ok(())) => Ok(rows),
                (Ok(_), Err(e)) => Err(e),
                (Err(e), Ok(())) => Err(e),
                (Err(e), Err(close_err)) => {
                    warn!(error = %close_err, "Failed to close auto-created connection");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_statements(
        &mut self,
        statements: &[Statement],
        fetch: Fetch,
        timeout: Option<Duration>,
    ) -> DbResult<Vec<Row>> {
        let execution = self
            .strategy
            .execute(self.manager.connection_mut(), statements, fetch);

        let rows = match timeout {
            Some(limit) => tokio::time::timeout(limit, execution)
                .await
                .map_err(|_| DbError::timeout("query execution", limit.as_millis() as u64))??,
            None => execution.await?,
        };

        tracing::Span::current().record("db.response.returned_rows", rows.len());
        Ok(rows)
    }
}

/// Discards a per-call connection if the call is cancelled or panics.
struct AutoConnection<'a, D: Driver> {
    client: &'a mut Client<D>,
    armed: bool,
}

impl<D: Driver> Drop for AutoConnection<'_, D> {
    fn drop(&mut self) {
        if self.armed {
            self.client.discard_connection();
        }
    }
}

fn query_span(operation: &'static str, query: &Query, batch_size: usize) -> tracing::Span {
    let context = query.context.as_ref();
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.query.text = %query.sql,
        db.operation.name = context
            .and_then(|c| c.operation_name.as_deref())
            .unwrap_or(operation),
        db.collection.name = context.and_then(|c| c.primary_table_name.as_deref()),
        db.query.summary = context.and_then(|c| c.query_summary.as_deref()),
        db.operation.batch.size = batch_size,
        db.response.returned_rows = tracing::field::Empty,
    )
}

fn marshal_row<T: DeserializeOwned>(row: Row, query: &Query) -> DbResult<T> {
    let extra = query.combine_into_return.then_some(&query.params);
    combine_into_return(row, extra)
}

fn marshal_default<T: DeserializeOwned + Serialize>(default: T, query: &Query) -> DbResult<T> {
    if !query.combine_into_return {
        return Ok(default);
    }
    let row = record_to_row(&default)?;
    combine_into_return(row, Some(&query.params))
}

/// Quote a schema name as a PostgreSQL identifier.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
