//! Session and transaction scopes.
//!
//! Both helpers run an async body against the client and clean up on every
//! exit path:
//!
//! - on success the scope closes what it opened (session) or commits
//!   (transaction);
//! - on error it rolls back first, then releases;
//! - if the body panics or the scope future is dropped, a guard restores the
//!   client state and discards the connection the scope was responsible for,
//!   since nothing can be awaited from `Drop`. The server rolls back whatever
//!   was open on a discarded connection.
//!
//! ```no_run
//! # use pgrecord::{Client, DbError};
//! # use pgrecord::context::{create_session, create_transaction};
//! # async fn demo(client: &mut Client) -> Result<(), DbError> {
//! create_session(client, Some("reporting"), async |client: &mut Client| {
//!     create_transaction(client, async |client: &mut Client| {
//!         client.execute("insert into audit (event) values ('login')").await?;
//!         client.execute("update users set last_login = now()").await?;
//!         Ok::<_, DbError>(())
//!     })
//!     .await
//! })
//! .await
//! # }
//! ```

use crate::client::Client;
use crate::db::driver::Driver;
use crate::error::{DbError, DbResult};
use crate::models::{Query, Row};
use tracing::{debug, info, warn};

/// Hold a connection open for the duration of `body`.
///
/// While the session runs, `auto_create_connection` is off so no call inside
/// opens or closes a connection of its own. A connection is created if the
/// client has none, and closed again when the session ends. When `schema` is
/// given it becomes the search path; on a connection the session did not
/// create, the previous search path is put back on the way out.
///
/// If `body` (or applying the schema) fails, the open unit of work is rolled
/// back before the connection is released and the body's error is returned.
/// The previous `auto_create_connection` setting is always restored last.
pub async fn create_session<D, T, E, F>(
    client: &mut Client<D>,
    schema: Option<&str>,
    body: F,
) -> Result<T, E>
where
    D: Driver,
    F: AsyncFnOnce(&mut Client<D>) -> Result<T, E>,
    E: From<DbError>,
{
    let previous = client.auto_create_connection();
    client.set_auto_create_connection(false);
    let mut guard = SessionGuard {
        client,
        previous,
        created: false,
    };

    if !guard.client.is_connected() {
        guard.client.create_connection().await?;
        guard.created = true;
    }
    debug!(created = guard.created, schema = ?schema, "Session opened");

    let entered = match schema {
        Some(schema) => enter_schema(&mut *guard.client, schema, !guard.created)
            .await
            .map_err(E::from),
        None => Ok(None),
    };
    let (result, previous_path) = match entered {
        Ok(previous_path) => (body(&mut *guard.client).await, previous_path),
        Err(e) => (Err(e), None),
    };

    if result.is_err() && guard.client.is_connected() {
        info!("Session failed, rolling back");
        if let Err(e) = guard.client.rollback().await {
            warn!(error = %e, "Session rollback failed");
        }
    }

    let restored = match previous_path {
        Some(path) if guard.client.is_connected() => {
            restore_search_path(&mut *guard.client, &path).await
        }
        _ => Ok(()),
    };
    let result = match (result, restored) {
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Err(restore_err)) => {
            warn!(error = %restore_err, "Failed to restore search path");
            Err(e)
        }
        (result, Ok(())) => result,
    };

    let closed = if guard.created && guard.client.is_connected() {
        guard.client.close_connection().await
    } else {
        Ok(())
    };
    guard.created = false;
    debug!("Session closed");

    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "Failed to close session connection");
            Err(e)
        }
    }
}

/// Run `body` as one unit of work on the client's open connection.
///
/// Commits when `body` succeeds. When it fails, rolls back and returns the
/// body's error without committing. Either way the client is back on
/// single-commit execution afterwards.
///
/// Requires an open connection, typically from an enclosing
/// [`create_session`]; fails with `ConnectionNotEstablished` otherwise.
/// Inside another transaction the body joins the outer unit of work, and only
/// the outermost scope commits or rolls back.
pub async fn create_transaction<D, T, E, F>(client: &mut Client<D>, body: F) -> Result<T, E>
where
    D: Driver,
    F: AsyncFnOnce(&mut Client<D>) -> Result<T, E>,
    E: From<DbError>,
{
    if !client.is_connected() {
        return Err(DbError::ConnectionNotEstablished.into());
    }
    if client.in_transaction() {
        debug!("Joining the enclosing transaction");
        return body(client).await;
    }

    client.start_transaction();
    let mut guard = TransactionGuard {
        client,
        armed: true,
    };

    let outcome = match body(&mut *guard.client).await {
        Ok(value) => guard
            .client
            .end_transaction()
            .await
            .map(|()| value)
            .map_err(E::from),
        Err(e) => {
            info!("Transaction failed, rolling back");
            if let Err(rollback_err) = guard.client.rollback().await {
                warn!(error = %rollback_err, "Transaction rollback failed");
            }
            guard.client.reset_transaction();
            Err(e)
        }
    };
    guard.armed = false;
    outcome
}

const CURRENT_SEARCH_PATH: &str = "SELECT current_setting('search_path') AS search_path";

/// Apply `schema` as the search path.
///
/// With `keep_previous`, the path it replaces is returned so the session can
/// put it back on a connection that outlives it.
async fn enter_schema<D: Driver>(
    client: &mut Client<D>,
    schema: &str,
    keep_previous: bool,
) -> DbResult<Option<String>> {
    let previous = if keep_previous {
        client
            .find::<Row>(CURRENT_SEARCH_PATH)
            .await?
            .and_then(|row| row.get("search_path")?.as_str().map(str::to_string))
    } else {
        None
    };
    client.set_schema(schema).await?;
    Ok(previous)
}

async fn restore_search_path<D: Driver>(client: &mut Client<D>, path: &str) -> DbResult<()> {
    client
        .execute(
            Query::new("SELECT set_config('search_path', %(search_path)s, false)")
                .with_param("search_path", path),
        )
        .await?;
    debug!(search_path = %path, "Search path restored");
    Ok(())
}

struct SessionGuard<'a, D: Driver> {
    client: &'a mut Client<D>,
    previous: bool,
    /// Whether the session still owns an open connection
    created: bool,
}

impl<D: Driver> Drop for SessionGuard<'_, D> {
    fn drop(&mut self) {
        if self.created {
            self.client.discard_connection();
        }
        self.client.set_auto_create_connection(self.previous);
    }
}

struct TransactionGuard<'a, D: Driver> {
    client: &'a mut Client<D>,
    armed: bool,
}

impl<D: Driver> Drop for TransactionGuard<'_, D> {
    fn drop(&mut self) {
        if self.armed {
            warn!("Transaction scope abandoned, discarding connection");
            self.client.reset_transaction();
            self.client.discard_connection();
        }
    }
}
