//! Connection lifecycle.
//!
//! [`ConnectionManager`] owns the single physical connection of a client.
//! Every connect is paired with exactly one close (or discard), and no other
//! component closes the connection behind its back.

use crate::credentials::Credentials;
use crate::db::cursor::CursorStrategy;
use crate::db::driver::{CursorOf, Driver, DriverConnection};
use crate::error::{DbError, DbResult};
use tracing::{debug, info, warn};

/// Borrow the connection or fail with `ConnectionNotEstablished`.
pub fn require_connection<C>(connection: Option<&mut C>) -> DbResult<&mut C> {
    connection.ok_or(DbError::ConnectionNotEstablished)
}

pub struct ConnectionManager<D: Driver> {
    driver: D,
    credentials: Credentials,
    connection: Option<D::Connection>,
}

impl<D: Driver> ConnectionManager<D> {
    pub fn new(driver: D, credentials: Credentials) -> Self {
        Self {
            driver,
            credentials,
            connection: None,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connection_mut(&mut self) -> Option<&mut D::Connection> {
        self.connection.as_mut()
    }

    /// Open the physical connection.
    pub async fn create_connection(&mut self) -> DbResult<()> {
        if self.connection.is_some() {
            return Err(DbError::ConnectionAlreadyEstablished);
        }

        let connection = self.driver.connect(&self.credentials).await?;
        self.connection = Some(connection);
        info!(
            host = %self.credentials.host(),
            database = %self.credentials.database(),
            "Connection created"
        );
        Ok(())
    }

    /// Close the strategy's cursor and the physical connection.
    ///
    /// The handle is cleared before the driver close runs, so a failing
    /// close still leaves the manager disconnected.
    pub async fn close_connection(
        &mut self,
        strategy: &mut CursorStrategy<CursorOf<D>>,
    ) -> DbResult<()> {
        let mut connection = self
            .connection
            .take()
            .ok_or(DbError::ConnectionNotEstablished)?;

        strategy.close(&mut connection);
        connection.close().await?;
        info!(database = %self.credentials.database(), "Connection closed");
        Ok(())
    }

    /// Roll back the open unit of work, keeping the connection.
    pub async fn rollback(&mut self) -> DbResult<()> {
        let connection = require_connection(self.connection.as_mut())?;
        connection.rollback().await?;
        debug!("Rolled back");
        Ok(())
    }

    /// Drop the connection without a driver close.
    ///
    /// Used on cancellation and panic paths where nothing can be awaited.
    /// Returns whether a connection was present.
    pub fn discard(&mut self) -> bool {
        let discarded = self.connection.take().is_some();
        if discarded {
            warn!(database = %self.credentials.database(), "Connection discarded without close");
        }
        discarded
    }
}
