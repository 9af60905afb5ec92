//! pgrecord Library
//!
//! A PostgreSQL access layer: one connection per client with managed
//! lifecycle, session and transaction scopes that release and roll back on
//! every exit path, and rows marshalled into serde records.
//!
//! ```no_run
//! # use pgrecord::{Client, Credentials, DbError, Query};
//! # use serde::Deserialize;
//! #[derive(Debug, Deserialize)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! # async fn demo() -> Result<(), DbError> {
//! let mut client = Client::new(Credentials::new("localhost", "postgres", "secret")?);
//! let user: User = client
//!     .get(Query::new("select id, name from users where id = %(id)s").with_param("id", 1))
//!     .await?;
//! let everyone: Vec<User> = client.select("select id, name from users").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod context;
pub mod credentials;
pub mod db;
pub mod error;
pub mod marshal;
pub mod models;

pub use client::Client;
pub use context::{create_session, create_transaction};
pub use credentials::Credentials;
pub use error::{DbError, DbResult};
pub use marshal::combine_into_return;
pub use models::{Params, Query, QueryContext, Row, ValueRows};
