//! Database layer.
//!
//! - Driver boundary traits and the PostgreSQL driver
//! - Connection lifecycle management
//! - Cursor strategies (single-commit and transactional)
//! - Placeholder rewriting and column decoding

pub mod connection;
pub mod cursor;
pub mod driver;
pub mod params;
pub mod postgres;
pub mod types;

pub use connection::{ConnectionManager, require_connection};
pub use cursor::CursorStrategy;
pub use driver::{CursorOf, Driver, DriverConnection, Fetch, Statement};
pub use postgres::{PgCursor, PgDriver, PgHandle};
