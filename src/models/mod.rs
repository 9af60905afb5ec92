//! Data models for pgrecord.
//!
//! This module re-exports the request-side types used by the client.

pub mod query;
pub mod values;

pub use query::{Params, Query, QueryContext, Row};
pub use values::{DEFAULT_PAGE_SIZE, ValueRows};
