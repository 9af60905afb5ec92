//! Row sets for bulk `execute_values` statements.

use crate::error::{DbError, DbResult};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Default number of rows expanded into a single statement.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Positional rows bound into an `INSERT ... VALUES %s` statement.
///
/// Built either from pre-built positional tuples or from typed records,
/// which are flattened to their field values in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRows {
    rows: Vec<Vec<JsonValue>>,
    page_size: usize,
}

impl ValueRows {
    /// Rows given as positional tuples.
    pub fn tuples<R, V>(rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = V>,
        V: Into<JsonValue>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Rows given as typed records.
    pub fn records<'a, T, I>(records: I) -> DbResult<Self>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let rows = records
            .into_iter()
            .map(flatten_record)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(Self {
            rows,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Set how many rows go into one statement.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of values in each row, checked to be the same for every row.
    pub(crate) fn width(&self) -> DbResult<usize> {
        let Some(first) = self.rows.first() else {
            return Ok(0);
        };
        let width = first.len();
        if width == 0 {
            return Err(DbError::invalid_input("Rows for execute_values cannot be empty"));
        }
        if let Some((idx, row)) = self.rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(DbError::invalid_input(format!(
                "Row {} has {} values, expected {}",
                idx,
                row.len(),
                width
            )));
        }
        Ok(width)
    }

    pub(crate) fn pages(&self) -> impl Iterator<Item = &[Vec<JsonValue>]> {
        self.rows.chunks(self.page_size)
    }
}

fn flatten_record<T: Serialize + ?Sized>(record: &T) -> DbResult<Vec<JsonValue>> {
    match serde_json::to_value(record) {
        Ok(JsonValue::Object(map)) => Ok(map.into_iter().map(|(_, v)| v).collect()),
        Ok(JsonValue::Array(values)) => Ok(values),
        Ok(other) => Err(DbError::invalid_input(format!(
            "Record must serialize to a mapping or sequence, got {}",
            crate::models::query::json_type_name(&other)
        ))),
        Err(e) => Err(DbError::invalid_input(format!(
            "Could not serialize record: {e}"
        ))),
    }
}
