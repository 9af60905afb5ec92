//! Query-related data models.
//!
//! This module defines the query request passed to the client and the
//! parameter mapping bound into it.

use crate::error::{DbError, DbResult};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// A fetched row: column name to value, in column order.
pub type Row = serde_json::Map<String, JsonValue>;

/// Named parameters for a query, referenced in SQL as `%(name)s`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(serde_json::Map<String, JsonValue>);

impl Params {
    /// Create an empty parameter mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build parameters from any serializable record.
    ///
    /// The record must serialize to a JSON object; its fields become
    /// parameter names in declaration order.
    pub fn from_record<T: Serialize + ?Sized>(record: &T) -> DbResult<Self> {
        let value = serde_json::to_value(record)
            .map_err(|e| DbError::invalid_input(format!("Could not serialize params: {e}")))?;
        Self::from_value(value)
    }

    /// Build parameters from a JSON value, which must be an object.
    pub fn from_value(value: JsonValue) -> DbResult<Self> {
        match value {
            JsonValue::Object(map) => Ok(Self(map)),
            JsonValue::Null => Ok(Self::default()),
            other => Err(DbError::invalid_input(format!(
                "Params must be a mapping of names to values, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Add a parameter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&JsonValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &serde_json::Map<String, JsonValue> {
        &self.0
    }

    pub fn into_map(self) -> serde_json::Map<String, JsonValue> {
        self.0
    }
}

impl From<serde_json::Map<String, JsonValue>> for Params {
    fn from(map: serde_json::Map<String, JsonValue>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<JsonValue>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Descriptive attributes of a query, attached to its tracing span.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryContext {
    /// Main table the query reads or writes, e.g. "users"
    pub primary_table_name: Option<String>,
    /// e.g. "SELECT", "INSERT"
    pub operation_name: Option<String>,
    /// Low-cardinality summary, e.g. "get user by id"
    pub query_summary: Option<String>,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.primary_table_name = Some(table.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation_name = Some(operation.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.query_summary = Some(summary.into());
        self
    }
}

/// A query request: SQL text plus everything that shapes its execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    pub params: Params,
    /// Merge `params` into the fetched row before marshalling (`get`/`find` only).
    pub combine_into_return: bool,
    /// Overrides the client's default timeout
    pub timeout: Option<Duration>,
    pub context: Option<QueryContext>,
}

impl Query {
    /// Create a new query with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Params::new(),
            combine_into_return: false,
            timeout: None,
            context: None,
        }
    }

    /// Replace the parameters.
    pub fn with_params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }

    /// Add a single named parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params = self.params.with(name, value);
        self
    }

    /// Merge the parameters into the returned record.
    ///
    /// Parameters override fetched columns sharing the same name.
    pub fn combine_into_return(mut self) -> Self {
        self.combine_into_return = true;
        self
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach descriptive attributes for tracing.
    pub fn with_context(mut self, context: QueryContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Reject empty SQL before any connection work happens.
    pub(crate) fn validate(&self) -> DbResult<()> {
        if self.sql.trim().is_empty() {
            return Err(DbError::invalid_input("Query cannot be empty"));
        }
        Ok(())
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
