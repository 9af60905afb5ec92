//! Result combination and record marshalling.
//!
//! A fetched row (or a caller-supplied default) is turned into the target
//! record type through serde. When combining, the query parameters are merged
//! into the row first and win over columns with the same name.

use crate::error::{DbError, DbResult};
use crate::models::{Params, Row};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Marshal `row` into `T`, merging `extra` into it first when given.
pub fn combine_into_return<T: DeserializeOwned>(
    mut row: Row,
    extra: Option<&Params>,
) -> DbResult<T> {
    if let Some(extra) = extra {
        for (key, value) in extra.as_map() {
            row.insert(key.clone(), value.clone());
        }
    }

    let record = serde_json::Value::Object(row);
    T::deserialize(&record)
        .map_err(|e| DbError::marshall_record(&record, std::any::type_name::<T>(), e))
}

/// Turn a record back into a row so it can stand in for a fetched one.
pub(crate) fn record_to_row<T: Serialize>(record: &T) -> DbResult<Row> {
    match serde_json::to_value(record) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(DbError::invalid_input(format!(
            "Default value of type {} must serialize to a mapping",
            std::any::type_name::<T>()
        ))),
        Err(e) => Err(DbError::invalid_input(format!(
            "Could not serialize default value: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct DataModel {
        test_method: String,
        test_name: String,
        value: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct DataExtended {
        test_method: String,
        test_name: String,
        value: String,
        other_value: i64,
    }

    fn row(value: serde_json::Value) -> Row {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_marshal_plain_row() {
        let model: DataModel = combine_into_return(
            row(json!({"test_method": "get", "test_name": "simple", "value": "1"})),
            None,
        )
        .unwrap();
        assert_eq!(model.value, "1");
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let model: DataModel = combine_into_return(
            row(json!({"id": 4, "test_method": "get", "test_name": "simple", "value": "1"})),
            None,
        )
        .unwrap();
        assert_eq!(model.test_name, "simple");
    }

    #[test]
    fn test_combine_adds_param_fields() {
        let params = Params::new()
            .with("test_method", "get")
            .with("test_name", "combine")
            .with("other_value", 1);
        let model: DataExtended = combine_into_return(
            row(json!({"test_method": "get", "test_name": "combine", "value": "2"})),
            Some(&params),
        )
        .unwrap();
        assert_eq!(model.other_value, 1);
        assert_eq!(model.value, "2");
    }

    #[test]
    fn test_combine_params_override_row_values() {
        let params = Params::new().with("value", "from-params");
        let model: DataModel = combine_into_return(
            row(json!({"test_method": "get", "test_name": "override", "value": "from-row"})),
            Some(&params),
        )
        .unwrap();
        assert_eq!(model.value, "from-params");
    }

    #[test]
    fn test_missing_field_is_marshall_error() {
        let err = combine_into_return::<DataModel>(row(json!({"test_method": "get"})), None)
            .unwrap_err();
        match err {
            DbError::MarshallRecord { record, model, .. } => {
                assert_eq!(record, r#"{"test_method":"get"}"#);
                assert!(model.ends_with("DataModel"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_row_is_a_valid_target() {
        let mapping: Row =
            combine_into_return(row(json!({"user_id": 1, "name": "test"})), None).unwrap();
        assert_eq!(mapping.get("name"), Some(&json!("test")));
    }

    #[test]
    fn test_record_to_row() {
        let record = DataModel {
            test_method: "find".to_string(),
            test_name: "default".to_string(),
            value: "9".to_string(),
        };
        let mapping = record_to_row(&record).unwrap();
        assert_eq!(mapping.len(), 3);
        assert!(record_to_row(&5).is_err());
    }
}
