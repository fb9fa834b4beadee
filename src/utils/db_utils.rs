use crate::error::{ApiError, ApiResult};
use crate::utils::dates::parse_day;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::mysql::MySqlArguments;
use sqlx::Arguments;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    DateTime(DateTime<Utc>),
    Null,
}

/// Collects values into positional MySQL arguments, in order.
pub fn arguments(values: &[SqlValue]) -> MySqlArguments {
    let mut args = MySqlArguments::default();
    for value in values {
        match value {
            SqlValue::String(v) => args.add(v.clone()),
            SqlValue::I64(v) => args.add(*v),
            SqlValue::U64(v) => args.add(*v),
            SqlValue::F64(v) => args.add(*v),
            SqlValue::Bool(v) => args.add(*v),
            SqlValue::DateTime(v) => args.add(*v),
            SqlValue::Null => args.add(None::<String>),
        }
    }
    args
}

/// ===============================
/// WHERE clause builder
/// ===============================
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SqlFilter {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

impl SqlFilter {
    pub fn new(sql: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            values,
        }
    }

    /// Appends `clause` with AND.
    pub fn and(mut self, other: SqlFilter) -> Self {
        if other.sql.is_empty() {
            return self;
        }
        if self.sql.is_empty() {
            return other;
        }
        self.sql = format!("{} AND {}", self.sql, other.sql);
        self.values.extend(other.values);
        self
    }

    /// ` WHERE ...`, or nothing for an empty filter.
    pub fn where_clause(&self) -> String {
        if self.sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// How a JSON field of an update body is written.
#[derive(Clone, Copy, Debug)]
pub enum ColumnKind {
    Text,
    /// Text column that may be cleared with `null`
    OptionalText,
    Bool,
    Number,
    Integer,
    Day,
}

/// Writable column of a table, `field` is the JSON path joined with `.`.
#[derive(Clone, Copy, Debug)]
pub struct Column {
    pub field: &'static str,
    pub column: &'static str,
    pub kind: ColumnKind,
}

/// Flattens `{"leaves": {"carried_over": 1}}` into `leaves.carried_over`.
fn flatten(prefix: &str, obj: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten(&path, inner, out),
            other => out.push((path, other.clone())),
        }
    }
}

fn convert(field: &str, kind: ColumnKind, value: &Value) -> ApiResult<SqlValue> {
    let invalid = || ApiError::bad_request(format!("Invalid value for {field}"));
    match (kind, value) {
        (ColumnKind::OptionalText, Value::Null) => Ok(SqlValue::Null),
        (ColumnKind::Text | ColumnKind::OptionalText, Value::String(s)) => {
            Ok(SqlValue::String(s.clone()))
        }
        (ColumnKind::Text | ColumnKind::OptionalText, Value::Number(n)) => {
            Ok(SqlValue::String(n.to_string()))
        }
        (ColumnKind::Bool, Value::Bool(b)) => Ok(SqlValue::Bool(*b)),
        (ColumnKind::Number, Value::Number(n)) => n.as_f64().map(SqlValue::F64).ok_or_else(invalid),
        (ColumnKind::Integer, Value::Number(n)) => n.as_i64().map(SqlValue::I64).ok_or_else(invalid),
        (ColumnKind::Integer, Value::String(s)) => {
            s.trim().parse().map(SqlValue::I64).map_err(|_| invalid())
        }
        (ColumnKind::Day, Value::String(s)) => parse_day(s).map(SqlValue::DateTime),
        _ => Err(invalid()),
    }
}

/// ===============================
/// Build dynamic UPDATE SQL
/// ===============================
///
/// Only fields listed in `columns` are written, anything else in the body
/// is ignored. A body without a single known field is rejected.
pub fn build_update_sql(
    table: &str,
    columns: &[Column],
    payload: &Value,
    id_value: u64,
) -> ApiResult<SqlUpdate> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Payload must be a JSON object"))?;

    let mut fields = Vec::new();
    flatten("", obj, &mut fields);

    let mut assignments = Vec::new();
    let mut values = Vec::new();
    for (path, value) in &fields {
        let Some(column) = columns.iter().find(|c| c.field == path.as_str()) else {
            continue;
        };
        // two aliases of one column: the later one wins
        if let Some(pos) = assignments.iter().position(|a: &&str| *a == column.column) {
            assignments.remove(pos);
            values.remove(pos);
        }
        assignments.push(column.column);
        values.push(convert(path, column.kind, value)?);
    }

    if assignments.is_empty() {
        return Err(ApiError::bad_request("No fields provided for update"));
    }

    let set_clause = assignments
        .iter()
        .map(|c| format!("{} = ?", c))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {} SET {} WHERE id = ?", table, set_clause);

    // WHERE id = ?
    values.push(SqlValue::U64(id_value));

    Ok(SqlUpdate { sql, values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[Column] = &[
        Column { field: "type", column: "type", kind: ColumnKind::Text },
        Column { field: "reserve", column: "reserve", kind: ColumnKind::Bool },
        Column { field: "date", column: "date", kind: ColumnKind::Day },
        Column {
            field: "leaves.carried_over",
            column: "leaves_carried_over",
            kind: ColumnKind::Number,
        },
    ];

    #[test]
    fn unknown_fields_are_ignored() {
        let update = build_update_sql(
            "entries",
            COLUMNS,
            &json!({ "type": "前半休", "_id": "x", "color": "red" }),
            7,
        )
        .unwrap();
        assert_eq!(update.sql, "UPDATE entries SET type = ? WHERE id = ?");
        assert_eq!(
            update.values,
            vec![SqlValue::String("前半休".into()), SqlValue::U64(7)]
        );
    }

    #[test]
    fn nested_objects_are_flattened() {
        let update = build_update_sql(
            "allocations",
            COLUMNS,
            &json!({ "leaves": { "carried_over": 2.5 } }),
            1,
        )
        .unwrap();
        assert_eq!(
            update.sql,
            "UPDATE allocations SET leaves_carried_over = ? WHERE id = ?"
        );
        assert_eq!(update.values[0], SqlValue::F64(2.5));
    }

    #[test]
    fn dates_are_normalised() {
        let update =
            build_update_sql("entries", COLUMNS, &json!({ "date": "2024-02-03" }), 1).unwrap();
        match &update.values[0] {
            SqlValue::DateTime(d) => assert_eq!(d.to_rfc3339(), "2024-02-03T00:00:00+00:00"),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn empty_or_unknown_payload_is_rejected() {
        assert!(build_update_sql("entries", COLUMNS, &json!({}), 1).is_err());
        assert!(build_update_sql("entries", COLUMNS, &json!({ "foo": 1 }), 1).is_err());
        assert!(build_update_sql("entries", COLUMNS, &json!([1, 2]), 1).is_err());
    }

    #[test]
    fn wrong_types_are_rejected() {
        let err = build_update_sql("entries", COLUMNS, &json!({ "reserve": "yes" }), 1)
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = build_update_sql("entries", COLUMNS, &json!({ "type": null }), 1).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn filters_join_with_and() {
        let filter = SqlFilter::new("a = ?", vec![SqlValue::I64(1)])
            .and(SqlFilter::default())
            .and(SqlFilter::new("b = ?", vec![SqlValue::Bool(true)]));
        assert_eq!(filter.where_clause(), " WHERE a = ? AND b = ?");
        assert_eq!(filter.values.len(), 2);
        assert_eq!(SqlFilter::default().where_clause(), "");
    }
}
