//! Column classification and numeric coercion.
//!
//! [`infer_schema`] decides, once, what every column is; [`apply_schema`] converts the values.
//! Later stages read the resulting [`Schema`] instead of re-inspecting values.

use tracing::debug;

use crate::error::ParseError;
use crate::types::{ColumnKind, DataType, Field, Schema, Table, Value};

use super::datetime::parse_datetime;

/// Classify every column and convert numeric columns in one step.
pub fn normalize(table: Table) -> Table {
    let schema = infer_schema(&table);
    apply_schema(table, schema)
}

/// Inspect the values of every text column and produce its final [`Field`].
///
/// - A column whose non-null values all parse as integers is `Int64`; if they all parse as
///   numbers it is `Float64`. One non-numeric value keeps the whole column text.
/// - A text column for which [`is_date`] holds is [`ColumnKind::DateLike`].
/// - An all-null column stays text.
///
/// Columns that are already typed are left as they are.
pub fn infer_schema(table: &Table) -> Schema {
    let fields = table
        .schema
        .fields
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            if field.data_type != DataType::Utf8 {
                return field.clone();
            }
            match numeric_type(table.column(idx)) {
                Some(data_type) => Field::new(field.name.clone(), data_type),
                None if first_value_is_date(table.column(idx)) => {
                    Field::new(field.name.clone(), DataType::Utf8).with_kind(ColumnKind::DateLike)
                }
                None => Field::new(field.name.clone(), DataType::Utf8),
            }
        })
        .collect();
    Schema::new(fields)
}

/// Convert `table` to `schema`, column by column.
///
/// A column whose values do not all convert keeps its current field and values.
pub fn apply_schema(mut table: Table, schema: Schema) -> Table {
    let width = table.column_count();
    for (idx, target) in schema.fields.into_iter().enumerate().take(width) {
        let current = table.schema.fields[idx].data_type;
        if current == target.data_type {
            table.schema.fields[idx] = target;
            continue;
        }

        let converted: Result<Vec<Value>, ParseError> = table
            .column(idx)
            .map(|v| convert_value(v, target.data_type))
            .collect();

        match converted {
            Ok(values) => {
                for (row, v) in table.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
                table.schema.fields[idx] = target;
            }
            Err(e) => debug!(column = %target.name, error = %e, "column kept as text"),
        }
    }
    table
}

/// Whether `column` looks like a date column.
///
/// Only the first non-empty value is inspected: it parsing as a date returns `true`, it failing
/// returns `false`. A missing, non-text, or all-null column is not a date column.
pub fn is_date(table: &Table, column: &str) -> bool {
    let Some(idx) = table.schema.index_of(column) else {
        return false;
    };
    if table.schema.fields[idx].data_type != DataType::Utf8 {
        return false;
    }
    first_value_is_date(table.column(idx))
}

fn first_value_is_date<'a>(values: impl Iterator<Item = &'a Value>) -> bool {
    for v in values {
        if let Value::Utf8(s) = v {
            if s.is_empty() {
                continue;
            }
            return parse_datetime(s).is_ok();
        }
    }
    false
}

fn numeric_type<'a>(values: impl Iterator<Item = &'a Value>) -> Option<DataType> {
    let mut seen = false;
    let mut all_integers = true;
    for v in values {
        let s = match v {
            Value::Null => continue,
            Value::Utf8(s) if s.is_empty() => continue,
            Value::Utf8(s) => s,
            _ => return None,
        };
        seen = true;
        if all_integers && parse_int(s).is_ok() {
            continue;
        }
        all_integers = false;
        if parse_float(s).is_err() {
            return None;
        }
    }
    match (seen, all_integers) {
        (false, _) => None,
        (true, true) => Some(DataType::Int64),
        (true, false) => Some(DataType::Float64),
    }
}

fn convert_value(v: &Value, target: DataType) -> Result<Value, ParseError> {
    let s = match v {
        Value::Null => return Ok(Value::Null),
        Value::Utf8(s) if s.is_empty() => return Ok(Value::Null),
        Value::Utf8(s) => s,
        other => return Err(ParseError::new(other.to_string(), "text")),
    };
    match target {
        DataType::Int64 => parse_int(s).map(Value::Int64),
        DataType::Float64 => parse_float(s).map(Value::Float64),
        DataType::Utf8 => Ok(v.clone()),
        _ => Err(ParseError::new(s.as_str(), "int64, float64 or text")),
    }
}

fn parse_int(s: &str) -> Result<i64, ParseError> {
    s.parse::<i64>().map_err(|_| ParseError::new(s, "integer"))
}

fn parse_float(s: &str) -> Result<f64, ParseError> {
    s.parse::<f64>().map_err(|_| ParseError::new(s, "number"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_table(columns: Vec<(&str, Vec<Option<&str>>)>) -> Table {
        let fields = columns
            .iter()
            .map(|(name, _)| Field::new(*name, DataType::Utf8))
            .collect();
        let n = columns[0].1.len();
        let rows = (0..n)
            .map(|i| {
                columns
                    .iter()
                    .map(|(_, vals)| vals[i].map(|s| Value::Utf8(s.to_string())).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Table::new(Schema::new(fields), rows)
    }

    #[test]
    fn integer_column_becomes_int64() {
        let out = normalize(text_table(vec![("n", vec![Some("1"), None, Some("-3"), Some("")])]));
        assert_eq!(out.schema.fields[0], Field::new("n", DataType::Int64));
        assert_eq!(
            out.column(0).cloned().collect::<Vec<_>>(),
            vec![Value::Int64(1), Value::Null, Value::Int64(-3), Value::Null]
        );
    }

    #[test]
    fn mixed_integer_and_decimal_becomes_float64() {
        let out = normalize(text_table(vec![("x", vec![Some("1"), Some("2.5")])]));
        assert_eq!(out.schema.fields[0].data_type, DataType::Float64);
        assert_eq!(out.rows[0][0], Value::Float64(1.0));
    }

    #[test]
    fn one_non_numeric_value_keeps_column_text() {
        let out = normalize(text_table(vec![("x", vec![Some("1"), Some("2"), Some("n/a")])]));
        assert_eq!(out.schema.fields[0], Field::new("x", DataType::Utf8));
        assert_eq!(out.rows[0][0], Value::Utf8("1".into()));
    }

    #[test]
    fn all_null_column_stays_text() {
        let out = normalize(text_table(vec![("x", vec![None, None])]));
        assert_eq!(out.schema.fields[0].kind, ColumnKind::Text);
    }

    #[test]
    fn is_date_accepts_column_with_leading_date() {
        let t = text_table(vec![("date", vec![Some("2022-01-01"), Some("not a date"), None])]);
        assert!(is_date(&t, "date"));
    }

    #[test]
    fn is_date_rejects_column_without_parseable_values() {
        let t = text_table(vec![("name", vec![Some("Cafe"), Some("Bakery")])]);
        assert!(!is_date(&t, "name"));
    }

    #[test]
    fn is_date_decides_on_first_non_empty_value() {
        let t = text_table(vec![("d", vec![None, Some(""), Some("oops"), Some("2022-01-01")])]);
        assert!(!is_date(&t, "d"));
        assert!(!is_date(&text_table(vec![("d", vec![None, None])]), "d"));
        assert!(!is_date(&t, "missing"));
    }

    #[test]
    fn date_like_columns_are_classified_once() {
        let t = text_table(vec![
            ("issued", vec![Some("2022-01-01"), Some("2022-02-01")]),
            ("year", vec![Some("2022"), Some("2023")]),
        ]);
        let schema = infer_schema(&t);
        assert_eq!(schema.fields[0].kind, ColumnKind::DateLike);
        assert_eq!(schema.fields[1].kind, ColumnKind::Numeric);
        assert!(!is_date(&normalize(t), "year"));
    }

    #[test]
    fn apply_schema_falls_back_to_text_on_parse_failure() {
        let t = text_table(vec![("x", vec![Some("1"), Some("two")])]);
        let forced = Schema::new(vec![Field::new("x", DataType::Int64)]);
        let out = apply_schema(t.clone(), forced);
        assert_eq!(out, t);
    }
}
