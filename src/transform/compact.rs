//! Numeric width reduction.
//!
//! Two passes over every numeric column: `Float64` narrows to `Float32` when no value moves by
//! more than [`FLOAT32_TOLERANCE`], then any column whose values are all integral narrows to the
//! smallest signed integer type that holds its range. Text and geometry columns are untouched.

use crate::types::{DataType, Table, Value};

/// Largest absolute change a value may see when narrowed to `f32`.
pub const FLOAT32_TOLERANCE: f64 = 5e-4;

/// Result of [`compact`].
#[derive(Debug, Clone, PartialEq)]
pub struct Compaction {
    pub table: Table,
    /// [`Table::estimated_size_bytes`] before compaction.
    pub bytes_before: usize,
    /// [`Table::estimated_size_bytes`] after compaction.
    pub bytes_after: usize,
}

/// Downcast every numeric column of `table` as far as it safely goes.
///
/// Running it again on its own output changes nothing.
pub fn compact(table: Table) -> Compaction {
    let bytes_before = table.estimated_size_bytes();
    let table = downcast_integers(downcast_floats(table));
    let bytes_after = table.estimated_size_bytes();
    Compaction {
        table,
        bytes_before,
        bytes_after,
    }
}

/// `Float64` columns become `Float32` when every value survives within tolerance.
pub fn downcast_floats(mut table: Table) -> Table {
    for idx in 0..table.column_count() {
        if table.schema.fields[idx].data_type != DataType::Float64 {
            continue;
        }
        let fits = table.column(idx).all(|v| match v {
            Value::Float64(x) => fits_f32(*x),
            _ => true,
        });
        if fits {
            retype(&mut table, idx, DataType::Float32);
        }
    }
    table
}

/// Numeric columns whose non-null values are all integral become the narrowest integer type
/// that holds them. Columns never widen.
pub fn downcast_integers(mut table: Table) -> Table {
    for idx in 0..table.column_count() {
        let current = table.schema.fields[idx].data_type;
        if !current.is_numeric() {
            continue;
        }
        let Some(target) = integer_target(&table, idx) else {
            continue;
        };
        let narrower = current.is_float() || target.width_bytes() < current.width_bytes();
        if narrower {
            retype(&mut table, idx, target);
        }
    }
    table
}

fn fits_f32(x: f64) -> bool {
    if !x.is_finite() {
        return true;
    }
    let narrowed = x as f32;
    narrowed.is_finite() && (f64::from(narrowed) - x).abs() <= FLOAT32_TOLERANCE
}

fn integral(v: &Value) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    match v {
        Value::Int8(x) => Some(i64::from(*x)),
        Value::Int16(x) => Some(i64::from(*x)),
        Value::Int32(x) => Some(i64::from(*x)),
        Value::Int64(x) => Some(*x),
        Value::Float32(_) | Value::Float64(_) => {
            let x = v.as_f64()?;
            (x.is_finite() && x.fract() == 0.0 && x >= -LIMIT && x < LIMIT).then_some(x as i64)
        }
        _ => None,
    }
}

fn integer_target(table: &Table, idx: usize) -> Option<DataType> {
    let mut range: Option<(i64, i64)> = None;
    for v in table.column(idx) {
        if v.is_null() {
            continue;
        }
        let x = integral(v)?;
        range = Some(match range {
            Some((lo, hi)) => (lo.min(x), hi.max(x)),
            None => (x, x),
        });
    }
    let (lo, hi) = range?;
    let fits = |min: i64, max: i64| lo >= min && hi <= max;
    Some(if fits(i8::MIN.into(), i8::MAX.into()) {
        DataType::Int8
    } else if fits(i16::MIN.into(), i16::MAX.into()) {
        DataType::Int16
    } else if fits(i32::MIN.into(), i32::MAX.into()) {
        DataType::Int32
    } else {
        DataType::Int64
    })
}

fn retype(table: &mut Table, idx: usize, target: DataType) {
    for row in &mut table.rows {
        let cast = cast_value(&row[idx], target);
        row[idx] = cast;
    }
    table.schema.fields[idx].data_type = target;
}

fn cast_value(v: &Value, target: DataType) -> Value {
    if v.is_null() {
        return Value::Null;
    }
    match target {
        DataType::Float32 => v.as_f64().map_or(Value::Null, |x| Value::Float32(x as f32)),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => {
            match integral(v) {
                Some(x) => match target {
                    DataType::Int8 => Value::Int8(x as i8),
                    DataType::Int16 => Value::Int16(x as i16),
                    DataType::Int32 => Value::Int32(x as i32),
                    _ => Value::Int64(x),
                },
                None => Value::Null,
            }
        }
        _ => v.clone(),
    }
}
