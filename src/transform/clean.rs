//! Row quality filtering: primary key checks, spatial containment, uniform-column imputation.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::geocode::{Boundary, BoundaryResolver};
use crate::types::{Table, Value};

use super::geometry::GEOMETRY_COLUMN;

/// What to do with rows that share a primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Leave duplicates in place.
    #[default]
    KeepAll,
    /// Keep the first row for each key, in table order.
    KeepFirst,
}

/// Options for [`clean`].
#[derive(Debug, Clone, Copy)]
pub struct CleanOptions<'a> {
    /// Place whose boundary rows must fall inside.
    pub place_name: &'a str,
    pub duplicate_policy: DuplicatePolicy,
}

/// Lowercase and trim a user-supplied column name.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Filter `table` down to rows with a primary key that lie inside the boundary of
/// `options.place_name`, then fill nulls in columns that hold a single distinct value.
///
/// The boundary is resolved once, and only when the table has a geometry column; without one
/// the spatial step is skipped. Rows with a null geometry are outside every boundary.
pub fn clean(
    table: Table,
    primary_key: &str,
    resolver: &dyn BoundaryResolver,
    options: &CleanOptions<'_>,
) -> PipelineResult<Table> {
    let key = normalize_column_name(primary_key);
    if key.is_empty() {
        return Err(PipelineError::config("primary key column name is empty"));
    }
    let key_idx = table
        .schema
        .index_of(&key)
        .ok_or_else(|| PipelineError::MissingColumn {
            column: key.clone(),
            available: table.schema.field_names().map(str::to_owned).collect(),
        })?;

    let table = drop_missing_keys(table, key_idx);
    let table = match options.duplicate_policy {
        DuplicatePolicy::KeepAll => table,
        DuplicatePolicy::KeepFirst => keep_first_per_key(table, key_idx),
    };

    let table = match table.schema.index_of(GEOMETRY_COLUMN) {
        Some(geometry_idx) => {
            let boundary = resolver.resolve(options.place_name)?;
            keep_within(table, geometry_idx, &boundary)
        }
        None => {
            warn!("table has no '{GEOMETRY_COLUMN}' column; spatial filter skipped");
            table
        }
    };

    Ok(impute_uniform_columns(table))
}

/// Remove rows whose key is null or empty text.
pub fn drop_missing_keys(table: Table, key_idx: usize) -> Table {
    let before = table.row_count();
    let out = table.filter_rows(|row| match &row[key_idx] {
        Value::Null => false,
        Value::Utf8(s) => !s.is_empty(),
        _ => true,
    });
    debug!(dropped = before - out.row_count(), "rows without primary key removed");
    out
}

/// Keep the first row for each distinct key value.
pub fn keep_first_per_key(table: Table, key_idx: usize) -> Table {
    let keep: Vec<bool> = {
        let mut seen = HashSet::new();
        table
            .rows
            .iter()
            .map(|row| row[key_idx].key().is_none_or(|key| seen.insert(key)))
            .collect()
    };

    let mut keep = keep.into_iter();
    table.filter_rows(|_| keep.next().unwrap_or(false))
}

/// Keep rows whose point at `geometry_idx` is inside `boundary`.
pub fn keep_within(table: Table, geometry_idx: usize, boundary: &Boundary) -> Table {
    let before = table.row_count();
    let out = table.filter_rows(|row| match row[geometry_idx] {
        Value::Point(p) => boundary.contains(p),
        _ => false,
    });
    debug!(
        place = %boundary.place,
        dropped = before - out.row_count(),
        "rows outside boundary removed"
    );
    out
}

/// For every column with exactly one distinct non-null value, replace its nulls with it.
pub fn impute_uniform_columns(mut table: Table) -> Table {
    for idx in 0..table.column_count() {
        let Some(fill) = single_distinct_value(&table, idx) else {
            continue;
        };
        for row in &mut table.rows {
            if row[idx].is_null() {
                row[idx] = fill.clone();
            }
        }
    }
    table
}

fn single_distinct_value(table: &Table, idx: usize) -> Option<Value> {
    let mut distinct = HashSet::new();
    let mut first = None;
    for v in table.column(idx) {
        if let Some(key) = v.key() {
            distinct.insert(key);
            if distinct.len() > 1 {
                return None;
            }
            first.get_or_insert(v);
        }
    }
    first.cloned()
}
