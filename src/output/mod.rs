//! Persisted outputs.
//!
//! - [`csv`]: CSV with a leading row-index column, plain or gzip-compressed
//! - [`parquet`]: Parquet, one row group, no index column
//!
//! Both formats can be read back into a [`Table`] for a known [`crate::types::Schema`].

pub mod csv;
pub mod parquet;

pub use csv::{read_csv, write_csv, write_csv_gzip, write_csv_to_writer};
pub use parquet::{read_parquet, write_parquet};

use crate::types::{ColumnKind, DataType, Table, Value};

/// Replace every `Point` column with its `POINT (lon lat)` text, keeping the Geometry kind.
pub fn geometry_to_text(mut table: Table) -> Table {
    for idx in 0..table.column_count() {
        if table.schema.fields[idx].data_type != DataType::Point {
            continue;
        }
        for row in &mut table.rows {
            if let Value::Point(p) = row[idx] {
                row[idx] = Value::Utf8(p.to_string());
            }
        }
        let field = &mut table.schema.fields[idx];
        field.data_type = DataType::Utf8;
        field.kind = ColumnKind::Geometry;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, LatLon, Schema};

    #[test]
    fn points_become_wkt_text() {
        let t = Table::new(
            Schema::new(vec![Field::new("geometry", DataType::Point)]),
            vec![vec![Value::Point(LatLon::new(49.1659, -123.9401))], vec![Value::Null]],
        );
        let out = geometry_to_text(t);
        let field = &out.schema.fields[0];
        assert_eq!(field.data_type, DataType::Utf8);
        assert_eq!(field.kind, ColumnKind::Geometry);
        assert_eq!(out.rows[0][0], Value::Utf8("POINT (-123.9401 49.1659)".into()));
        assert_eq!(out.rows[1][0], Value::Null);
    }
}
