//! Point geometry derived from coordinate columns.

use crate::types::{DataType, Field, LatLon, Table, Value};

pub const LATITUDE_COLUMN: &str = "latitude";
pub const LONGITUDE_COLUMN: &str = "longitude";
pub const GEOMETRY_COLUMN: &str = "geometry";

/// Add a [`GEOMETRY_COLUMN`] when both [`LATITUDE_COLUMN`] and [`LONGITUDE_COLUMN`] exist.
///
/// Each row gets a [`LatLon`] from its own coordinates, or null when either coordinate is
/// missing or not a finite number. Coordinates still stored as text are parsed.
pub fn add_geometry(table: Table) -> Table {
    let (Some(lat), Some(lon)) = (
        table.schema.index_of(LATITUDE_COLUMN),
        table.schema.index_of(LONGITUDE_COLUMN),
    ) else {
        return table;
    };

    let values = table
        .rows
        .iter()
        .map(|row| match (coordinate(&row[lat]), coordinate(&row[lon])) {
            (Some(latitude), Some(longitude)) => Value::Point(LatLon::new(latitude, longitude)),
            _ => Value::Null,
        })
        .collect();

    table.with_column(Field::new(GEOMETRY_COLUMN, DataType::Point), values)
}

fn coordinate(v: &Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .filter(|c| c.is_finite())
}
