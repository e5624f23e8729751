//! Core data model types for the pipeline.
//!
//! A feed is flattened into an in-memory [`Table`]: row-major [`Value`] storage described by a
//! [`Schema`] of typed [`Field`]s. Every pipeline stage takes a table by value and hands back a
//! new one, so no stage ever observes another stage's half-finished state.

use std::fmt;

/// Physical data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 8-bit signed integer.
    Int8,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit floating point number.
    Float32,
    /// 64-bit floating point number.
    Float64,
    /// UTF-8 string.
    Utf8,
    /// A [`LatLon`] point.
    Point,
}

impl DataType {
    /// True for the integer and floating point types.
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    pub fn is_integer(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Bytes per cell used by [`Table::estimated_size_bytes`].
    ///
    /// Strings and points are counted at reference width, the way a columnar frame reports
    /// shallow memory usage for object columns.
    pub fn width_bytes(self) -> usize {
        match self {
            Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 | Self::Utf8 => 8,
            Self::Point => 16,
        }
    }
}

/// Semantic classification of a column, decided once by the type normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Numeric,
    /// Text whose values parse as dates.
    DateLike,
    Text,
    Geometry,
}

impl ColumnKind {
    fn default_for(data_type: DataType) -> Self {
        match data_type {
            DataType::Utf8 => Self::Text,
            DataType::Point => Self::Geometry,
            _ => Self::Numeric,
        }
    }
}

/// A single named, typed column in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Column name.
    pub name: String,
    /// Physical type of the values.
    pub data_type: DataType,
    /// Semantic kind.
    pub kind: ColumnKind,
}

impl Field {
    /// Create a new field; the kind follows from the data type.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            kind: ColumnKind::default_for(data_type),
        }
    }

    /// Override the semantic kind.
    pub fn with_kind(mut self, kind: ColumnKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Ordered list of fields describing a [`Table`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Returns the field with the given name, if present.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Canonical point: latitude and longitude in decimal degrees.
///
/// This is the only coordinate pair type in the crate. Conversion to planar `(x, y)` happens in
/// exactly one place, [`LatLon::to_point`], where `x` is the longitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLon {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Planar point with `x = longitude`, `y = latitude`.
    pub fn to_point(self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

impl fmt::Display for LatLon {
    /// Well-known text, `POINT (lon lat)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "POINT ({} {})", self.longitude, self.latitude)
    }
}

/// A single value in a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value.
    Null,
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// UTF-8 string.
    Utf8(String),
    /// Point geometry.
    Point(LatLon),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric value widened to `f64`; `None` for non-numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int8(v) => Some(f64::from(*v)),
            Self::Int16(v) => Some(f64::from(*v)),
            Self::Int32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::Float32(v) => Some(f64::from(*v)),
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Hashable identity used for distinct-value and duplicate checks. `None` for nulls.
    pub fn key(&self) -> Option<ValueKey<'_>> {
        match self {
            Self::Null => None,
            Self::Int8(v) => Some(ValueKey::Int(i64::from(*v))),
            Self::Int16(v) => Some(ValueKey::Int(i64::from(*v))),
            Self::Int32(v) => Some(ValueKey::Int(i64::from(*v))),
            Self::Int64(v) => Some(ValueKey::Int(*v)),
            Self::Float32(v) => Some(ValueKey::Float(float_bits(f64::from(*v)))),
            Self::Float64(v) => Some(ValueKey::Float(float_bits(*v))),
            Self::Utf8(s) => Some(ValueKey::Text(s.as_str())),
            Self::Point(p) => Some(ValueKey::Point(p.latitude.to_bits(), p.longitude.to_bits())),
        }
    }
}

impl fmt::Display for Value {
    /// Text form used by the CSV writer; nulls render as the empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Int8(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float32(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Utf8(s) => f.write_str(s),
            Self::Point(p) => write!(f, "{p}"),
        }
    }
}

/// Bit pattern with `-0.0` folded into `0.0`.
fn float_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else {
        v.to_bits()
    }
}

/// See [`Value::key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKey<'a> {
    Int(i64),
    Float(u64),
    Text(&'a str),
    Point(u64, u64),
}

/// In-memory table.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields. Each row
/// also carries its label, the position it had when the table was built; filtering keeps the
/// labels of the surviving rows, so they can have gaps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
    /// Row labels, parallel to `rows`.
    pub labels: Vec<usize>,
}

impl Table {
    /// Create a table from schema and rows, labelled `0..rows.len()`.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        let labels = (0..rows.len()).collect();
        Self {
            schema,
            rows,
            labels,
        }
    }

    /// Number of rows in the table.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns in the table.
    pub fn column_count(&self) -> usize {
        self.schema.fields.len()
    }

    /// Iterate the values of column `idx`, row by row.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| row.get(idx).unwrap_or(&Value::Null))
    }

    /// Look up a value by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.schema.index_of(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Keep only rows that match `predicate`. The schema and surviving labels are preserved.
    pub fn filter_rows<F>(self, mut predicate: F) -> Self
    where
        F: FnMut(&[Value]) -> bool,
    {
        let (rows, labels) = self
            .rows
            .into_iter()
            .zip(self.labels)
            .filter(|(row, _)| predicate(row.as_slice()))
            .unzip();
        Self {
            schema: self.schema,
            rows,
            labels,
        }
    }

    /// Append `field` with one value per row, or replace the column if the name already exists.
    ///
    /// # Panics
    ///
    /// Panics if `values.len()` differs from the row count.
    pub fn with_column(mut self, field: Field, values: Vec<Value>) -> Self {
        assert!(
            values.len() == self.rows.len(),
            "column '{}' has {} values for {} rows",
            field.name,
            values.len(),
            self.rows.len()
        );

        match self.schema.index_of(&field.name) {
            Some(idx) => {
                self.schema.fields[idx] = field;
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row[idx] = v;
                }
            }
            None => {
                self.schema.fields.push(field);
                for (row, v) in self.rows.iter_mut().zip(values) {
                    row.push(v);
                }
            }
        }
        self
    }

    /// Estimated in-memory footprint in bytes: an 8-byte row label plus
    /// [`DataType::width_bytes`] per cell.
    pub fn estimated_size_bytes(&self) -> usize {
        let per_row: usize = 8 + self
            .schema
            .fields
            .iter()
            .map(|f| f.data_type.width_bytes())
            .sum::<usize>();
        per_row * self.row_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            Schema::new(vec![
                Field::new("id", DataType::Int64),
                Field::new("name", DataType::Utf8),
            ]),
            vec![
                vec![Value::Int64(1), Value::Utf8("a".to_string())],
                vec![Value::Int64(2), Value::Null],
            ],
        )
    }

    #[test]
    fn field_kind_follows_data_type() {
        assert_eq!(Field::new("x", DataType::Float32).kind, ColumnKind::Numeric);
        assert_eq!(Field::new("x", DataType::Utf8).kind, ColumnKind::Text);
        assert_eq!(Field::new("x", DataType::Point).kind, ColumnKind::Geometry);
        assert_eq!(
            Field::new("x", DataType::Utf8).with_kind(ColumnKind::DateLike).kind,
            ColumnKind::DateLike
        );
    }

    #[test]
    fn with_column_appends_then_replaces() {
        let t = sample().with_column(
            Field::new("flag", DataType::Utf8),
            vec![Value::Utf8("x".into()), Value::Null],
        );
        assert_eq!(t.column_count(), 3);
        assert_eq!(t.value(0, "flag"), Some(&Value::Utf8("x".into())));

        let t = t.with_column(Field::new("flag", DataType::Int8), vec![Value::Int8(1), Value::Int8(2)]);
        assert_eq!(t.column_count(), 3);
        assert_eq!(t.schema.field("flag").unwrap().data_type, DataType::Int8);
        assert_eq!(t.value(1, "flag"), Some(&Value::Int8(2)));
    }

    #[test]
    fn filtering_keeps_source_labels() {
        let t = sample().filter_rows(|row| row[1].is_null());
        assert_eq!(t.row_count(), 1);
        assert_eq!(t.labels, vec![1]);

        let t = t.with_column(Field::new("flag", DataType::Int8), vec![Value::Int8(1)]);
        assert_eq!(t.labels, vec![1]);
    }

    #[test]
    fn estimated_size_counts_label_and_widths() {
        // (8 label + 8 int64 + 8 utf8) * 2 rows
        assert_eq!(sample().estimated_size_bytes(), 48);
    }

    #[test]
    fn latlon_renders_as_wkt_with_longitude_first() {
        let p = LatLon::new(49.1659, -123.9401);
        assert_eq!(p.to_string(), "POINT (-123.9401 49.1659)");
        assert_eq!(p.to_point().x(), -123.9401);
        assert_eq!(p.to_point().y(), 49.1659);
    }

    #[test]
    fn value_keys_ignore_integer_width() {
        assert_eq!(Value::Int8(3).key(), Value::Int64(3).key());
        assert_eq!(Value::Null.key(), None);
        assert_ne!(Value::Utf8("3".into()).key(), Value::Int64(3).key());
    }

    #[test]
    fn signed_zeros_share_a_key() {
        assert_eq!(Value::Float64(-0.0).key(), Value::Float64(0.0).key());
        assert_eq!(Value::Float32(-0.0).key(), Value::Float64(0.0).key());
        assert_ne!(Value::Float64(0.0).key(), Value::Float64(f64::MIN_POSITIVE).key());
    }
}
