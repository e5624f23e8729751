//! Table transformations, in pipeline order.
//!
//! Every stage takes a [`crate::types::Table`] by value and returns a new one:
//!
//! - [`normalize()`]: classify columns and coerce numeric ones
//! - [`add_local_timestamp()`]: ISO-8601 local `datetime` column from the first date column
//! - [`add_geometry()`]: point `geometry` column from `latitude`/`longitude`
//! - [`clean()`]: primary key, boundary and imputation filter
//! - [`compact()`]: numeric width reduction
//!
//! ## Example
//!
//! ```rust
//! use feed_tabulator::transform::{add_geometry, normalize};
//! use feed_tabulator::types::{DataType, Field, Schema, Table, Value};
//!
//! let raw = Table::new(
//!     Schema::new(vec![
//!         Field::new("latitude", DataType::Utf8),
//!         Field::new("longitude", DataType::Utf8),
//!     ]),
//!     vec![vec![Value::Utf8("49.1659".into()), Value::Utf8("-123.9401".into())]],
//! );
//!
//! let table = add_geometry(normalize(raw));
//! assert_eq!(table.schema.fields[0].data_type, DataType::Float64);
//! assert_eq!(table.value(0, "geometry").unwrap().to_string(), "POINT (-123.9401 49.1659)");
//! ```

pub mod clean;
pub mod compact;
pub mod datetime;
pub mod geometry;
pub mod normalize;

pub use clean::{clean, CleanOptions, DuplicatePolicy};
pub use compact::{compact, Compaction};
pub use datetime::{add_local_timestamp, date_to_local, parse_datetime, resolve_timezone, DATETIME_COLUMN};
pub use geometry::{add_geometry, GEOMETRY_COLUMN, LATITUDE_COLUMN, LONGITUDE_COLUMN};
pub use normalize::{apply_schema, infer_schema, is_date, normalize};
