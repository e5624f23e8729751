//! `feed-tabulator` turns a municipal open-data XML feed into typed, geo-filtered tables on disk.
//!
//! The primary entrypoint is [`pipeline::run`], which fetches one feed, flattens its entries
//! into a [`types::Table`], types and enriches the columns, keeps the rows that fall inside a
//! place's boundary, and writes CSV, Parquet and compacted CSV outputs.
//!
//! ## What a run does
//!
//! - **Extract**: every `properties` element of the Atom feed becomes one row; column names are
//!   the lowercased local tag names ([`feed::xml`])
//! - **Normalize**: text columns whose values all parse as numbers become numeric; date-like
//!   columns are flagged ([`transform::normalize()`])
//! - **Local timestamp**: the first date-like column that converts cleanly becomes an ISO-8601
//!   `datetime` column in the reference timezone ([`transform::add_local_timestamp()`])
//! - **Geometry**: `latitude`/`longitude` pairs become a point column ([`transform::add_geometry()`])
//! - **Clean**: rows without a primary key or outside the boundary are removed, and columns with a
//!   single distinct value have their gaps filled ([`transform::clean()`])
//! - **Persist**: `<dataset>.csv`, `<dataset>.parquet`, the compacted `compressed.csv` and a
//!   gzip-compressed `<dataset>_compressed.csv` ([`output`])
//!
//! ## Quick example: transform a feed already in memory
//!
//! ```rust
//! use chrono_tz::America::Vancouver;
//! use feed_tabulator::feed::extract_table;
//! use feed_tabulator::geocode::{Boundary, StaticBoundary};
//! use feed_tabulator::pipeline::{transform, PipelineOptions};
//! use geo::{LineString, MultiPolygon, Polygon};
//!
//! # fn main() -> Result<(), feed_tabulator::PipelineError> {
//! let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"
//!     xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices"
//!     xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
//!   <entry><content type="application/xml"><m:properties>
//!     <d:Licence>B-100</d:Licence>
//!     <d:Latitude>49.1659</d:Latitude>
//!     <d:Longitude>-123.9401</d:Longitude>
//!   </m:properties></content></entry>
//! </feed>"#;
//!
//! let ring = LineString::from(vec![
//!     (-124.1, 49.0),
//!     (-123.8, 49.0),
//!     (-123.8, 49.3),
//!     (-124.1, 49.3),
//!     (-124.1, 49.0),
//! ]);
//! let nanaimo = StaticBoundary(Boundary::new(
//!     "Nanaimo, BC, Canada",
//!     MultiPolygon::new(vec![Polygon::new(ring, vec![])]),
//! ));
//!
//! let table = transform(extract_table(xml)?, "licence", &nanaimo, Vancouver, &PipelineOptions::default())?;
//! assert_eq!(table.row_count(), 1);
//! assert!(table.schema.index_of("geometry").is_some());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`]: run orchestration, options and observers
//! - [`feed`]: feed download and XML flattening
//! - [`transform`]: typing, enrichment, filtering and compaction stages
//! - [`geocode`]: place boundary resolution
//! - [`output`]: CSV/Parquet writers and readers
//! - [`types`]: schema and in-memory table types
//! - [`error`]: error types used across the pipeline

pub mod error;
pub mod feed;
pub mod geocode;
pub mod output;
pub mod pipeline;
pub mod transform;
pub mod types;

pub use error::{PipelineError, PipelineResult};

/// `User-Agent` sent with every HTTP request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
