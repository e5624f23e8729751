//! CSV output and read-back.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::{ParseError, PipelineError, PipelineResult};
use crate::types::{DataType, LatLon, Schema, Table, Value};

/// Write `table` to `path`: header row, then one record per row, each led by its row label
/// under an empty header.
pub fn write_csv(table: &Table, path: impl AsRef<Path>) -> PipelineResult<()> {
    let file = File::create(path)?;
    write_csv_to_writer(table, file)?;
    Ok(())
}

/// Same as [`write_csv`], gzip-compressed.
pub fn write_csv_gzip(table: &Table, path: impl AsRef<Path>) -> PipelineResult<()> {
    let file = File::create(path)?;
    let encoder = write_csv_to_writer(table, GzEncoder::new(file, Compression::default()))?;
    encoder.finish()?;
    Ok(())
}

/// Write `table` as CSV into `writer` and hand the writer back, flushed.
pub fn write_csv_to_writer<W: Write>(table: &Table, writer: W) -> PipelineResult<W> {
    let mut wtr = csv::Writer::from_writer(writer);

    let header = std::iter::once("").chain(table.schema.field_names());
    wtr.write_record(header)?;

    for (label, row) in table.labels.iter().zip(&table.rows) {
        let record = std::iter::once(label.to_string()).chain(row.iter().map(Value::to_string));
        wtr.write_record(record)?;
    }

    wtr.into_inner().map_err(|e| PipelineError::Io(e.into_error()))
}

/// Read a CSV written by [`write_csv`] back into a [`Table`].
///
/// Columns are matched to `schema` by header name (order can differ); the index column and any
/// column not in `schema` are ignored. Empty cells read as null.
pub fn read_csv(path: impl AsRef<Path>, schema: &Schema) -> PipelineResult<Table> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    read_csv_from_reader(&mut rdr, schema)
}

/// Read CSV data from an existing reader.
pub fn read_csv_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
    schema: &Schema,
) -> PipelineResult<Table> {
    let headers = rdr.headers()?.clone();

    let mut col_idxs = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        match headers.iter().position(|h| h == field.name) {
            Some(idx) => col_idxs.push(idx),
            None => {
                return Err(PipelineError::MissingColumn {
                    column: field.name.clone(),
                    available: headers.iter().map(str::to_owned).collect(),
                });
            }
        }
    }

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (row_idx0, result) in rdr.records().enumerate() {
        // 1-based, plus the header line.
        let user_row = row_idx0 + 2;
        let record = result?;

        let mut row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for (field, &csv_idx) in schema.fields.iter().zip(col_idxs.iter()) {
            let raw = record.get(csv_idx).unwrap_or("");
            let value = parse_typed_value(field.data_type, raw).map_err(|source| {
                PipelineError::InvalidValue {
                    row: user_row,
                    column: field.name.clone(),
                    source,
                }
            })?;
            row.push(value);
        }
        rows.push(row);
    }

    Ok(Table::new(schema.clone(), rows))
}

fn parse_typed_value(data_type: DataType, raw: &str) -> Result<Value, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let int = || trimmed.parse::<i64>().map_err(|_| ParseError::new(raw, "integer"));

    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
        DataType::Int8 => i8::try_from(int()?)
            .map(Value::Int8)
            .map_err(|_| ParseError::new(raw, "int8")),
        DataType::Int16 => i16::try_from(int()?)
            .map(Value::Int16)
            .map_err(|_| ParseError::new(raw, "int16")),
        DataType::Int32 => i32::try_from(int()?)
            .map(Value::Int32)
            .map_err(|_| ParseError::new(raw, "int32")),
        DataType::Int64 => int().map(Value::Int64),
        DataType::Float32 => trimmed
            .parse::<f32>()
            .map(Value::Float32)
            .map_err(|_| ParseError::new(raw, "float32")),
        DataType::Float64 => trimmed
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|_| ParseError::new(raw, "float64")),
        DataType::Point => parse_wkt_point(trimmed)
            .map(Value::Point)
            .ok_or_else(|| ParseError::new(raw, "POINT (lon lat)")),
    }
}

/// Parse the `POINT (lon lat)` text written for geometry cells.
pub fn parse_wkt_point(s: &str) -> Option<LatLon> {
    let body = s.trim().strip_prefix("POINT")?.trim();
    let body = body.strip_prefix('(')?.strip_suffix(')')?;
    let mut parts = body.split_whitespace();
    let longitude = parts.next()?.parse().ok()?;
    let latitude = parts.next()?.parse().ok()?;
    parts.next().is_none().then(|| LatLon::new(latitude, longitude))
}
