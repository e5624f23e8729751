//! Parquet output and read-back.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use parquet::basic::{ConvertedType, Repetition, Type as PhysicalType};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, FloatType, Int32Type, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{ChunkReader, FileReader};
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::file::writer::{SerializedColumnWriter, SerializedFileWriter};
use parquet::record::Field as ParquetField;
use parquet::schema::types::Type;

use crate::error::{ParseError, PipelineError, PipelineResult};
use crate::types::{DataType, Field, Schema, Table, Value};

use super::csv::parse_wkt_point;

/// Write `table` to `path` as a single row group.
///
/// Every column is optional. `Int8`/`Int16` are stored as annotated INT32, strings and points
/// as UTF-8 byte arrays (points in `POINT (lon lat)` form). No index column is written.
pub fn write_parquet(table: &Table, path: impl AsRef<Path>) -> PipelineResult<()> {
    let schema = Arc::new(parquet_schema(&table.schema)?);
    let props = Arc::new(WriterProperties::builder().build());
    let file = File::create(path)?;
    let mut writer = SerializedFileWriter::new(file, schema, props)?;

    let mut row_group = writer.next_row_group()?;
    let mut idx = 0;
    while let Some(mut column) = row_group.next_column()? {
        write_column(&mut column, table, idx)?;
        column.close()?;
        idx += 1;
    }
    row_group.close()?;
    writer.close()?;
    Ok(())
}

fn parquet_schema(schema: &Schema) -> PipelineResult<Type> {
    let mut fields = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        fields.push(Arc::new(parquet_field(field)?));
    }
    Ok(Type::group_type_builder("schema").with_fields(fields).build()?)
}

fn parquet_field(field: &Field) -> PipelineResult<Type> {
    let (physical, converted) = match field.data_type {
        DataType::Int8 => (PhysicalType::INT32, ConvertedType::INT_8),
        DataType::Int16 => (PhysicalType::INT32, ConvertedType::INT_16),
        DataType::Int32 => (PhysicalType::INT32, ConvertedType::NONE),
        DataType::Int64 => (PhysicalType::INT64, ConvertedType::NONE),
        DataType::Float32 => (PhysicalType::FLOAT, ConvertedType::NONE),
        DataType::Float64 => (PhysicalType::DOUBLE, ConvertedType::NONE),
        DataType::Utf8 | DataType::Point => (PhysicalType::BYTE_ARRAY, ConvertedType::UTF8),
    };
    Ok(Type::primitive_type_builder(&field.name, physical)
        .with_repetition(Repetition::OPTIONAL)
        .with_converted_type(converted)
        .build()?)
}

fn write_column(
    column: &mut SerializedColumnWriter<'_>,
    table: &Table,
    idx: usize,
) -> PipelineResult<()> {
    match table.schema.fields[idx].data_type {
        DataType::Int8 | DataType::Int16 | DataType::Int32 => {
            write_values::<Int32Type, _>(column, table, idx, |v| {
                integer(v).and_then(|x| i32::try_from(x).ok())
            })
        }
        DataType::Int64 => write_values::<Int64Type, _>(column, table, idx, integer),
        DataType::Float32 => write_values::<FloatType, _>(column, table, idx, |v| {
            v.as_f64().map(|x| x as f32)
        }),
        DataType::Float64 => write_values::<DoubleType, _>(column, table, idx, Value::as_f64),
        DataType::Utf8 | DataType::Point => {
            write_values::<ByteArrayType, _>(column, table, idx, |v| {
                (!v.is_null()).then(|| ByteArray::from(v.to_string().into_bytes()))
            })
        }
    }
}

/// Write one optional column: definition level 1 for present values, 0 for nulls.
fn write_values<T, F>(
    column: &mut SerializedColumnWriter<'_>,
    table: &Table,
    idx: usize,
    convert: F,
) -> PipelineResult<()>
where
    T: parquet::data_type::DataType,
    F: Fn(&Value) -> Option<T::T>,
{
    let mut values = Vec::with_capacity(table.row_count());
    let mut def_levels = Vec::with_capacity(table.row_count());
    for v in table.column(idx) {
        match convert(v) {
            Some(x) => {
                values.push(x);
                def_levels.push(1);
            }
            None => def_levels.push(0),
        }
    }
    column
        .typed::<T>()
        .write_batch(&values, Some(&def_levels), None)?;
    Ok(())
}

fn integer(v: &Value) -> Option<i64> {
    match v {
        Value::Int8(x) => Some(i64::from(*x)),
        Value::Int16(x) => Some(i64::from(*x)),
        Value::Int32(x) => Some(i64::from(*x)),
        Value::Int64(x) => Some(*x),
        _ => None,
    }
}

/// Read a Parquet file written by [`write_parquet`] back into a [`Table`].
///
/// Every field of `schema` must exist as a column in the file.
pub fn read_parquet(path: impl AsRef<Path>, schema: &Schema) -> PipelineResult<Table> {
    let reader = SerializedFileReader::try_from(path.as_ref())?;

    let available = leaf_column_paths(&reader);
    for field in &schema.fields {
        if !available.contains(field.name.as_str()) {
            let mut columns: Vec<String> = available.iter().cloned().collect();
            columns.sort();
            return Err(PipelineError::MissingColumn {
                column: field.name.clone(),
                available: columns,
            });
        }
    }

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (idx0, row_res) in reader.into_iter().enumerate() {
        let row_num = idx0 + 1;
        let row = row_res?;

        let map: HashMap<&str, &ParquetField> = row
            .get_column_iter()
            .map(|(name, field)| (name.as_str(), field))
            .collect();

        let mut out_row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for f in &schema.fields {
            let value = match map.get(f.name.as_str()) {
                Some(v) => convert_field(f.data_type, v),
                None => Ok(Value::Null),
            };
            out_row.push(value.map_err(|source| PipelineError::InvalidValue {
                row: row_num,
                column: f.name.clone(),
                source,
            })?);
        }
        rows.push(out_row);
    }

    Ok(Table::new(schema.clone(), rows))
}

fn leaf_column_paths<R: ChunkReader + 'static>(reader: &SerializedFileReader<R>) -> HashSet<String> {
    reader
        .metadata()
        .file_metadata()
        .schema_descr()
        .columns()
        .iter()
        .map(|c| c.path().string())
        .collect()
}

fn convert_field(data_type: DataType, f: &ParquetField) -> Result<Value, ParseError> {
    let mismatch = |expected: &'static str| ParseError::new(f.to_string(), expected);
    match (data_type, f) {
        (_, ParquetField::Null) => Ok(Value::Null),
        (DataType::Int8, ParquetField::Byte(v)) => Ok(Value::Int8(*v)),
        (DataType::Int8, _) => Err(mismatch("int8")),
        (DataType::Int16, ParquetField::Short(v)) => Ok(Value::Int16(*v)),
        (DataType::Int16, _) => Err(mismatch("int16")),
        (DataType::Int32, ParquetField::Int(v)) => Ok(Value::Int32(*v)),
        (DataType::Int32, _) => Err(mismatch("int32")),
        (DataType::Int64, ParquetField::Long(v)) => Ok(Value::Int64(*v)),
        (DataType::Int64, _) => Err(mismatch("int64")),
        (DataType::Float32, ParquetField::Float(v)) => Ok(Value::Float32(*v)),
        (DataType::Float32, _) => Err(mismatch("float32")),
        (DataType::Float64, ParquetField::Double(v)) => Ok(Value::Float64(*v)),
        (DataType::Float64, _) => Err(mismatch("float64")),
        (DataType::Utf8, ParquetField::Str(s)) => Ok(Value::Utf8(s.clone())),
        (DataType::Utf8, _) => Err(mismatch("string")),
        (DataType::Point, ParquetField::Str(s)) => parse_wkt_point(s)
            .map(Value::Point)
            .ok_or_else(|| mismatch("POINT (lon lat)")),
        (DataType::Point, _) => Err(mismatch("POINT (lon lat)")),
    }
}
