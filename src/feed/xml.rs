//! Flattening of an Atom/OData feed document into a [`Table`].
//!
//! Expected shape (namespaces abbreviated):
//!
//! ```text
//! <feed>
//!   <entry>
//!     <content>
//!       <m:properties>
//!         <d:Licence>123</d:Licence>
//!         ...
//! ```
//!
//! Every `properties` container becomes one row. Column names are the property tags without
//! their namespace, lowercased.

use std::collections::HashMap;

use roxmltree::{Document, Node};

use crate::error::{PipelineError, PipelineResult};
use crate::types::{DataType, Field, Schema, Table, Value};

/// Source-side partitioning columns that never become table columns.
const RESERVED_COLUMNS: [&str; 2] = ["PartitionKey", "RowKey"];

const PROPERTIES_TAG: &str = "properties";

/// Extract a table from raw feed bytes (must be UTF-8).
pub fn extract_table_from_bytes(bytes: &[u8]) -> PipelineResult<Table> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| PipelineError::format(format!("feed is not valid utf-8: {e}")))?;
    extract_table(text)
}

/// Extract a table from a feed document.
///
/// All columns are [`DataType::Utf8`]; typing happens later in the normalizer.
pub fn extract_table(xml: &str) -> PipelineResult<Table> {
    let doc = Document::parse(xml).map_err(|e| PipelineError::format(format!("malformed xml: {e}")))?;

    let mut builder = TableBuilder::default();
    for entry in elements(doc.root_element()) {
        for field in elements(entry) {
            for container in elements(field) {
                if !container.tag_name().name().contains(PROPERTIES_TAG) {
                    continue;
                }
                builder.push_row(read_properties(container)?);
            }
        }
    }

    Ok(builder.finish())
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

fn read_properties(container: Node<'_, '_>) -> PipelineResult<Vec<(String, Option<String>)>> {
    let mut record = Vec::new();
    for item in elements(container) {
        let tag = item.tag_name();
        if RESERVED_COLUMNS.iter().any(|r| tag.name().contains(r)) {
            continue;
        }
        if tag.namespace().is_none() {
            return Err(PipelineError::format(format!(
                "property '{}' has no namespace; cannot derive a column name",
                tag.name()
            )));
        }
        let value = item.text().map(|t| t.trim().to_owned());
        record.push((tag.name().to_lowercase(), value));
    }
    Ok(record)
}

/// Collects rows whose column sets may differ; the final schema is the union in order of first
/// appearance.
#[derive(Default)]
struct TableBuilder {
    columns: Vec<String>,
    positions: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl TableBuilder {
    fn push_row(&mut self, record: Vec<(String, Option<String>)>) {
        let mut row = vec![Value::Null; self.columns.len()];
        for (column, value) in record {
            let idx = match self.positions.get(&column) {
                Some(&idx) => idx,
                None => {
                    let idx = self.columns.len();
                    self.positions.insert(column.clone(), idx);
                    self.columns.push(column);
                    idx
                }
            };
            if row.len() <= idx {
                row.resize(idx + 1, Value::Null);
            }
            row[idx] = value.map(Value::Utf8).unwrap_or(Value::Null);
        }
        self.rows.push(row);
    }

    fn finish(self) -> Table {
        let width = self.columns.len();
        let rows = self
            .rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Value::Null);
                row
            })
            .collect();
        let fields = self
            .columns
            .into_iter()
            .map(|name| Field::new(name, DataType::Utf8))
            .collect();
        Table::new(Schema::new(fields), rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(entries: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom"
      xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices"
      xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
  <title>Test</title>
  {entries}
</feed>"#
        )
    }

    #[test]
    fn flattens_properties_and_skips_reserved_columns() {
        let xml = feed(
            r#"<entry><id>1</id><content type="application/xml"><m:properties>
                 <d:PartitionKey>p</d:PartitionKey><d:RowKey>r</d:RowKey>
                 <d:Licence> 42 </d:Licence><d:Name>Cafe</d:Name>
               </m:properties></content></entry>"#,
        );
        let t = extract_table(&xml).unwrap();
        assert_eq!(t.schema.field_names().collect::<Vec<_>>(), vec!["licence", "name"]);
        assert_eq!(t.rows, vec![vec![Value::Utf8("42".into()), Value::Utf8("Cafe".into())]]);
    }

    #[test]
    fn column_set_is_union_in_first_seen_order() {
        let xml = feed(
            r#"<entry><content><m:properties><d:A>1</d:A></m:properties></content></entry>
               <entry><content><m:properties><d:B>2</d:B><d:A>3</d:A></m:properties></content></entry>"#,
        );
        let t = extract_table(&xml).unwrap();
        assert_eq!(t.schema.field_names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(t.rows[0], vec![Value::Utf8("1".into()), Value::Null]);
        assert_eq!(t.rows[1], vec![Value::Utf8("3".into()), Value::Utf8("2".into())]);
    }

    #[test]
    fn empty_elements_become_null() {
        let xml = feed(
            r#"<entry><content><m:properties><d:A m:null="true" /><d:B></d:B></m:properties></content></entry>"#,
        );
        let t = extract_table(&xml).unwrap();
        assert_eq!(t.rows[0], vec![Value::Null, Value::Null]);
    }

    #[test]
    fn entry_without_properties_is_skipped() {
        let xml = feed(
            r#"<entry><content /></entry>
               <entry><content><m:properties><d:A>x</d:A></m:properties></content></entry>"#,
        );
        assert_eq!(extract_table(&xml).unwrap().row_count(), 1);
    }

    #[test]
    fn property_without_namespace_is_a_format_error() {
        let xml = r#"<feed><entry><content><properties><Licence>1</Licence></properties></content></entry></feed>"#;
        let err = extract_table(xml).unwrap_err();
        assert!(matches!(err, PipelineError::Format { .. }));
        assert!(err.to_string().contains("'Licence' has no namespace"));
    }

    #[test]
    fn malformed_xml_is_a_format_error() {
        let err = extract_table("<feed><entry>").unwrap_err();
        assert!(err.to_string().contains("malformed xml"));
    }
}
