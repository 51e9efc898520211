//! Delimited-text export of row sets.
//!
//! The column set is taken from the first row. A later row missing one of
//! those keys contributes an empty field; extra keys are ignored. Quoting is
//! delegated to the `csv` writer, which quotes any field holding the
//! delimiter, a quote or a line break and doubles inner quotes.

use csv::{QuoteStyle, WriterBuilder};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{EngineError, ResultEngine};

/// Export settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    pub delimiter: u8,
    /// Emit a header line with the column names.
    pub header: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            header: true,
        }
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Serializes `rows` with the default options (comma, header line).
pub fn to_delimited_text(rows: &[Map<String, Value>]) -> ResultEngine<String> {
    to_delimited_text_with(rows, ExportOptions::default())
}

/// Serializes `rows`; an empty slice is [`EngineError::NothingToExport`].
pub fn to_delimited_text_with(
    rows: &[Map<String, Value>],
    options: ExportOptions,
) -> ResultEngine<String> {
    let Some(first) = rows.first() else {
        return Err(EngineError::NothingToExport);
    };
    let columns: Vec<&String> = first.keys().collect();

    let mut writer = WriterBuilder::new()
        .delimiter(options.delimiter)
        .quote_style(QuoteStyle::Necessary)
        .from_writer(vec![]);

    if options.header {
        writer.write_record(columns.iter().map(|c| c.as_str()))?;
    }
    for row in rows {
        writer.write_record(columns.iter().map(|column| cell(row.get(column.as_str()))))?;
    }

    let data = writer
        .into_inner()
        .map_err(|err| EngineError::Export(err.to_string()))?;
    String::from_utf8(data).map_err(|err| EngineError::Export(err.to_string()))
}

/// Converts serializable rows into export records. Rows that do not
/// serialize to a JSON object are rejected.
pub fn rows_to_records<T: Serialize>(rows: &[T]) -> ResultEngine<Vec<Map<String, Value>>> {
    rows.iter()
        .map(|row| match serde_json::to_value(row) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(EngineError::InvalidField(format!(
                "export row is not an object: {other}"
            ))),
            Err(err) => Err(EngineError::InvalidField(err.to_string())),
        })
        .collect()
}

/// File name for a logical dataset: `"Partner Deal Performance"` becomes
/// `Partner_Deal_Performance.csv`.
#[must_use]
pub fn export_file_name(label: &str) -> String {
    let mut stem = String::new();
    for word in label
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        if !stem.is_empty() {
            stem.push('_');
        }
        stem.push_str(word);
    }
    if stem.is_empty() {
        stem.push_str("export");
    }
    format!("{stem}.csv")
}
