//! CSV export of tender rows.
//!
//! Rows arrive from several producers (normalised notices, parsed chat
//! tables, client-edited JSON), so each column accepts a few key spellings.

use serde::Serialize;
use serde_json::Value;

use crate::notice::NormalizedNotice;
use crate::{Error, Result};

pub const CSV_HEADER: [&str; 8] = [
    "PubNo", "Buyer", "Title", "Published", "Deadline", "CPV", "ValueEUR", "PDF",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportRow {
    pub pubno: String,
    pub buyer: String,
    pub title: String,
    pub published: String,
    pub deadline: String,
    pub cpv: String,
    pub value: String,
    pub pdf: String,
}

impl ExportRow {
    /// Build a row from an arbitrary JSON object. Unknown keys are ignored;
    /// absent columns become empty cells.
    pub fn from_value(v: &Value) -> Self {
        let cell = |keys: &[&str]| -> String {
            keys.iter()
                .filter_map(|k| v.get(*k))
                .find(|x| !x.is_null())
                .map(cell_text)
                .unwrap_or_default()
        };
        Self {
            pubno: cell(&["pubno", "PubNo", "publicationNumber"]),
            buyer: cell(&["buyer", "Buyer"]),
            title: cell(&["title", "Title"]),
            published: cell(&["published", "Published", "publicationDate"]),
            deadline: cell(&["deadline", "Deadline", "deadlineDate"]),
            cpv: cell(&["cpv", "CPV"]),
            value: cell(&["value", "Value", "ValueEUR"]),
            pdf: cell(&["pdf", "PDF", "documentUrl"]),
        }
    }

    fn fields(&self) -> [&str; 8] {
        [
            self.pubno.as_str(),
            self.buyer.as_str(),
            self.title.as_str(),
            self.published.as_str(),
            self.deadline.as_str(),
            self.cpv.as_str(),
            self.value.as_str(),
            self.pdf.as_str(),
        ]
    }
}

impl From<&NormalizedNotice> for ExportRow {
    fn from(n: &NormalizedNotice) -> Self {
        Self {
            pubno: n.publication_number.clone(),
            buyer: n.buyer.clone(),
            title: n.title.clone(),
            published: n.publication_date.clone().unwrap_or_default(),
            deadline: n.deadline_date.clone().unwrap_or_default(),
            cpv: n.cpv.clone().unwrap_or_default(),
            value: n.value.map(|v| v.to_string()).unwrap_or_default(),
            pdf: n.document_url.clone().unwrap_or_default(),
        }
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.first().map(cell_text).unwrap_or_default(),
        other => other.to_string(),
    }
}

/// Render rows as CSV with the fixed export header. Fields containing a
/// comma, quote or newline are quoted with inner quotes doubled.
pub fn rows_to_csv(rows: &[ExportRow]) -> Result<String> {
    let mut wtr = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());

    wtr.write_record(CSV_HEADER).map_err(csv_err)?;
    for row in rows {
        wtr.write_record(row.fields()).map_err(csv_err)?;
    }

    let bytes = wtr
        .into_inner()
        .map_err(|e| Error::Internal(format!("csv flush: {e}")))?;
    String::from_utf8(bytes).map_err(|e| Error::Internal(format!("csv utf-8: {e}")))
}

fn csv_err(e: csv::Error) -> Error {
    Error::Internal(format!("csv: {e}"))
}
