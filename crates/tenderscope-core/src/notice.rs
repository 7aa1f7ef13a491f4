//! Notice normalisation: one raw, multi-locale TED record into a flat row.
//!
//! TED records are heterogeneous. Localised text lives under three-letter
//! language keys (`ita`, `eng`, sometimes `en`), values may be scalars or
//! arrays, and any field may be missing. The normaliser never fails; every
//! extraction degrades to `""` or `None`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::dates::normalize_date;

/// A raw notice record exactly as returned by the search API.
///
/// Only readable through [`normalize_notice`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawNotice(Value);

impl RawNotice {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    fn field(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The raw publication number, stringified, for logging and keys.
    pub fn publication_number(&self) -> String {
        self.field("publication-number")
            .map(stringify)
            .unwrap_or_default()
    }
}

impl From<Value> for RawNotice {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// The flat, presentable row derived from a [`RawNotice`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedNotice {
    pub publication_number: String,
    pub notice_id: String,
    pub title: String,
    pub buyer: String,
    pub publication_date: Option<String>,
    pub deadline_date: Option<String>,
    pub cpv: Option<String>,
    #[serde(default)]
    pub cpv_all: Vec<String>,
    /// EUR.
    pub value: Option<f64>,
    pub document_url: Option<String>,
    pub description_it: Option<String>,
    pub description_en: Option<String>,
}

const ITALIAN: &[&str] = &["ita"];
const ENGLISH: &[&str] = &["eng", "en"];
const ITALIAN_THEN_ENGLISH: &[&str] = &["ita", "eng", "en"];

pub fn normalize_notice(raw: &RawNotice) -> NormalizedNotice {
    let publication_number = raw.publication_number();

    let notice_id = raw
        .field("notice-identifier")
        .filter(|v| !v.is_null())
        .map(stringify)
        .unwrap_or_else(|| publication_number.clone());

    let title = localized(raw.field("notice-title"), ITALIAN_THEN_ENGLISH).unwrap_or_default();
    let buyer = localized(raw.field("buyer-name"), ITALIAN_THEN_ENGLISH).unwrap_or_default();

    let description_it = localized(raw.field("description-proc"), ITALIAN)
        .or_else(|| localized(raw.field("description-glo"), ITALIAN));
    let description_en = localized(raw.field("description-proc"), ENGLISH)
        .or_else(|| localized(raw.field("description-glo"), ENGLISH));

    let cpv_all = cpv_codes(raw.field("classification-cpv"));

    NormalizedNotice {
        notice_id,
        title,
        buyer,
        publication_date: date_field(raw.field("publication-date")),
        deadline_date: date_field(raw.field("deadline-date-lot")),
        cpv: cpv_all.first().cloned(),
        cpv_all,
        value: numeric(raw.field("total-value"))
            .or_else(|| numeric(raw.field("estimated-value-glo"))),
        document_url: pick_pdf(raw.field("links")),
        description_it,
        description_en,
        publication_number,
    }
}

// ── Extraction helpers ──

/// A string, or the first string of an array.
fn first_string(v: &Value) -> Option<&str> {
    match v {
        Value::String(s) => Some(s.as_str()),
        Value::Array(items) => items.iter().find_map(Value::as_str),
        _ => None,
    }
}

/// First non-empty text under the given locale keys, in priority order.
fn localized(v: Option<&Value>, locales: &[&str]) -> Option<String> {
    let map = v?.as_object()?;
    locales
        .iter()
        .filter_map(|key| map.get(*key).and_then(first_string))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

fn date_field(v: Option<&Value>) -> Option<String> {
    let v = v?;
    let raw = match v {
        Value::Array(items) => items.first()?,
        other => other,
    };
    match raw {
        Value::String(s) => normalize_date(s),
        Value::Null => None,
        other => normalize_date(&other.to_string()),
    }
}

fn cpv_codes(v: Option<&Value>) -> Vec<String> {
    let items: Vec<&Value> = match v {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(other) => vec![other],
        None => Vec::new(),
    };
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let code = match item {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => continue,
        };
        if !code.is_empty() && !out.contains(&code) {
            out.push(code);
        }
    }
    out
}

/// Monetary fields count only when TED sends a JSON number.
fn numeric(v: Option<&Value>) -> Option<f64> {
    v?.as_f64().filter(|n| n.is_finite())
}

/// Italian PDF link if present, else English. Keys are matched
/// case-insensitively by equality or prefix (`it`, `ITA`, `it-IT`, ...).
fn pick_pdf(links: Option<&Value>) -> Option<String> {
    let pdf: &Map<String, Value> = links?.get("pdf")?.as_object()?;

    let chosen = pdf_for(pdf, &["it", "ita"]).or_else(|| pdf_for(pdf, &["en", "eng"]))?;
    first_string(chosen)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn pdf_for<'a>(pdf: &'a Map<String, Value>, tags: &[&str]) -> Option<&'a Value> {
    pdf.iter()
        .find(|(k, _)| {
            let low = k.to_lowercase();
            tags.iter().any(|t| low.starts_with(*t))
        })
        .map(|(_, v)| v)
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items.first().map(stringify).unwrap_or_default(),
        other => other.to_string(),
    }
}
