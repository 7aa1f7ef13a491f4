//! TED expert-query construction from a structured search intent.
//!
//! Output is a single string of parenthesised clauses joined with `AND`:
//!
//! ```text
//! (place-of-performance IN (ITA)) AND (publication-date >= today(-3) AND publication-date <= today())
//!   AND (classification-cpv = "72000000" OR classification-cpv = "48000000")
//!   AND (notice-title ~ "software" OR description-proc ~ "software")
//! ```
//!
//! Optional clauses are omitted entirely when their field is absent.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_COUNTRY: &str = "ITA";
pub const DEFAULT_DAYS_BACK: u32 = 3;
pub const MAX_DAYS_BACK: u32 = 30;

/// Structured search intent, as produced by the agent or the rows endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryIntent {
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_days_back")]
    pub days_back: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpv: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

fn default_days_back() -> u32 {
    DEFAULT_DAYS_BACK
}

impl Default for QueryIntent {
    fn default() -> Self {
        Self {
            country: default_country(),
            days_back: DEFAULT_DAYS_BACK,
            cpv: None,
            text: None,
        }
    }
}

impl QueryIntent {
    pub fn validate(&self) -> Result<()> {
        if self.days_back > MAX_DAYS_BACK {
            return Err(Error::validation(format!(
                "daysBack must be between 0 and {MAX_DAYS_BACK}, got {}",
                self.days_back
            )));
        }
        Ok(())
    }
}

/// Build the expert-query string for an intent.
///
/// Deterministic for identical input. Does not validate `days_back`; call
/// [`QueryIntent::validate`] first at trust boundaries.
pub fn build_expert_query(intent: &QueryIntent) -> String {
    let mut parts = vec![
        format!(
            "(place-of-performance IN ({}))",
            sanitize_country(&intent.country)
        ),
        format!(
            "(publication-date >= {} AND publication-date <= today())",
            relative_day(intent.days_back)
        ),
    ];

    let codes: Vec<&str> = intent
        .cpv
        .iter()
        .flatten()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    if !codes.is_empty() {
        let tests: Vec<String> = codes
            .iter()
            .map(|c| format!("classification-cpv = \"{}\"", escape_literal(c)))
            .collect();
        parts.push(format!("({})", tests.join(" OR ")));
    }

    if let Some(text) = intent.text.as_deref().map(str::trim)
        && !text.is_empty()
    {
        let t = escape_literal(text);
        parts.push(format!("(notice-title ~ \"{t}\" OR description-proc ~ \"{t}\")"));
    }

    parts.join(" AND ")
}

/// `today(-N)`, or `today()` for a zero offset.
fn relative_day(days_back: u32) -> String {
    if days_back == 0 {
        "today()".to_string()
    } else {
        format!("today(-{days_back})")
    }
}

/// Escape backslashes and double quotes for a quoted expert-query literal.
fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Country codes are bare identifiers in the query; keep only alphanumeric
/// tokens so nothing can close the `IN (...)` group early.
fn sanitize_country(country: &str) -> String {
    let tokens: Vec<String> = country
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_ascii_uppercase())
        .collect();
    if tokens.is_empty() {
        DEFAULT_COUNTRY.to_string()
    } else {
        tokens.join(" ")
    }
}
