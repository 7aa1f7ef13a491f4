//! Recovers tender rows from the compact markdown table the agent writes.
//!
//! The table is untrusted LLM output. Columns are matched by header name
//! only, using a short list of English and Italian synonyms; a column that
//! matches nothing is ignored and a field with no column is left unset.

use serde::{Deserialize, Serialize};

use crate::dates::normalize_date;

const FENCE: &str = "```";
const PLACEHOLDERS: &[&str] = &["—", "-", "–", "n/a", "n/d"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTableRow {
    pub pubno: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice_id: Option<String>,
    pub buyer: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Column index per field, resolved from the header row.
#[derive(Debug, Default)]
struct Columns {
    pubno: Option<usize>,
    notice_id: Option<usize>,
    buyer: Option<usize>,
    title: Option<usize>,
    published: Option<usize>,
    deadline: Option<usize>,
    cpv: Option<usize>,
    value: Option<usize>,
    pdf: Option<usize>,
    description: Option<usize>,
}

impl Columns {
    fn resolve(headers: &[String]) -> Self {
        let find = |pred: fn(&str) -> bool| headers.iter().position(|h| pred(h.as_str()));

        Self {
            pubno: find(|h| h.contains("pubno") || (is_publication(h) && !is_date(h))),
            notice_id: find(|h| {
                let compact: String = h.chars().filter(|c| c.is_alphanumeric()).collect();
                compact == "noticeid" || compact == "id"
            }),
            buyer: find(|h| has_any(h, &["buyer", "ente", "stazione appaltante"])),
            title: find(|h| has_any(h, &["title", "titolo", "oggetto"])),
            published: find(|h| {
                has_any(h, &["publish", "pubblicat"]) || (is_publication(h) && is_date(h))
            }),
            deadline: find(|h| has_any(h, &["deadline", "scadenza"])),
            cpv: find(|h| h.contains("cpv")),
            value: find(|h| has_any(h, &["value", "valore", "importo", "amount"])),
            pdf: find(|h| h == "pdf" || h == "document"),
            description: find(|h| h.contains("descr")),
        }
    }
}

fn has_any(header: &str, keys: &[&str]) -> bool {
    keys.iter().any(|k| header.contains(*k))
}

fn is_publication(header: &str) -> bool {
    has_any(header, &["publication", "pubblicazione"])
}

fn is_date(header: &str) -> bool {
    has_any(header, &["date", "data"])
}

/// Parse the first markdown table in `text` into rows.
///
/// Never fails: text without a well-formed table yields an empty list.
pub fn parse_markdown_table(text: &str) -> Vec<ParsedTableRow> {
    let cleaned = strip_fenced_blocks(text);
    let lines: Vec<&str> = cleaned.lines().collect();

    let Some(header_at) = (0..lines.len().saturating_sub(1))
        .find(|&i| is_pipe_row(lines[i]) && is_separator(lines[i + 1]))
    else {
        return Vec::new();
    };

    let headers: Vec<String> = split_cells(lines[header_at])
        .into_iter()
        .map(|h| h.to_lowercase())
        .collect();
    let cols = Columns::resolve(&headers);

    lines[header_at + 2..]
        .iter()
        .take_while(|line| !line.trim().is_empty())
        .filter(|line| is_pipe_row(line) && !is_separator(line))
        .map(|line| split_cells(line))
        .filter(|cells| cells.len() >= 3 && cells.iter().any(|c| !c.is_empty()))
        .map(|cells| build_row(&cols, &cells))
        .filter(|row| !row.title.is_empty() || !row.pubno.is_empty())
        .collect()
}

fn build_row(cols: &Columns, cells: &[String]) -> ParsedTableRow {
    let get = |idx: Option<usize>| -> Option<String> {
        let cell = cells.get(idx?)?.trim();
        if cell.is_empty() || PLACEHOLDERS.contains(&cell.to_lowercase().as_str()) {
            None
        } else {
            Some(cell.to_string())
        }
    };

    ParsedTableRow {
        pubno: get(cols.pubno).unwrap_or_default(),
        notice_id: get(cols.notice_id),
        buyer: get(cols.buyer).unwrap_or_default(),
        title: get(cols.title).unwrap_or_default(),
        published: get(cols.published).and_then(|d| normalize_date(&d)),
        deadline: get(cols.deadline).and_then(|d| normalize_date(&d)),
        cpv: get(cols.cpv),
        value: get(cols.value),
        pdf: get(cols.pdf),
        description: get(cols.description),
    }
}

fn is_pipe_row(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|')
        && t.contains('-')
        && t.chars().all(|c| matches!(c, '-' | ':' | '|' | ' '))
}

/// Cells between the outer pipes, trimmed. Positions are preserved so
/// header and body indices line up even with empty cells.
fn split_cells(line: &str) -> Vec<String> {
    let t = line.trim();
    let t = t.strip_prefix('|').unwrap_or(t);
    let t = t.strip_suffix('|').unwrap_or(t);
    t.split('|').map(|c| c.trim().to_string()).collect()
}

/// Remove every closed ```...``` block. An unterminated fence is left as is.
fn strip_fenced_blocks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(FENCE) {
        let after = &rest[start + FENCE.len()..];
        let Some(end) = after.find(FENCE) else {
            break;
        };
        out.push_str(&rest[..start]);
        rest = &after[end + FENCE.len()..];
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Prepare assistant text for display: drop a leading fenced block (tool
/// chatter some models emit) and collapse runs of blank lines.
pub fn clean_assistant_text(text: &str) -> String {
    let mut s = text;
    if let Some(after) = s.strip_prefix(FENCE)
        && let Some(end) = after.find(FENCE)
    {
        s = after[end + FENCE.len()..].trim_start_matches(['\r', '\n']);
    }
    collapse_blank_lines(s.trim())
}

fn collapse_blank_lines(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut newlines = 0;
    for ch in s.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out
}
