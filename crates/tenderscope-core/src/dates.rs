//! Lenient date normalisation shared by the notice normaliser and the chat
//! table parser.
//!
//! TED returns dates in several shapes: `2025-06-15`, `2025-06-15+02:00`,
//! `2025-06-15T10:00:00+02:00`, or `2025-06-15Z`. Assistant tables may also
//! carry Italian-style `15/06/2025`. All of these collapse to `YYYY-MM-DD`.
//! Anything else is passed through unverified rather than rejected.

use chrono::NaiveDate;

const ISO_DATE: &str = "%Y-%m-%d";
const ITALIAN_DATE: &str = "%d/%m/%Y";

/// Normalise a date-like string to `YYYY-MM-DD`.
///
/// Returns `None` only for blank input. When the value does not parse as a
/// date, the trimmed raw value is returned unchanged.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let clean = strip_offset(strip_time_of_day(raw));

    if let Some(date) = parse_date(clean) {
        return Some(date.format(ISO_DATE).to_string());
    }
    // A date prefix followed by something we do not recognise.
    if clean.len() > 10
        && clean.is_char_boundary(10)
        && let Ok(date) = NaiveDate::parse_from_str(&clean[..10], ISO_DATE)
    {
        return Some(date.format(ISO_DATE).to_string());
    }

    Some(raw.to_string())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, ISO_DATE)
        .or_else(|_| NaiveDate::parse_from_str(s, ITALIAN_DATE))
        .ok()
}

/// Drop a trailing `Thh:mm:ss...` segment.
fn strip_time_of_day(s: &str) -> &str {
    let bytes = s.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'T' {
            continue;
        }
        let rest = &bytes[i + 1..];
        if rest.len() >= 8
            && rest[0].is_ascii_digit()
            && rest[1].is_ascii_digit()
            && rest[2] == b':'
            && rest[3].is_ascii_digit()
            && rest[4].is_ascii_digit()
            && rest[5] == b':'
            && rest[6].is_ascii_digit()
            && rest[7].is_ascii_digit()
        {
            return &s[..i];
        }
    }
    s
}

/// Drop a `+hh:mm` offset and a trailing `Z`.
fn strip_offset(s: &str) -> &str {
    let s = match s.find('+') {
        Some(pos) => &s[..pos],
        None => s,
    };
    s.strip_suffix('Z').unwrap_or(s).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_iso_date() {
        assert_eq!(normalize_date("2025-06-15").as_deref(), Some("2025-06-15"));
    }

    #[test]
    fn offset_suffix_removed() {
        assert_eq!(
            normalize_date("2025-06-15+02:00").as_deref(),
            Some("2025-06-15")
        );
        assert_eq!(normalize_date("2025-06-15Z").as_deref(), Some("2025-06-15"));
    }

    #[test]
    fn full_timestamp_truncated() {
        assert_eq!(
            normalize_date("2025-06-15T10:30:00+02:00").as_deref(),
            Some("2025-06-15")
        );
        assert_eq!(
            normalize_date("2025-06-15T23:59:59.000Z").as_deref(),
            Some("2025-06-15")
        );
    }

    #[test]
    fn italian_format_accepted() {
        assert_eq!(normalize_date("15/06/2025").as_deref(), Some("2025-06-15"));
    }

    #[test]
    fn unparseable_passed_through() {
        assert_eq!(normalize_date(" entro giugno ").as_deref(), Some("entro giugno"));
        assert_eq!(normalize_date("2025-13-45").as_deref(), Some("2025-13-45"));
    }

    #[test]
    fn blank_is_none() {
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("   "), None);
    }

    #[test]
    fn whitespace_trimmed() {
        assert_eq!(normalize_date("  2025-01-02 ").as_deref(), Some("2025-01-02"));
    }
}
