//! Relevance heuristic for the daily digest.
//!
//! A region hit is worth more than every other term combined, so a notice
//! in one of the user's regions always outranks one that is not.

use chrono::NaiveDate;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::notice::NormalizedNotice;
use crate::profile::UserProfile;

const REGION_WEIGHT: f64 = 10.0;
const CPV_WEIGHT: f64 = 3.0;
pub const DIGEST_SIZE: usize = 8;

/// Score one notice against a profile. Higher is more relevant.
///
/// `minValue` is deliberately not considered here; see [`rank_for_digest`].
pub fn score_notice(notice: &NormalizedNotice, profile: &UserProfile, today: NaiveDate) -> f64 {
    let prefs = &profile.preferences;
    let mut score = 0.0;

    let haystack = fold(&format!("{} {}", notice.buyer, notice.title));
    if prefs
        .regions
        .iter()
        .map(|r| fold(r))
        .any(|r| !r.is_empty() && haystack.contains(&r))
    {
        score += REGION_WEIGHT;
    }

    let codes: Vec<&str> = if notice.cpv_all.is_empty() {
        notice.cpv.as_deref().into_iter().collect()
    } else {
        notice.cpv_all.iter().map(String::as_str).collect()
    };
    if prefs
        .cpv
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .any(|p| codes.iter().any(|c| c.starts_with(p)))
    {
        score += CPV_WEIGHT;
    }

    score + recency(notice.publication_date.as_deref(), prefs.days_back, today)
}

/// `(daysBack - age + 1) / (daysBack + 1)` inside the window, else 0.
fn recency(published: Option<&str>, days_back: u32, today: NaiveDate) -> f64 {
    let Some(date) = published.and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) else {
        return 0.0;
    };
    let age = (today - date).num_days();
    let window = i64::from(days_back);
    if age < 0 || age > window {
        return 0.0;
    }
    (window - age + 1) as f64 / (window + 1) as f64
}

/// Apply the min-value gate, rank by score (stable, so ties keep API
/// order) and keep the top [`DIGEST_SIZE`].
///
/// A positive `minValue` excludes notices without a value.
pub fn rank_for_digest(
    notices: Vec<NormalizedNotice>,
    profile: &UserProfile,
    today: NaiveDate,
) -> Vec<(NormalizedNotice, f64)> {
    let min_value = profile.preferences.min_value.filter(|m| *m > 0.0);

    let mut ranked: Vec<(NormalizedNotice, f64)> = notices
        .into_iter()
        .filter(|n| match min_value {
            Some(min) => n.value.is_some_and(|v| v >= min),
            None => true,
        })
        .map(|n| {
            let s = score_notice(&n, profile, today);
            (n, s)
        })
        .collect();

    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(DIGEST_SIZE);
    ranked
}

/// Decompose, drop combining marks, lower-case and trim.
fn fold(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    fn notice(id: &str, buyer: &str, cpv: &[&str], published: Option<&str>) -> NormalizedNotice {
        NormalizedNotice {
            publication_number: id.into(),
            notice_id: id.into(),
            title: "Servizi".into(),
            buyer: buyer.into(),
            publication_date: published.map(String::from),
            deadline_date: None,
            cpv: cpv.first().map(|c| c.to_string()),
            cpv_all: cpv.iter().map(|c| c.to_string()).collect(),
            value: None,
            document_url: None,
            description_it: None,
            description_en: None,
        }
    }

    fn profile(regions: &[&str], cpv: &[&str], days_back: u32) -> UserProfile {
        let mut p = UserProfile::defaults("u");
        p.preferences.regions = regions.iter().map(|s| s.to_string()).collect();
        p.preferences.cpv = cpv.iter().map(|s| s.to_string()).collect();
        p.preferences.days_back = days_back;
        p
    }

    #[test]
    fn diacritics_folded() {
        assert_eq!(fold("  Forlì-Cesena "), "forli-cesena");
        assert_eq!(fold("VALLE D'AOSTA"), "valle d'aosta");
    }

    #[test]
    fn region_dominates() {
        let p = profile(&["Forlì"], &["909"], 7);
        let regional = notice("a", "Comune di Forli", &[], None);
        let everything_else = notice("b", "ASL Roma", &["90911200"], Some("2025-06-15"));
        assert!(score_notice(&regional, &p, today()) > score_notice(&everything_else, &p, today()));
    }

    #[test]
    fn cpv_prefix_on_any_code() {
        let p = profile(&[], &["4523"], 7);
        let n = notice("a", "x", &["71000000", "45233140"], None);
        assert_eq!(score_notice(&n, &p, today()), 3.0);
    }

    #[test]
    fn recency_window() {
        let p = profile(&[], &[], 4);
        let fresh = notice("a", "x", &[], Some("2025-06-15"));
        let older = notice("b", "x", &[], Some("2025-06-13"));
        let stale = notice("c", "x", &[], Some("2025-06-01"));
        let future = notice("d", "x", &[], Some("2025-06-20"));
        assert_eq!(score_notice(&fresh, &p, today()), 1.0);
        assert!((score_notice(&older, &p, today()) - 0.6).abs() < 1e-9);
        assert_eq!(score_notice(&stale, &p, today()), 0.0);
        assert_eq!(score_notice(&future, &p, today()), 0.0);
    }

    #[test]
    fn ties_keep_api_order() {
        let p = profile(&[], &[], 7);
        let notices: Vec<_> = ["n1", "n2", "n3"]
            .iter()
            .map(|id| notice(id, "x", &[], None))
            .collect();
        let ranked = rank_for_digest(notices, &p, today());
        let ids: Vec<_> = ranked.iter().map(|(n, _)| n.publication_number.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn truncates_to_eight_and_sorts() {
        let p = profile(&["Lazio"], &[], 7);
        let mut notices: Vec<_> = (0..12)
            .map(|i| notice(&format!("n{i}"), "ASL", &[], None))
            .collect();
        notices.push(notice("hit", "Regione Lazio", &[], None));
        let ranked = rank_for_digest(notices, &p, today());
        assert_eq!(ranked.len(), 8);
        assert_eq!(ranked[0].0.publication_number, "hit");
        assert_eq!(ranked[1].0.publication_number, "n0");
    }

    #[test]
    fn min_value_gate() {
        let mut p = profile(&[], &[], 7);
        p.preferences.min_value = Some(100_000.0);
        let mut big = notice("big", "x", &[], None);
        big.value = Some(250_000.0);
        let mut small = notice("small", "x", &[], None);
        small.value = Some(5_000.0);
        let unknown = notice("unknown", "x", &[], None);

        let ranked = rank_for_digest(vec![small, unknown, big], &p, today());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.publication_number, "big");
    }
}
