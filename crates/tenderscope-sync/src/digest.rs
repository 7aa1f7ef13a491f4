//! Daily digest: for every opted-in profile, search the profile's window,
//! rank with the relevance scorer and mail the top notices.

use chrono::NaiveDate;
use serde::Serialize;
use tenderscope_core::score::rank_for_digest;
use tenderscope_core::{NormalizedNotice, QueryIntent, Result, UserProfile, build_expert_query, normalize_notice};
use tenderscope_store::Repository;
use tracing::{info, warn};

use crate::mail::{Delivery, Mailer};
use crate::NoticeSearch;

pub const DIGEST_SEARCH_LIMIT: u32 = 20;
pub const DIGEST_SUBJECT: &str = "Bandi selezionati per te";
const NOTICE_BASE_URL: &str = "https://ted.europa.eu/it/notice/-/detail/";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DigestReport {
    pub sent: usize,
    pub previewed: usize,
    /// Profiles with nothing to send.
    pub empty: usize,
    pub failed: usize,
}

/// The query for one profile: Italy, the profile's window and CPV codes.
pub fn profile_query(profile: &UserProfile) -> String {
    let prefs = &profile.preferences;
    build_expert_query(&QueryIntent {
        days_back: prefs.days_back,
        cpv: (!prefs.cpv.is_empty()).then(|| prefs.cpv.clone()),
        ..QueryIntent::default()
    })
}

pub async fn run_digest(
    source: &dyn NoticeSearch,
    repo: &Repository,
    mailer: &Mailer,
    public_url: Option<&str>,
    today: NaiveDate,
) -> Result<DigestReport> {
    let profiles = repo.digest_profiles().await?;
    let mut report = DigestReport::default();

    for profile in &profiles {
        let Some(email) = profile.preferences.email.as_deref() else {
            continue;
        };
        match digest_for(source, mailer, profile, email, public_url, today).await {
            Ok(Some(Delivery::Sent)) => report.sent += 1,
            Ok(Some(Delivery::Previewed)) => report.previewed += 1,
            Ok(None) => report.empty += 1,
            Err(e) => {
                warn!(uid = %profile.uid, error = %e, "digest failed for profile");
                report.failed += 1;
            }
        }
    }

    info!(
        profiles = profiles.len(),
        sent = report.sent,
        previewed = report.previewed,
        failed = report.failed,
        "digest run complete"
    );
    Ok(report)
}

async fn digest_for(
    source: &dyn NoticeSearch,
    mailer: &Mailer,
    profile: &UserProfile,
    email: &str,
    public_url: Option<&str>,
    today: NaiveDate,
) -> Result<Option<Delivery>> {
    let notices: Vec<NormalizedNotice> = source
        .search(&profile_query(profile), DIGEST_SEARCH_LIMIT)
        .await?
        .iter()
        .map(normalize_notice)
        .collect();

    let ranked = rank_for_digest(notices, profile, today);
    if ranked.is_empty() {
        return Ok(None);
    }
    let picked: Vec<NormalizedNotice> = ranked.into_iter().map(|(n, _)| n).collect();
    let html = render_digest_html(&picked, public_url);
    Ok(Some(mailer.send(email, DIGEST_SUBJECT, &html).await?))
}

/// HTML body of a digest mail: one list item per notice linking to its TED
/// page, then links back to the app.
pub fn render_digest_html(notices: &[NormalizedNotice], public_url: Option<&str>) -> String {
    let items: String = notices
        .iter()
        .map(|n| {
            let deadline = n.deadline_date.as_deref().unwrap_or("—");
            format!(
                r#"<li><a href="{}" target="_blank">{}</a> — <em>{}</em> — Scad.: {}</li>"#,
                escape_html(&notice_url(&n.publication_number)),
                escape_html(&n.title),
                escape_html(&n.buyer),
                escape_html(deadline),
            )
        })
        .collect();
    let app = escape_html(public_url.unwrap_or("#"));

    format!(
        r#"<div style="font-family:system-ui,-apple-system,Segoe UI,Roboto">
  <p><strong>Buongiorno!</strong> Ecco i bandi selezionati per te.</p>
  <ul>{items}</ul>
  <p style="margin-top:16px">
    <a href="{app}">Apri la tua pagina “Per te”</a> |
    <a href="{app}?prefs=1">Aggiorna preferenze</a>
  </p>
  <p style="color:#7a7a7a">Ricevi questa email perché hai attivato il riepilogo mattutino.</p>
</div>"#
    )
}

/// Public TED page for a publication number.
pub fn notice_url(publication_number: &str) -> String {
    match reqwest::Url::parse(NOTICE_BASE_URL) {
        Ok(mut url) => {
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.pop_if_empty().push(publication_number);
            }
            url.to_string()
        }
        Err(_) => format!("{NOTICE_BASE_URL}{publication_number}"),
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}
