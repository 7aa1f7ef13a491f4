//! Bulk summarisation of freshly pulled tenders.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tenderscope_core::{Result, TenderRecord};
use tenderscope_store::{Repository, SummaryUpdate};
use tracing::{info, warn};

use crate::llm::{AgentMessage, ChatResponse, LlmClient};

pub const BATCH_LIMIT: usize = 10;
pub const CONCURRENCY: usize = 5;

const SUMMARY_PROMPT: &str = "Riassumi per un imprenditore italiano: titolo, stazione appaltante, scadenza, CPV se noto, valore se presente. \
Includi una riga in inglese brevissima prefissata con 'EN: '. Risposta breve, senza formattazioni speciali.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub processed: usize,
    pub failed: usize,
}

fn tender_brief(t: &TenderRecord) -> String {
    let or_nd = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/D".to_string());
    let mut brief = format!(
        "Titolo: {}\nBuyer: {}\nPubblicazione: {}\nScadenza: {}",
        t.title,
        t.buyer,
        or_nd(&t.publication_date),
        or_nd(&t.deadline),
    );
    if let Some(cpv) = t.cpv.first() {
        brief.push_str(&format!("\nCPV: {cpv}"));
    }
    if let Some(value) = t.value {
        brief.push_str(&format!("\nValore: {value} EUR"));
    }
    brief
}

/// Split model output at the first `EN:` marker into Italian and English.
pub fn split_summary(text: &str) -> (String, String) {
    let text = text.trim();
    match text.find("EN:") {
        Some(idx) => (
            text[..idx].trim().to_string(),
            text[idx + 3..].trim().to_string(),
        ),
        None => (text.to_string(), String::new()),
    }
}

async fn summarise(llm: &dyn LlmClient, tender: &TenderRecord) -> Result<SummaryUpdate> {
    let messages = [
        AgentMessage::system(SUMMARY_PROMPT),
        AgentMessage::user(tender_brief(tender)),
    ];
    let text = match llm.chat(&messages, &[]).await? {
        ChatResponse::Content(text) => text,
        ChatResponse::ToolCalls(_) => {
            return Err(tenderscope_core::Error::Internal(
                "model requested tools during summarisation".into(),
            ));
        }
    };
    let (it, en) = split_summary(&text);
    Ok(SummaryUpdate {
        tender_id: tender.id.clone(),
        summary_it: Some(it).filter(|s| !s.is_empty()),
        summary_en: Some(en).filter(|s| !s.is_empty()),
    })
}

/// Summarise up to [`BATCH_LIMIT`] unprocessed tenders, oldest first.
///
/// Each group of [`CONCURRENCY`] runs concurrently; its successes are
/// committed as one batch. Failures stay unprocessed for the next run.
pub async fn process_pending(
    llm: &dyn LlmClient,
    repo: &Repository,
    now: DateTime<Utc>,
) -> Result<ProcessReport> {
    let pending = repo.unprocessed_tenders(BATCH_LIMIT).await?;
    if pending.is_empty() {
        info!("no unprocessed tenders");
        return Ok(ProcessReport {
            processed: 0,
            failed: 0,
        });
    }

    let mut report = ProcessReport {
        processed: 0,
        failed: 0,
    };
    for group in pending.chunks(CONCURRENCY) {
        let results = join_all(group.iter().map(|t| summarise(llm, t))).await;
        let mut ok = Vec::with_capacity(results.len());
        for (tender, result) in group.iter().zip(results) {
            match result {
                Ok(update) => ok.push(update),
                Err(e) => {
                    warn!(tender = %tender.id, error = %e, "summary failed");
                    report.failed += 1;
                }
            }
        }
        if !ok.is_empty() {
            report.processed += repo.commit_summaries(ok, now).await?;
        }
    }

    info!(processed = report.processed, failed = report.failed, "summarisation complete");
    Ok(report)
}
