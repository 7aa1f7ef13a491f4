//! Terminal rendering for notices and parsed chat tables.

use tenderscope_core::{NormalizedNotice, ParsedTableRow};

const TITLE_WIDTH: usize = 60;
const BUYER_WIDTH: usize = 32;
const MAX_CPV_ITEMS: usize = 5;

// ── Public API ──

/// Print one notice as a vertical card.
pub fn print_notice_card(notice: &NormalizedNotice) {
    println!("=== {} ===", notice.publication_number);
    if !notice.title.is_empty() {
        println!("{}", notice.title);
    }
    println!();

    print_field("buyer", Some(notice.buyer.as_str()));
    if notice.notice_id != notice.publication_number {
        print_field("notice id", Some(notice.notice_id.as_str()));
    }
    print_field("published", notice.publication_date.as_deref());
    print_field("deadline", notice.deadline_date.as_deref());
    print_cpv(notice);
    print_field("value (EUR)", notice.value.map(format_value).as_deref());
    print_field("document", notice.document_url.as_deref());
    print_field("description (it)", notice.description_it.as_deref());
    print_field("description (en)", notice.description_en.as_deref());
    println!();
}

/// Print notices as one compact line each.
pub fn print_notice_table(notices: &[NormalizedNotice]) {
    if notices.is_empty() {
        println!("(no notices)");
        return;
    }
    println!(
        "{:<14} {:<10} {:<10} {:<bw$} {}",
        "PubNo",
        "Published",
        "Deadline",
        "Buyer",
        "Title",
        bw = BUYER_WIDTH
    );
    for n in notices {
        println!(
            "{:<14} {:<10} {:<10} {:<bw$} {}",
            n.publication_number,
            n.publication_date.as_deref().unwrap_or("-"),
            n.deadline_date.as_deref().unwrap_or("-"),
            truncate(&n.buyer, BUYER_WIDTH),
            truncate(&n.title, TITLE_WIDTH),
            bw = BUYER_WIDTH
        );
    }
}

/// Print rows recovered from an assistant table.
pub fn print_parsed_rows(rows: &[ParsedTableRow]) {
    if rows.is_empty() {
        println!("(no table rows found)");
        return;
    }
    for row in rows {
        println!("=== {} ===", row.pubno);
        if !row.title.is_empty() {
            println!("{}", row.title);
        }
        print_field("buyer", Some(row.buyer.as_str()));
        print_field("notice id", row.notice_id.as_deref());
        print_field("published", row.published.as_deref());
        print_field("deadline", row.deadline.as_deref());
        print_field("cpv", row.cpv.as_deref());
        print_field("value", row.value.as_deref());
        print_field("pdf", row.pdf.as_deref());
        print_field("description", row.description.as_deref());
        println!();
    }
}

// ── Field rendering ──

fn print_field(label: &str, value: Option<&str>) {
    match value {
        Some(v) if !v.trim().is_empty() => println!("  {:<20} {}", label, v),
        _ => {}
    }
}

fn print_cpv(notice: &NormalizedNotice) {
    let codes: &[String] = if notice.cpv_all.is_empty() {
        notice.cpv.as_slice()
    } else {
        &notice.cpv_all
    };
    if codes.is_empty() {
        return;
    }
    let shown: Vec<&str> = codes.iter().take(MAX_CPV_ITEMS).map(String::as_str).collect();
    let more = codes.len().saturating_sub(MAX_CPV_ITEMS);
    if more > 0 {
        println!("  {:<20} {} (+{more} more)", "cpv", shown.join(", "));
    } else {
        println!("  {:<20} {}", "cpv", shown.join(", "));
    }
}

fn format_value(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.2}")
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
