//! Domain core for Tenderscope: TED expert-query construction, notice
//! normalisation, relevance scoring, chat-table parsing and CSV export.
//!
//! Everything here is synchronous and free of I/O.

pub mod chat;
pub mod dates;
pub mod error;
pub mod export;
pub mod notice;
pub mod profile;
pub mod query;
pub mod records;
pub mod score;
pub mod table;

pub use chat::{ChatMessage, Role};
pub use dates::normalize_date;
pub use error::{Error, Result};
pub use export::{CSV_HEADER, ExportRow, rows_to_csv};
pub use notice::{NormalizedNotice, RawNotice, normalize_notice};
pub use profile::{Preferences, PreferencesInput, UserProfile};
pub use query::{QueryIntent, build_expert_query};
pub use records::{Favorite, MatchScore, SavedSearch, SavedSearchInput, TenderRecord};
pub use score::{rank_for_digest, score_notice};
pub use table::{ParsedTableRow, clean_assistant_text, parse_markdown_table};
