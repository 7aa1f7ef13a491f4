//! Sync layer: the TED notice-search client, the pull job that keeps the
//! tender collection fresh, and the daily digest mailer.

pub mod pull;
pub mod source;

pub use pull::{PullOptions, PullReport, pull_tenders};
pub use source::NoticeSearch;

#[cfg(feature = "http")]
pub mod digest;
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub mod mail;

#[cfg(feature = "http")]
pub use digest::{DigestReport, run_digest};
#[cfg(feature = "http")]
pub use http::{SearchError, TedClient};
#[cfg(feature = "http")]
pub use mail::{Delivery, MailError, Mailer};
