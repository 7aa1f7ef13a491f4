use async_trait::async_trait;
use tenderscope_core::{RawNotice, Result};

/// Anything that can answer a TED expert query.
///
/// Implementations return the raw `notices` array and never widen the
/// query themselves; an empty result is not an error.
#[async_trait]
pub trait NoticeSearch: Send + Sync {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<RawNotice>>;
}
