use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document {collection}/{id} not found")]
    NotFound { collection: &'static str, id: String },

    #[error("invalid document: {0}")]
    Invalid(String),

    #[error("serialisation error: {0}")]
    Serde(#[from] serde_json::Error),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("{0}")]
    Other(String),
}

impl From<StoreError> for tenderscope_core::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => Self::NotFound(e.to_string()),
            StoreError::Invalid(msg) => Self::Validation(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
