//! The agent's tool set.
//!
//! Each tool is a typed implementation of [`Tool`]. [`SafeTool`] is the one
//! place arguments are validated and attempts are timed out and retried;
//! the agent only ever sees [`DynTool`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tenderscope_core::{Error, NormalizedNotice, QueryIntent, build_expert_query, normalize_notice};
use tenderscope_store::{Repository, SummaryUpdate};
use tenderscope_sync::NoticeSearch;
use tracing::{debug, warn};

use crate::llm::{ToolCall, ToolSchema};

pub const SUMMARY_IT_MAX: usize = 600;
pub const SUMMARY_EN_MAX: usize = 220;
pub const MAX_SEARCH_LIMIT: u32 = 50;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),
    #[error("invalid arguments for {tool}: {message}")]
    Validation { tool: String, message: String },
    #[error("tool:{tool} timed out after {after_ms}ms")]
    Timeout { tool: String, after_ms: u64 },
    #[error("{0}")]
    Failed(Error),
}

impl From<ToolError> for Error {
    fn from(e: ToolError) -> Self {
        match e {
            ToolError::Unknown(_) | ToolError::Validation { .. } => Self::Validation(e.to_string()),
            ToolError::Timeout { tool, after_ms } => Self::Timeout { tool, after_ms },
            ToolError::Failed(inner) => inner,
        }
    }
}

/// Timeout and retry settings shared by every tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolPolicy {
    pub timeout: Duration,
    /// Extra attempts after the first.
    pub retries: u32,
    /// Multiplied by the attempt number after each failure.
    pub backoff: Duration,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            retries: 2,
            backoff: Duration::from_millis(300),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    type Input: DeserializeOwned + Clone + Send + Sync;

    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON schema of `Input`.
    fn parameters(&self) -> Value;

    /// Range checks beyond what deserialisation enforces.
    fn check(&self, _input: &Self::Input) -> tenderscope_core::Result<()> {
        Ok(())
    }

    async fn run(&self, input: Self::Input) -> tenderscope_core::Result<Value>;
}

/// Object-safe face of a wrapped tool.
#[async_trait]
pub trait DynTool: Send + Sync {
    fn name(&self) -> &str;
    fn schema(&self) -> ToolSchema;
    async fn invoke(&self, arguments: &str) -> Result<Value, ToolError>;
}

pub struct SafeTool<T> {
    inner: T,
    policy: ToolPolicy,
}

impl<T: Tool> SafeTool<T> {
    pub fn new(inner: T) -> Self {
        Self::with_policy(inner, ToolPolicy::default())
    }

    pub fn with_policy(inner: T, policy: ToolPolicy) -> Self {
        Self { inner, policy }
    }

    fn parse(&self, arguments: &str) -> Result<T::Input, ToolError> {
        let invalid = |message: String| ToolError::Validation {
            tool: self.inner.name().to_string(),
            message,
        };
        let raw = if arguments.trim().is_empty() { "{}" } else { arguments };
        let input: T::Input = serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;
        self.inner.check(&input).map_err(|e| match e {
            Error::Validation(msg) => invalid(msg),
            other => invalid(other.to_string()),
        })?;
        Ok(input)
    }
}

#[async_trait]
impl<T: Tool> DynTool for SafeTool<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.inner.name().to_string(),
            description: self.inner.description().to_string(),
            parameters: self.inner.parameters(),
        }
    }

    async fn invoke(&self, arguments: &str) -> Result<Value, ToolError> {
        let name = self.inner.name();
        let input = self.parse(arguments)?;

        let mut last = None;
        for attempt in 0..=self.policy.retries {
            let err = match tokio::time::timeout(self.policy.timeout, self.inner.run(input.clone())).await {
                Ok(Ok(out)) => return Ok(out),
                Ok(Err(e)) if !e.is_retryable() => return Err(ToolError::Failed(e)),
                Ok(Err(e)) => ToolError::Failed(e),
                Err(_) => ToolError::Timeout {
                    tool: name.to_string(),
                    after_ms: self.policy.timeout.as_millis() as u64,
                },
            };
            warn!(tool = name, attempt, error = %err, "tool attempt failed");
            last = Some(err);
            if attempt < self.policy.retries {
                tokio::time::sleep(self.policy.backoff * (attempt + 1)).await;
            }
        }
        Err(last.unwrap_or_else(|| ToolError::Failed(Error::Internal(format!("{name}: no attempts")))))
    }
}

/// Fixed registry the agent dispatches into by name.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn DynTool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: impl DynTool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// The five agent tools over one search client and repository.
    pub fn standard(search: Arc<dyn NoticeSearch>, repo: Repository) -> Self {
        Self::new()
            .with(SafeTool::new(BuildTedQuery))
            .with(SafeTool::new(SearchTenders { search }))
            .with(SafeTool::new(SaveTenderSummary { repo: repo.clone() }))
            .with(SafeTool::new(SaveMatchScore { repo }))
            .with(SafeTool::new(GetCurrentDate))
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    pub async fn dispatch(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == call.name)
            .ok_or_else(|| ToolError::Unknown(call.name.clone()))?;
        debug!(tool = %call.name, "dispatching tool call");
        tool.invoke(&call.arguments).await
    }
}

// ── build_ted_query ──

pub struct BuildTedQuery;

#[async_trait]
impl Tool for BuildTedQuery {
    type Input = QueryIntent;

    fn name(&self) -> &'static str {
        "build_ted_query"
    }

    fn description(&self) -> &'static str {
        "Build a valid TED Expert Query string from a structured intent."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "country": {"type": "string", "description": "ISO 3166 alpha-3 code", "default": "ITA"},
                "daysBack": {"type": "integer", "minimum": 0, "maximum": 30, "default": 3},
                "cpv": {"type": "array", "items": {"type": "string"}},
                "text": {"type": "string", "description": "Free keywords"}
            },
            "additionalProperties": false
        })
    }

    fn check(&self, input: &QueryIntent) -> tenderscope_core::Result<()> {
        input.validate()
    }

    async fn run(&self, input: QueryIntent) -> tenderscope_core::Result<Value> {
        Ok(Value::String(build_expert_query(&input)))
    }
}

// ── search_tenders ──

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchInput {
    pub q: String,
    #[serde(default = "default_search_limit")]
    pub limit: u32,
}

fn default_search_limit() -> u32 {
    10
}

pub struct SearchTenders {
    pub search: Arc<dyn NoticeSearch>,
}

#[async_trait]
impl Tool for SearchTenders {
    type Input = SearchInput;

    fn name(&self) -> &'static str {
        "search_tenders"
    }

    fn description(&self) -> &'static str {
        "Search TED notices using an Expert Query. Returns an array of normalised tenders."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "q": {"type": "string", "description": "Expert Query from build_ted_query"},
                "limit": {"type": "integer", "minimum": 1, "maximum": MAX_SEARCH_LIMIT, "default": 10}
            },
            "required": ["q"],
            "additionalProperties": false
        })
    }

    fn check(&self, input: &SearchInput) -> tenderscope_core::Result<()> {
        if input.q.trim().is_empty() {
            return Err(Error::validation("q must not be empty"));
        }
        if !(1..=MAX_SEARCH_LIMIT).contains(&input.limit) {
            return Err(Error::validation(format!(
                "limit must be between 1 and {MAX_SEARCH_LIMIT}, got {}",
                input.limit
            )));
        }
        Ok(())
    }

    async fn run(&self, input: SearchInput) -> tenderscope_core::Result<Value> {
        let notices: Vec<NormalizedNotice> = self
            .search
            .search(input.q.trim(), input.limit)
            .await?
            .iter()
            .map(normalize_notice)
            .collect();
        serde_json::to_value(notices).map_err(|e| Error::Internal(e.to_string()))
    }
}

// ── save_tender_summary ──

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SummaryInput {
    #[serde(rename = "tenderId")]
    pub tender_id: String,
    #[serde(default)]
    pub summary_it: Option<String>,
    #[serde(default)]
    pub summary_en: Option<String>,
}

/// Drop fenced blocks, collapse whitespace and cap at `max` characters.
/// Nothing left means no summary.
pub fn sanitize_summary(text: Option<&str>, max: usize) -> Option<String> {
    let mut s = text?.to_string();
    while let Some(open) = s.find("```") {
        let Some(len) = s[open + 3..].find("```") else {
            break;
        };
        s.replace_range(open..open + 3 + len + 3, "");
    }
    let collapsed: String = s
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max)
        .collect();
    let trimmed = collapsed.trim_end();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub struct SaveTenderSummary {
    pub repo: Repository,
}

#[async_trait]
impl Tool for SaveTenderSummary {
    type Input = SummaryInput;

    fn name(&self) -> &'static str {
        "save_tender_summary"
    }

    fn description(&self) -> &'static str {
        "Persist AI-generated summaries for a tender."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tenderId": {"type": "string"},
                "summary_it": {"type": "string"},
                "summary_en": {"type": "string"}
            },
            "required": ["tenderId"],
            "additionalProperties": false
        })
    }

    fn check(&self, input: &SummaryInput) -> tenderscope_core::Result<()> {
        if input.tender_id.trim().is_empty() {
            return Err(Error::validation("tenderId must not be empty"));
        }
        Ok(())
    }

    async fn run(&self, input: SummaryInput) -> tenderscope_core::Result<Value> {
        let update = SummaryUpdate {
            tender_id: input.tender_id,
            summary_it: sanitize_summary(input.summary_it.as_deref(), SUMMARY_IT_MAX),
            summary_en: sanitize_summary(input.summary_en.as_deref(), SUMMARY_EN_MAX),
        };
        self.repo.save_tender_summary(update, Utc::now()).await?;
        Ok(Value::String("OK".into()))
    }
}

// ── save_match_score ──

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchInput {
    #[serde(rename = "companyId")]
    pub company_id: String,
    #[serde(rename = "tenderId")]
    pub tender_id: String,
    #[serde(default)]
    pub score: f64,
}

pub struct SaveMatchScore {
    pub repo: Repository,
}

#[async_trait]
impl Tool for SaveMatchScore {
    type Input = MatchInput;

    fn name(&self) -> &'static str {
        "save_match_score"
    }

    fn description(&self) -> &'static str {
        "Save a company/tender relevance score between 0 and 1."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "companyId": {"type": "string"},
                "tenderId": {"type": "string"},
                "score": {"type": "number", "minimum": 0, "maximum": 1, "default": 0}
            },
            "required": ["companyId", "tenderId"],
            "additionalProperties": false
        })
    }

    fn check(&self, input: &MatchInput) -> tenderscope_core::Result<()> {
        if input.company_id.trim().is_empty() || input.tender_id.trim().is_empty() {
            return Err(Error::validation("companyId and tenderId must not be empty"));
        }
        if !(0.0..=1.0).contains(&input.score) {
            return Err(Error::validation(format!(
                "score must be between 0 and 1, got {}",
                input.score
            )));
        }
        Ok(())
    }

    async fn run(&self, input: MatchInput) -> tenderscope_core::Result<Value> {
        self.repo
            .save_match_score(&input.company_id, &input.tender_id, input.score, Utc::now())
            .await?;
        Ok(Value::String("OK".into()))
    }
}

// ── get_current_date ──

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

pub struct GetCurrentDate;

#[async_trait]
impl Tool for GetCurrentDate {
    type Input = NoArgs;

    fn name(&self) -> &'static str {
        "get_current_date"
    }

    fn description(&self) -> &'static str {
        "Returns the current server date as YYYYMMDD."
    }

    fn parameters(&self) -> Value {
        json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    async fn run(&self, _input: NoArgs) -> tenderscope_core::Result<Value> {
        Ok(Value::String(Utc::now().format("%Y%m%d").to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use tenderscope_core::RawNotice;

    fn fast() -> ToolPolicy {
        ToolPolicy {
            timeout: Duration::from_millis(50),
            retries: 2,
            backoff: Duration::from_millis(1),
        }
    }

    /// Fails `failures` times, then answers with the attempt count.
    struct Flaky {
        failures: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Tool for Flaky {
        type Input = NoArgs;

        fn name(&self) -> &'static str {
            "flaky"
        }
        fn description(&self) -> &'static str {
            "test"
        }
        fn parameters(&self) -> Value {
            json!({})
        }

        async fn run(&self, _input: NoArgs) -> tenderscope_core::Result<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err(Error::UpstreamApi {
                    status: 503,
                    message: format!("failure {n}"),
                })
            } else {
                Ok(json!(n))
            }
        }
    }

    fn flaky(failures: u32) -> (SafeTool<Flaky>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let tool = Flaky {
            failures,
            calls: calls.clone(),
        };
        (SafeTool::with_policy(tool, fast()), calls)
    }

    #[tokio::test]
    async fn fails_twice_then_succeeds() {
        let (tool, calls) = flaky(2);
        assert_eq!(tool.invoke("{}").await.unwrap(), json!(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_surfaces_last_error() {
        let (tool, calls) = flaky(3);
        let err = tool.invoke("").await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.to_string(), "TED API 503: failure 3");
    }

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        type Input = NoArgs;

        fn name(&self) -> &'static str {
            "slow"
        }
        fn description(&self) -> &'static str {
            "test"
        }
        fn parameters(&self) -> Value {
            json!({})
        }

        async fn run(&self, _input: NoArgs) -> tenderscope_core::Result<Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn timeout_is_distinct() {
        let tool = SafeTool::with_policy(Slow, ToolPolicy { retries: 0, ..fast() });
        let err = tool.invoke("{}").await.unwrap_err();
        assert_eq!(err.to_string(), "tool:slow timed out after 50ms");
        assert!(matches!(Error::from(err), Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn invalid_arguments_never_run() {
        let (tool, calls) = flaky(0);
        let err = tool.invoke(r#"{"unexpected": 1}"#).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn range_checks_are_validation() {
        let tool = SafeTool::new(BuildTedQuery);
        let err = tool.invoke(r#"{"daysBack": 45}"#).await.unwrap_err();
        assert!(matches!(err, ToolError::Validation { ref tool, .. } if tool == "build_ted_query"));
        assert_eq!(Error::from(err).status_code(), 400);

        let q = tool.invoke(r#"{"daysBack": 0, "text": "pulizia"}"#).await.unwrap();
        let q = q.as_str().unwrap();
        assert!(q.contains("publication-date >= today() AND"));
        assert!(q.contains(r#"notice-title ~ "pulizia""#));
    }

    struct Fixed(Vec<RawNotice>);

    #[async_trait]
    impl NoticeSearch for Fixed {
        async fn search(&self, _query: &str, limit: u32) -> tenderscope_core::Result<Vec<RawNotice>> {
            Ok(self.0.iter().take(limit as usize).cloned().collect())
        }
    }

    #[tokio::test]
    async fn search_normalises_and_bounds_limit() {
        let search = Arc::new(Fixed(vec![RawNotice::new(json!({
            "publication-number": 123,
            "notice-title": {"eng": "Cleaning services"}
        }))]));
        let tool = SafeTool::new(SearchTenders { search });
        let out = tool.invoke(r#"{"q": "(x)"}"#).await.unwrap();
        assert_eq!(out[0]["publicationNumber"], "123");
        assert_eq!(out[0]["title"], "Cleaning services");

        assert!(tool.invoke(r#"{"q": "(x)", "limit": 51}"#).await.is_err());
        assert!(tool.invoke(r#"{"q": "  "}"#).await.is_err());
        assert!(tool.invoke(r#"{"limit": 5}"#).await.is_err());
    }

    #[test]
    fn summary_sanitised() {
        let raw = "Servizio di pulizia\n\n```json\n{\"x\":1}\n```   presso  ASL";
        assert_eq!(
            sanitize_summary(Some(raw), 600).as_deref(),
            Some("Servizio di pulizia presso ASL")
        );
        assert_eq!(sanitize_summary(Some("```only```"), 600), None);
        assert_eq!(sanitize_summary(None, 600), None);
        assert_eq!(sanitize_summary(Some(&"à".repeat(700)), 600).unwrap().chars().count(), 600);
    }

    #[tokio::test]
    async fn save_summary_and_score_are_idempotent() {
        let repo = Repository::in_memory();
        let summary = SafeTool::new(SaveTenderSummary { repo: repo.clone() });
        let args = r#"{"tenderId": "9-2025", "summary_it": "Lavori", "summary_en": "Works"}"#;
        assert_eq!(summary.invoke(args).await.unwrap(), json!("OK"));
        assert_eq!(summary.invoke(args).await.unwrap(), json!("OK"));
        let t = repo.get_tender("9-2025").await.unwrap().unwrap();
        assert_eq!(t.summary_en.as_deref(), Some("Works"));

        let score = SafeTool::new(SaveMatchScore { repo: repo.clone() });
        score.invoke(r#"{"companyId": "acme", "tenderId": "9-2025", "score": 0.7}"#).await.unwrap();
        score.invoke(r#"{"companyId": "acme", "tenderId": "9-2025"}"#).await.unwrap();
        let m = repo.get_match_score("acme", "9-2025").await.unwrap().unwrap();
        assert_eq!(m.score, 0.0);
        assert!(score.invoke(r#"{"companyId": "acme", "tenderId": "9", "score": 1.5}"#).await.is_err());
    }

    #[tokio::test]
    async fn current_date_format() {
        let out = SafeTool::new(GetCurrentDate).invoke("{}").await.unwrap();
        let s = out.as_str().unwrap();
        assert_eq!(s.len(), 8);
        assert!(s.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn dispatch_by_name() {
        let tools = ToolSet::standard(Arc::new(Fixed(vec![])), Repository::in_memory());
        let names: Vec<_> = tools.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            ["build_ted_query", "search_tenders", "save_tender_summary", "save_match_score", "get_current_date"]
        );
        let call = ToolCall {
            id: "1".into(),
            name: "delete_everything".into(),
            arguments: "{}".into(),
        };
        assert_eq!(
            tools.dispatch(&call).await.unwrap_err(),
            ToolError::Unknown("delete_everything".into())
        );
    }
}
