//! OpenAI-compatible chat completions with tool calling.
//!
//! Gemini, OpenRouter and OpenAI all expose the same `/chat/completions`
//! shape, so one client covers every provider; only the base URL, key and
//! model differ.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tenderscope_core::{ChatMessage, Role};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM API {status}: {body}")]
    Api { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    Other(String),
}

impl From<LlmError> for tenderscope_core::Error {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Config(msg) => Self::Config(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

// ── Messages ──

/// Roles in the agent's internal log. `Tool` never leaves the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model. `arguments` is the raw JSON
/// string exactly as the model produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub role: AgentRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AgentMessage {
    fn text(role: AgentRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(AgentRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(AgentRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(AgentRole::Assistant, content)
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: AgentRole::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(call_id: &str, tool_name: &str, output: impl Into<String>) -> Self {
        Self {
            role: AgentRole::Tool,
            content: Some(output.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.to_string()),
            name: Some(tool_name.to_string()),
        }
    }

    /// The caller-visible projection. Tool traffic and content-less
    /// assistant turns have none.
    pub fn to_chat(&self) -> Option<ChatMessage> {
        if self.tool_calls.is_some() {
            return None;
        }
        let role = match self.role {
            AgentRole::System => Role::System,
            AgentRole::User => Role::User,
            AgentRole::Assistant => Role::Assistant,
            AgentRole::Tool => return None,
        };
        let content = self.content.as_deref()?;
        Some(ChatMessage {
            role,
            content: content.to_string(),
            name: self.name.clone(),
        })
    }
}

impl From<&ChatMessage> for AgentMessage {
    fn from(m: &ChatMessage) -> Self {
        let role = match m.role {
            Role::System => AgentRole::System,
            Role::User => AgentRole::User,
            Role::Assistant => AgentRole::Assistant,
        };
        let mut msg = Self::text(role, m.content.trim());
        msg.name = m.name.clone();
        msg
    }
}

/// One model turn: either final text or a batch of tool calls.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatResponse {
    Content(String),
    ToolCalls(Vec<ToolCall>),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion. An empty `tools` slice disables tool calling.
    async fn chat(
        &self,
        messages: &[AgentMessage],
        tools: &[ToolSchema],
    ) -> Result<ChatResponse, LlmError>;
}

// ── Providers ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    OpenRouter,
    OpenAi,
}

impl Provider {
    pub fn base_url(self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-pro",
            Self::OpenRouter => "openrouter/auto",
            Self::OpenAi => "gpt-4o-mini",
        }
    }
}

// ── Client ──

pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(base_url: &str, api_key: String, model: String) -> Self {
        Self::with_http(reqwest::Client::new(), base_url, api_key, model)
    }

    /// Reuse an existing connection pool.
    pub fn with_http(client: reqwest::Client, base_url: &str, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    pub fn for_provider(provider: Provider, api_key: String, model: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| provider.default_model().to_string());
        Self::new(provider.base_url(), api_key, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

fn format_messages(messages: &[AgentMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({ "role": m.role });
            if let Some(ref content) = m.content {
                msg["content"] = json!(content);
            }
            if let Some(ref calls) = m.tool_calls {
                msg["tool_calls"] = json!(calls
                    .iter()
                    .map(|tc| json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": tc.arguments,
                        }
                    }))
                    .collect::<Vec<_>>());
            }
            if let Some(ref id) = m.tool_call_id {
                msg["tool_call_id"] = json!(id);
            }
            if let Some(ref name) = m.name {
                msg["name"] = json!(name);
            }
            msg
        })
        .collect()
}

fn format_tools(tools: &[ToolSchema]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect()
}

/// Read `choices[0].message` of a completion body.
fn parse_completion(body: &Value) -> Result<ChatResponse, LlmError> {
    let message = body
        .pointer("/choices/0/message")
        .ok_or_else(|| LlmError::Other("completion has no choices".into()))?;

    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        let calls: Vec<ToolCall> = calls
            .iter()
            .filter_map(|tc| {
                let function = tc.get("function")?;
                Some(ToolCall {
                    id: tc.get("id")?.as_str()?.to_string(),
                    name: function.get("name")?.as_str()?.to_string(),
                    // Some providers send arguments as an object.
                    arguments: match function.get("arguments") {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Null) | None => "{}".to_string(),
                        Some(other) => other.to_string(),
                    },
                })
            })
            .collect();
        if !calls.is_empty() {
            return Ok(ChatResponse::ToolCalls(calls));
        }
    }

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(ChatResponse::Content(content))
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn chat(
        &self,
        messages: &[AgentMessage],
        tools: &[ToolSchema],
    ) -> Result<ChatResponse, LlmError> {
        let mut request = json!({
            "model": self.model,
            "messages": format_messages(messages),
            "stream": false,
        });
        if !tools.is_empty() {
            request["tools"] = json!(format_tools(tools));
            request["tool_choice"] = json!("auto");
        }

        let url = format!("{}/chat/completions", self.base_url);
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "chat completion");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = resp.json().await?;
        parse_completion(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};

    #[test]
    fn parses_tool_calls() {
        let body = json!({"choices": [{"message": {
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "build_ted_query", "arguments": "{\"daysBack\":2}"}
            }]
        }}]});
        let ChatResponse::ToolCalls(calls) = parse_completion(&body).unwrap() else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "build_ted_query");
        assert_eq!(calls[0].arguments, r#"{"daysBack":2}"#);
    }

    #[test]
    fn object_arguments_are_stringified() {
        let body = json!({"choices": [{"message": {"tool_calls": [{
            "id": "c", "function": {"name": "get_current_date", "arguments": {}}
        }]}}]});
        let ChatResponse::ToolCalls(calls) = parse_completion(&body).unwrap() else {
            panic!("expected tool calls");
        };
        assert_eq!(calls[0].arguments, "{}");
    }

    #[test]
    fn parses_content_and_rejects_empty_choices() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "Ecco i bandi"}}]});
        assert_eq!(
            parse_completion(&body).unwrap(),
            ChatResponse::Content("Ecco i bandi".into())
        );
        assert!(parse_completion(&json!({"choices": []})).is_err());
    }

    #[test]
    fn tool_traffic_hidden_from_callers() {
        let call = ToolCall {
            id: "1".into(),
            name: "search_tenders".into(),
            arguments: "{}".into(),
        };
        assert!(AgentMessage::assistant_tool_calls(vec![call]).to_chat().is_none());
        assert!(AgentMessage::tool_result("1", "search_tenders", "[]").to_chat().is_none());
        let visible = AgentMessage::assistant("ok").to_chat().unwrap();
        assert_eq!(visible.role, Role::Assistant);
    }

    #[test]
    fn formats_tool_messages() {
        let msgs = format_messages(&[AgentMessage::tool_result("c1", "get_current_date", "20250615")]);
        assert_eq!(msgs[0]["role"], "tool");
        assert_eq!(msgs[0]["tool_call_id"], "c1");
        assert_eq!(msgs[0]["name"], "get_current_date");
    }

    #[tokio::test]
    async fn posts_to_chat_completions() {
        let seen: Arc<Mutex<Vec<(Option<String>, Value)>>> = Arc::default();
        let app = Router::new()
            .route(
                "/chat/completions",
                post(
                    |State(seen): State<Arc<Mutex<Vec<(Option<String>, Value)>>>>,
                     headers: HeaderMap,
                     Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        seen.lock().unwrap().push((auth, body));
                        Json(json!({"choices": [{"message": {"content": "ciao"}}]}))
                    },
                ),
            )
            .with_state(seen.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = OpenAiCompatClient::new(&format!("http://{addr}/"), "sk-test".into(), "m".into());
        let tools = [ToolSchema {
            name: "get_current_date".into(),
            description: "date".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }];
        let reply = client.chat(&[AgentMessage::user("ciao")], &tools).await.unwrap();
        assert_eq!(reply, ChatResponse::Content("ciao".into()));

        let seen = seen.lock().unwrap();
        let (auth, body) = &seen[0];
        assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
        assert_eq!(body["model"], "m");
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "get_current_date");
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[tokio::test]
    async fn error_status_surfaces() {
        let app = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = OpenAiCompatClient::new(&format!("http://{addr}"), "k".into(), "m".into());
        let err = client.chat(&[AgentMessage::user("x")], &[]).await.unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 401, .. }));
    }
}
