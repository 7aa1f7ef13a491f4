//! `POST /agent/chat`.

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tenderscope_core::{ChatMessage, ParsedTableRow, Role, clean_assistant_text, parse_markdown_table};
use tracing::info;

use crate::{AppState, ApiResult, Body};

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub thread_id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub messages: Vec<ChatMessage>,
    pub thread_id: String,
    /// Table parsed from the final assistant message, if it had one.
    pub rows: Vec<ParsedTableRow>,
}

/// Flatten a content value: plain text, a list of parts, or an object
/// with a `text`/`content` field.
fn content_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| match p {
                Value::String(s) => Some(s.as_str()),
                _ => ["text", "content", "value"]
                    .iter()
                    .find_map(|k| p.get(*k).and_then(Value::as_str)),
            })
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        Value::Object(_) => ["text", "content"]
            .iter()
            .find_map(|k| v.get(*k).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| v.to_string()),
        _ => String::new(),
    }
}

/// Map one client message onto a chat message. Role aliases from common
/// chat SDKs are accepted; anything unrecognised is treated as user text.
/// Messages without text are dropped.
pub fn caller_message(v: &Value) -> Option<ChatMessage> {
    let role = v
        .get("role")
        .or_else(|| v.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("user");
    let role = match role {
        "assistant" | "ai" => Role::Assistant,
        "system" | "developer" => Role::System,
        _ => Role::User,
    };
    let content = content_text(v.get("content").unwrap_or(&Value::Null));
    if content.is_empty() {
        return None;
    }
    Some(ChatMessage {
        role,
        content,
        name: v.get("name").and_then(Value::as_str).map(String::from),
    })
}

fn thread_id(v: Option<Value>) -> Option<String> {
    match v? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub async fn chat(
    State(state): State<AppState>,
    Body(req): Body<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    let incoming: Vec<ChatMessage> = req.messages.iter().filter_map(caller_message).collect();
    let outcome = state
        .agent()
        .run_turn(thread_id(req.thread_id), &incoming, Utc::now())
        .await?;

    let rows = parse_markdown_table(&outcome.reply);
    info!(thread = %outcome.thread_id, rows = rows.len(), "chat turn answered");
    let messages = outcome
        .messages
        .into_iter()
        .map(|mut m| {
            if m.role == Role::Assistant {
                m.content = clean_assistant_text(&m.content);
            }
            m
        })
        .collect();

    Ok(Json(ChatReply {
        messages,
        thread_id: outcome.thread_id,
        rows,
    }))
}
