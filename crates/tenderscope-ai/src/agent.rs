//! Conversation agent: a bounded tool-calling loop over one thread.
//!
//! Each turn restores the thread log from the store, appends the caller's
//! messages, alternates LLM calls and tool dispatches until the model
//! answers in prose (or the round budget runs out), then checkpoints the
//! whole log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tenderscope_core::{ChatMessage, Error, Result, Role};
use tenderscope_store::Repository;
use tracing::{info, warn};

use crate::llm::{AgentMessage, ChatResponse, LlmClient};
use crate::tools::ToolSet;

pub const MAX_ROUNDS: usize = 8;

pub const TABLE_HEADER: &str =
    "| PubNo | NoticeId | Buyer | Title | Published | Deadline | CPV | Value | Pdf | Description |";

const FALLBACK_REPLY: &str =
    "Non sono riuscito a completare la ricerca in questo turno. Puoi riformulare la richiesta?";

pub fn system_prompt() -> String {
    [
        "You assist with EU/Italian public procurement (TED v3).",
        "If the user asks for tenders in natural language:",
        "  1) Call build_ted_query to construct a valid Expert Query.",
        "  2) Call search_tenders with the returned query.",
        "Default country = ITA unless the user asks otherwise.",
        "When building rows:",
        " - NoticeId = noticeId if present, else publicationNumber.",
        " - Value = the numeric value when present, formatted like '€ 1 234 567'.",
        " - Pdf = documentUrl as returned by the tool; if missing put '—'. Do NOT fabricate URLs.",
        " - Description = a concise 1-2 sentence summary in Italian (max 140 chars), based on descriptionIt when present.",
        "Use date windows like today(-N)..today(); avoid absolute dates unless the user asks.",
        "If you save a summary, keep it concise in Italian; include a brief English line prefixed with 'EN:'.",
        "Finally, always return a concise human summary plus a compact markdown table.",
        "Include the following columns exactly in this order (use '—' if a value is unknown):",
        TABLE_HEADER,
        "Never wrap tool arguments in code fences. Only pass fields defined by the tool schema.",
    ]
    .join("\n")
}

/// Persisted conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub messages: Vec<AgentMessage>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Thread {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            messages: Vec::new(),
            updated_at: None,
        }
    }

    /// The log as the caller may see it: no tool traffic.
    pub fn visible(&self) -> Vec<ChatMessage> {
        self.messages.iter().filter_map(AgentMessage::to_chat).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub thread_id: String,
    /// Every caller-visible message in the thread after this turn.
    pub messages: Vec<ChatMessage>,
    pub reply: String,
    pub rounds: usize,
}

pub struct Agent {
    llm: Arc<dyn LlmClient>,
    tools: ToolSet,
    repo: Repository,
    max_rounds: usize,
}

impl Agent {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolSet, repo: Repository) -> Self {
        Self {
            llm,
            tools,
            repo,
            max_rounds: MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Run one turn. Only non-empty user and assistant messages from the
    /// caller are kept; at least one must be a user message.
    pub async fn run_turn(
        &self,
        thread_id: Option<String>,
        incoming: &[ChatMessage],
        now: DateTime<Utc>,
    ) -> Result<TurnOutcome> {
        let kept: Vec<&ChatMessage> = incoming
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant) && !m.content.trim().is_empty())
            .collect();
        if !kept.iter().any(|m| m.is_substantive_user()) {
            return Err(Error::validation(
                "messages must include at least one user message with non-empty content",
            ));
        }

        let thread_id = thread_id
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("thread-{}", uuid::Uuid::new_v4()));

        let mut thread = self
            .repo
            .load_thread::<Thread>(&thread_id)
            .await?
            .unwrap_or_else(|| Thread::new(&thread_id));
        if thread.messages.is_empty() {
            thread.messages.push(AgentMessage::system(format!(
                "Current date (server): {}",
                now.format("%Y-%m-%d")
            )));
        }
        thread.messages.extend(kept.into_iter().map(AgentMessage::from));

        let (reply, rounds) = self.converse(&mut thread.messages).await?;
        thread.messages.push(AgentMessage::assistant(reply.clone()));
        thread.updated_at = Some(now);
        self.repo.save_thread(&thread_id, &thread).await?;

        info!(thread = %thread_id, rounds, "agent turn complete");
        Ok(TurnOutcome {
            messages: thread.visible(),
            thread_id,
            reply,
            rounds,
        })
    }

    /// Drive the model until it answers in prose. Tool requests and their
    /// results are appended to `log`; the final answer is returned, not
    /// appended.
    async fn converse(&self, log: &mut Vec<AgentMessage>) -> Result<(String, usize)> {
        let schemas = self.tools.schemas();
        let prompt = AgentMessage::system(system_prompt());

        for round in 1..=self.max_rounds {
            let request: Vec<AgentMessage> = std::iter::once(prompt.clone()).chain(log.iter().cloned()).collect();
            match self.llm.chat(&request, &schemas).await? {
                ChatResponse::Content(text) => return Ok((text, round)),
                ChatResponse::ToolCalls(calls) => {
                    log.push(AgentMessage::assistant_tool_calls(calls.clone()));
                    for call in &calls {
                        let output = match self.tools.dispatch(call).await {
                            Ok(Value::String(s)) => s,
                            Ok(v) => v.to_string(),
                            Err(e) => {
                                warn!(tool = %call.name, error = %e, "tool call failed");
                                format!("Tool execution error: {e}")
                            }
                        };
                        log.push(AgentMessage::tool_result(&call.id, &call.name, output));
                    }
                }
            }
        }

        // Out of rounds: one last call without tools forces a prose answer.
        warn!(max_rounds = self.max_rounds, "round budget exhausted");
        let request: Vec<AgentMessage> = std::iter::once(prompt).chain(log.iter().cloned()).collect();
        let text = match self.llm.chat(&request, &[]).await? {
            ChatResponse::Content(text) if !text.trim().is_empty() => text,
            _ => FALLBACK_REPLY.to_string(),
        };
        Ok((text, self.max_rounds + 1))
    }
}
