//! Fixtures for handler tests: an in-memory app with a canned notice
//! source and a scripted model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body as HttpBody, to_bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use serde_json::{Value, json};
use tenderscope_ai::{AgentMessage, ChatResponse, LlmClient, LlmError, ToolSchema};
use tenderscope_core::RawNotice;
use tenderscope_store::Repository;
use tenderscope_sync::{Mailer, NoticeSearch};
use tower::ServiceExt;

use crate::{AppState, router};

pub fn raw_notice(id: &str, title: &str) -> RawNotice {
    RawNotice::new(json!({
        "publication-number": id,
        "notice-title": {"ita": title},
        "buyer-name": {"ita": ["Comune di Bari"]},
        "publication-date": "2025-06-10+02:00",
        "classification-cpv": ["90911200"],
        "total-value": 50000
    }))
}

#[derive(Default)]
pub struct FixedSearch {
    pub notices: Vec<RawNotice>,
    pub queries: Mutex<Vec<(String, u32)>>,
}

#[async_trait]
impl NoticeSearch for FixedSearch {
    async fn search(&self, query: &str, limit: u32) -> tenderscope_core::Result<Vec<RawNotice>> {
        self.queries.lock().unwrap().push((query.to_string(), limit));
        Ok(self.notices.iter().take(limit as usize).cloned().collect())
    }
}

#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<ChatResponse>>,
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn chat(
        &self,
        _messages: &[AgentMessage],
        _tools: &[ToolSchema],
    ) -> Result<ChatResponse, LlmError> {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::Config("no LLM credentials found".into()))
    }
}

pub struct TestApp {
    pub repo: Repository,
    pub search: Arc<FixedSearch>,
    llm: Arc<ScriptedLlm>,
}

impl TestApp {
    pub fn new() -> Self {
        Self {
            repo: Repository::in_memory(),
            search: Arc::default(),
            llm: Arc::default(),
        }
    }

    pub fn with_notices(mut self, notices: Vec<RawNotice>) -> Self {
        self.search = Arc::new(FixedSearch {
            notices,
            queries: Mutex::default(),
        });
        self
    }

    pub fn with_llm(mut self, replies: Vec<ChatResponse>) -> Self {
        self.llm = Arc::new(ScriptedLlm {
            replies: Mutex::new(replies.into()),
        });
        self
    }

    pub fn queries(&self) -> Vec<(String, u32)> {
        self.search.queries.lock().unwrap().clone()
    }

    fn state(&self) -> AppState {
        AppState {
            repo: self.repo.clone(),
            search: self.search.clone(),
            llm: self.llm.clone(),
            mailer: Arc::new(Mailer::new(None, None)),
            public_url: Some("https://app.example.it".into()),
        }
    }

    /// Send one request; the body is JSON when present.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, HeaderMap, String) {
        let mut req = Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(HttpBody::from(b.to_string())),
            None => req.body(HttpBody::empty()),
        }
        .unwrap();

        let resp = router(self.state()).oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, text) = self.send(method, uri, headers, body).await;
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap()
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.json(Method::GET, uri, &[], None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.json(Method::POST, uri, &[], Some(body)).await
    }
}
