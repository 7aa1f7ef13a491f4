//! Provider resolution: process secrets first, then the runtime config
//! document, read through a short-lived cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tenderscope_store::Repository;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::llm::{
    AgentMessage, ChatResponse, LlmClient, LlmError, OpenAiCompatClient, Provider, ToolSchema,
};

/// Config document key in the `config` collection.
pub const CONFIG_KEY: &str = "llm";
pub const CONFIG_TTL: Duration = Duration::from_secs(60);

/// The runtime config document. Key names match what operators already
/// write into the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmRuntimeConfig {
    #[serde(default)]
    pub provider: Option<Provider>,
    #[serde(rename = "GOOGLE_GENAI_API_KEY", default)]
    pub google_genai_api_key: Option<String>,
    #[serde(rename = "GEMINI_MODEL", default)]
    pub gemini_model: Option<String>,
    #[serde(rename = "OPENAI_API_KEY", default)]
    pub openai_api_key: Option<String>,
    #[serde(rename = "OPENAI_MODEL", default)]
    pub openai_model: Option<String>,
    #[serde(rename = "OPENROUTER_API_KEY", default)]
    pub openrouter_api_key: Option<String>,
    #[serde(rename = "OPENROUTER_MODEL", default)]
    pub openrouter_model: Option<String>,
}

/// Keys supplied through flags or the environment.
#[derive(Debug, Clone, Default)]
pub struct LlmSecrets {
    pub google_genai_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    /// Overrides the provider's model everywhere.
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLlm {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
}

fn present(key: &Option<String>) -> Option<String> {
    key.as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(String::from)
}

/// Pick a provider. Secrets win in the order Gemini, OpenRouter, OpenAI;
/// otherwise the config document's `provider` must name one whose key it
/// also carries.
pub fn resolve(secrets: &LlmSecrets, config: &LlmRuntimeConfig) -> Result<ResolvedLlm, LlmError> {
    let from_secrets = [
        (Provider::Gemini, &secrets.google_genai_api_key),
        (Provider::OpenRouter, &secrets.openrouter_api_key),
        (Provider::OpenAi, &secrets.openai_api_key),
    ]
    .into_iter()
    .find_map(|(p, k)| present(k).map(|k| (p, k, None)));

    let chosen = from_secrets.or_else(|| {
        let provider = config.provider?;
        let (key, model) = match provider {
            Provider::Gemini => (&config.google_genai_api_key, &config.gemini_model),
            Provider::OpenRouter => (&config.openrouter_api_key, &config.openrouter_model),
            Provider::OpenAi => (&config.openai_api_key, &config.openai_model),
        };
        present(key).map(|k| (provider, k, present(model)))
    });

    let Some((provider, api_key, config_model)) = chosen else {
        return Err(LlmError::Config(
            "no LLM credentials found; set an API key or the runtime llm config".into(),
        ));
    };
    let model = present(&secrets.model)
        .or(config_model)
        .unwrap_or_else(|| provider.default_model().to_string());
    Ok(ResolvedLlm {
        provider,
        api_key,
        model,
    })
}

/// Read-through cache over the runtime config document.
pub struct RuntimeConfigCache {
    repo: Repository,
    ttl: Duration,
    cached: RwLock<Option<(Instant, LlmRuntimeConfig)>>,
}

impl RuntimeConfigCache {
    pub fn new(repo: Repository) -> Self {
        Self::with_ttl(repo, CONFIG_TTL)
    }

    pub fn with_ttl(repo: Repository, ttl: Duration) -> Self {
        Self {
            repo,
            ttl,
            cached: RwLock::new(None),
        }
    }

    /// A missing document reads as the empty config.
    pub async fn get(&self) -> tenderscope_core::Result<LlmRuntimeConfig> {
        if let Some((at, cfg)) = self.cached.read().await.as_ref()
            && at.elapsed() < self.ttl
        {
            return Ok(cfg.clone());
        }

        let cfg: LlmRuntimeConfig = self.repo.get_config(CONFIG_KEY).await?.unwrap_or_default();
        debug!(provider = ?cfg.provider, "runtime llm config refreshed");
        *self.cached.write().await = Some((Instant::now(), cfg.clone()));
        Ok(cfg)
    }
}

/// An [`LlmClient`] that resolves its provider on every call, so a config
/// change takes effect once the cache expires.
pub struct RuntimeLlm {
    http: reqwest::Client,
    secrets: LlmSecrets,
    config: Arc<RuntimeConfigCache>,
    /// Test hook: send every request here instead of the provider URL.
    base_url_override: Option<String>,
}

impl RuntimeLlm {
    pub fn new(secrets: LlmSecrets, config: Arc<RuntimeConfigCache>) -> Self {
        Self {
            http: reqwest::Client::new(),
            secrets,
            config,
            base_url_override: None,
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url_override = Some(base_url.to_string());
        self
    }

    pub async fn resolve(&self) -> Result<ResolvedLlm, LlmError> {
        let config = self
            .config
            .get()
            .await
            .map_err(|e| LlmError::Other(e.to_string()))?;
        resolve(&self.secrets, &config)
    }
}

#[async_trait]
impl LlmClient for RuntimeLlm {
    async fn chat(
        &self,
        messages: &[AgentMessage],
        tools: &[ToolSchema],
    ) -> Result<ChatResponse, LlmError> {
        let resolved = self.resolve().await?;
        let base = self
            .base_url_override
            .as_deref()
            .unwrap_or(resolved.provider.base_url());
        info!(provider = ?resolved.provider, model = %resolved.model, "llm call");
        OpenAiCompatClient::with_http(self.http.clone(), base, resolved.api_key, resolved.model)
            .chat(messages, tools)
            .await
    }
}
