//! OpenRouter provider: bearer-token chat completions over HTTPS

use super::{ChatProvider, ProviderKind};
use crate::error::ChatError;
use crate::models::Message;
use crate::store::{load_record, SettingsStore};
use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const OPENROUTER_REFERER: &str = "https://github.com/desk-pet/desk-pet";
const OPENROUTER_TITLE: &str = "Desk Pet";

/// Keys shorter than this are rejected before any request is made
pub const MIN_API_KEY_LEN: usize = 20;

const TEMPERATURE: f64 = 0.7;
const CHAT_TIMEOUT: Duration = Duration::from_secs(15);
const MODELS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct OpenRouterConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: String,
}

pub struct OpenRouterProvider {
    config: OpenRouterConfig,
    base_url: String,
    client: reqwest::Client,
}

impl OpenRouterProvider {
    pub fn new(config: OpenRouterConfig) -> Self {
        Self {
            config,
            base_url: OPENROUTER_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Loads settings from the store; a broken record leaves them empty.
    pub fn load(store: &dyn SettingsStore) -> Self {
        let key = ProviderKind::OpenRouter.config_key();
        let config = load_record::<OpenRouterConfig>(store, key).unwrap_or_else(|e| {
            warn!("[openrouter] {}", e);
            OpenRouterConfig::default()
        });
        Self::new(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }
}

/// Keeps the ids of models that look like chat models
pub fn filter_chat_models(models: &[Value]) -> Vec<String> {
    models
        .iter()
        .filter_map(|m| {
            let id = m["id"].as_str()?;
            let description = m["description"].as_str().unwrap_or("").to_lowercase();
            let lower_id = id.to_lowercase();
            let is_chat = description.contains("chat")
                || lower_id.contains("gpt")
                || lower_id.contains("claude");
            is_chat.then(|| id.to_string())
        })
        .collect()
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenRouter
    }

    fn validate(&self) -> bool {
        !self.config.api_key.is_empty()
            && !self.config.model.is_empty()
            && self.config.api_key.chars().count() >= MIN_API_KEY_LEN
    }

    async fn complete(&self, history: &[Message]) -> Result<String, ChatError> {
        let body = json!({
            "model": self.config.model,
            "messages": history,
            "temperature": TEMPERATURE
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("HTTP-Referer", OPENROUTER_REFERER)
            .header("X-Title", OPENROUTER_TITLE)
            .json(&body)
            .timeout(CHAT_TIMEOUT)
            .send()
            .await
            .map_err(|e| ChatError::Network(format!("API request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChatError::Network(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            error!("[openrouter] API error: {} - {}", status, text);
            return Err(ChatError::Protocol(format!("{} - {}", status, text)));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| ChatError::Protocol(format!("Failed to parse response: {}", e)))?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| ChatError::Protocol(format!("response has no message content: {}", text)))?;

        info!("[openrouter] Reply received: {} chars", content.len());
        Ok(content.to_string())
    }

    async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .timeout(MODELS_TIMEOUT)
            .send()
            .await
            .map_err(|e| ChatError::Network(format!("Failed to fetch models: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ChatError::Network(format!("Failed to read response: {}", e)))?;
        if !status.is_success() {
            return Err(ChatError::Protocol(format!("{} - {}", status, text)));
        }

        let json: Value = serde_json::from_str(&text)
            .map_err(|e| ChatError::Protocol(format!("Failed to parse models response: {}", e)))?;
        let models = json["data"]
            .as_array()
            .ok_or_else(|| ChatError::Protocol("Invalid response format".to_string()))?;

        Ok(filter_chat_models(models))
    }

    fn config_record(&self) -> Value {
        serde_json::to_value(&self.config).unwrap_or_else(|_| json!({}))
    }
}
