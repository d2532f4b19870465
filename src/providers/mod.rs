//! Pluggable chat providers and the backend that drives the active one

pub mod openrouter;
pub mod spark;

use crate::conversation::ConversationBuffer;
use crate::error::ChatError;
use crate::models::Message;
use crate::store::SettingsStore;
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use openrouter::{OpenRouterConfig, OpenRouterProvider};
pub use spark::{SparkConfig, SparkProvider};

/// Upper bound on a single provider exchange
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(15);

/// Identity of a provider implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Spark,
    OpenRouter,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Spark, ProviderKind::OpenRouter];

    /// Key of the persisted configuration record
    pub fn config_key(self) -> &'static str {
        match self {
            ProviderKind::Spark => "xunfei",
            ProviderKind::OpenRouter => "openrouter",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ProviderKind::Spark => "iFlytek Spark Lite",
            ProviderKind::OpenRouter => "OpenRouter",
        }
    }

    /// Accepts the record key, the display name or the short name, ignoring case
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        Self::ALL.into_iter().find(|kind| {
            name == kind.config_key()
                || name == kind.display_name().to_lowercase()
                || (name == "spark" && *kind == ProviderKind::Spark)
        })
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Capability contract every chat provider satisfies
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// True only when every required setting is present and well formed.
    fn validate(&self) -> bool;

    /// Runs one exchange for `history`, which already ends with the user prompt.
    async fn complete(&self, history: &[Message]) -> Result<String, ChatError>;

    /// The provider's settings as a flat JSON object.
    fn config_record(&self) -> Value;

    async fn list_models(&self) -> Result<Vec<String>, ChatError> {
        Err(ChatError::Protocol(format!(
            "{} does not support model listing",
            self.kind()
        )))
    }

    fn save_config(&self, store: &dyn SettingsStore) -> Result<(), String> {
        store.save(self.kind().config_key(), &self.config_record())
    }
}

/// Builds a provider from its persisted record. Load failures are logged and
/// leave the settings empty so the caller can prompt for them.
pub fn load_provider(kind: ProviderKind, store: &dyn SettingsStore) -> Arc<dyn ChatProvider> {
    match kind {
        ProviderKind::Spark => Arc::new(SparkProvider::load(store)),
        ProviderKind::OpenRouter => Arc::new(OpenRouterProvider::load(store)),
    }
}

/// Builds a provider from an in-memory record, rejecting incomplete settings.
pub fn provider_from_record(kind: ProviderKind, record: Value) -> Result<Arc<dyn ChatProvider>, ChatError> {
    let provider: Arc<dyn ChatProvider> = match kind {
        ProviderKind::Spark => {
            let config: SparkConfig =
                serde_json::from_value(record).map_err(|_| ChatError::ConfigInvalid)?;
            Arc::new(SparkProvider::new(config))
        }
        ProviderKind::OpenRouter => {
            let config: OpenRouterConfig =
                serde_json::from_value(record).map_err(|_| ChatError::ConfigInvalid)?;
            Arc::new(OpenRouterProvider::new(config))
        }
    };
    if provider.validate() {
        Ok(provider)
    } else {
        Err(ChatError::ConfigInvalid)
    }
}

/// The active provider together with the shared conversation buffer.
///
/// Cloning is cheap; clones share the buffer, so a clone can be moved onto a
/// worker task while the host keeps its own handle.
#[derive(Clone)]
pub struct ChatBackend {
    provider: Arc<dyn ChatProvider>,
    buffer: Arc<Mutex<ConversationBuffer>>,
    timeout: Duration,
}

impl ChatBackend {
    pub fn new(provider: Arc<dyn ChatProvider>, buffer: ConversationBuffer) -> Self {
        Self {
            provider,
            buffer: Arc::new(Mutex::new(buffer)),
            timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn validate(&self) -> bool {
        self.provider.validate()
    }

    pub fn provider(&self) -> &Arc<dyn ChatProvider> {
        &self.provider
    }

    /// Snapshot of the conversation so far
    pub fn history(&self) -> Vec<Message> {
        let buffer = self.buffer.lock().unwrap_or_else(|poisoned| {
            warn!("[chat] Conversation buffer lock poisoned, reading it anyway");
            poisoned.into_inner()
        });
        buffer.messages().to_vec()
    }

    /// Sends `prompt` with the conversation so far and returns the reply.
    ///
    /// The prompt and the reply are appended to the buffer only on success.
    pub async fn reply(&self, prompt: &str) -> Result<String, ChatError> {
        if !self.provider.validate() {
            return Err(ChatError::ConfigInvalid);
        }

        let payload = {
            let buffer = self
                .buffer
                .lock()
                .map_err(|_| ChatError::Protocol("conversation buffer poisoned".to_string()))?;
            buffer.with_pending(Message::user(prompt))
        };

        info!(
            "[chat] Sending {} messages to {}",
            payload.len(),
            self.provider.kind()
        );
        let answer = match tokio::time::timeout(self.timeout, self.provider.complete(&payload)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("[chat] {} gave no answer within {:?}", self.provider.kind(), self.timeout);
                return Err(ChatError::Timeout(self.timeout));
            }
        };

        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| ChatError::Protocol("conversation buffer poisoned".to_string()))?;
        buffer.push(Message::user(prompt));
        buffer.push(Message::assistant(answer.clone()));
        Ok(answer)
    }

    /// Applies `fields` onto a copy of the current settings.
    ///
    /// Returns a backend using the new provider (sharing this conversation)
    /// only if the edited settings validate; otherwise nothing changes.
    pub fn reconfigure(&self, fields: &[(String, String)]) -> Result<ChatBackend, ChatError> {
        let mut record = self.provider.config_record();
        let object = record.as_object_mut().ok_or(ChatError::ConfigInvalid)?;
        for (key, value) in fields {
            if !object.contains_key(key) {
                warn!("[chat] Ignoring unknown {} setting '{}'", self.kind(), key);
                continue;
            }
            object.insert(key.clone(), Value::String(value.trim().to_string()));
        }

        let provider = provider_from_record(self.kind(), record)?;
        Ok(ChatBackend {
            provider,
            buffer: Arc::clone(&self.buffer),
            timeout: self.timeout,
        })
    }

    /// Same conversation, different provider
    pub fn switch_provider(&self, provider: Arc<dyn ChatProvider>) -> ChatBackend {
        ChatBackend {
            provider,
            buffer: Arc::clone(&self.buffer),
            timeout: self.timeout,
        }
    }

    pub fn save_config(&self, store: &dyn SettingsStore) -> Result<(), String> {
        self.provider.save_config(store)
    }
}
