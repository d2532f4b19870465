//! Error types for chat providers and animation resources

use std::path::PathBuf;
use std::time::Duration;

/// Failures surfaced by a chat provider call.
///
/// None of these are fatal: the host turns each one into a user-visible
/// message and leaves the conversation untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// Required provider settings are missing or malformed.
    #[error("API configuration is incomplete, please enter your provider settings")]
    ConfigInvalid,

    /// Connecting to or talking with the provider failed at the transport level.
    #[error("network error: {0}")]
    Network(String),

    /// The provider answered with an error code or an unreadable payload.
    #[error("API error: {0}")]
    Protocol(String),

    /// No terminal response arrived within the allowed wait.
    #[error("request timed out after {}s, please retry", .0.as_secs())]
    Timeout(Duration),
}

/// An animation resource that could not be found on disk
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("animation resource '{name}' missing at {}", path.display())]
pub struct ResourceMissing {
    pub name: String,
    pub path: PathBuf,
}
