//! Default prompt and greeting texts

use log::{error, warn};
use std::path::Path;

/// Default system prompt placed at the head of every conversation
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a cute desktop pet assistant. Keep your answers short and fun.";

/// Greetings used when no talk file is available
pub const DEFAULT_GREETINGS: [&str; 3] = [
    "Hello!",
    "How is your day going?",
    "I'm a cute desktop pet!",
];

/// Loads greeting lines from a UTF-8 text file, one greeting per line.
///
/// Blank lines are skipped. A missing, unreadable or empty file yields the
/// built-in greetings.
pub fn load_greetings(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let lines: Vec<String> = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect();
            if lines.is_empty() {
                default_greetings()
            } else {
                lines
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("[greetings] {} not found, using default greetings", path.display());
            default_greetings()
        }
        Err(e) => {
            error!("[greetings] Failed to read {}: {}", path.display(), e);
            default_greetings()
        }
    }
}

fn default_greetings() -> Vec<String> {
    DEFAULT_GREETINGS.iter().map(|s| s.to_string()).collect()
}
