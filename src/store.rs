//! Settings persistence: named JSON records behind a small store abstraction

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

/// Key/record storage for provider and pet settings.
///
/// Every record is a flat JSON value addressed by a short key
/// (`"xunfei"`, `"openrouter"`, `"pet_config"`).
pub trait SettingsStore: Send + Sync {
    /// Returns `Ok(None)` when no record has been saved under `key` yet.
    fn load(&self, key: &str) -> Result<Option<Value>, String>;

    fn save(&self, key: &str, record: &Value) -> Result<(), String>;
}

/// Stores each record as `<dir>/<key>.json`
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SettingsStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<Value>, String> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {} config: {}", key, e))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| format!("Failed to parse {} config: {}", key, e))
    }

    fn save(&self, key: &str, record: &Value) -> Result<(), String> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| format!("Failed to create directory: {}", e))?;
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| format!("Failed to serialize {} config: {}", key, e))?;
        std::fs::write(self.record_path(key), content)
            .map_err(|e| format!("Failed to save {} config: {}", key, e))
    }
}

/// Process-local store, used by tests and as a fallback when no config
/// directory can be resolved
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<Value>, String> {
        let records = self
            .records
            .lock()
            .map_err(|_| "Settings store lock poisoned".to_string())?;
        Ok(records.get(key).cloned())
    }

    fn save(&self, key: &str, record: &Value) -> Result<(), String> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| "Settings store lock poisoned".to_string())?;
        records.insert(key.to_string(), record.clone());
        Ok(())
    }
}

/// Loads a typed record, falling back to `T::default()` when none is stored
pub fn load_record<T>(store: &dyn SettingsStore, key: &str) -> Result<T, String>
where
    T: DeserializeOwned + Default,
{
    match store.load(key)? {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| format!("Failed to parse {} config: {}", key, e)),
        None => Ok(T::default()),
    }
}

pub fn save_record<T: Serialize>(store: &dyn SettingsStore, key: &str, record: &T) -> Result<(), String> {
    let value = serde_json::to_value(record)
        .map_err(|e| format!("Failed to serialize {} config: {}", key, e))?;
    store.save(key, &value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn file_store_round_trips_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("config"));
        let sample = Sample { name: "pika".into(), count: 3 };

        save_record(&store, "sample", &sample).unwrap();
        assert!(dir.path().join("config").join("sample.json").exists());
        assert_eq!(load_record::<Sample>(&store, "sample").unwrap(), sample);
    }

    #[test]
    fn missing_record_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(load_record::<Sample>(&store, "absent").unwrap(), Sample::default());
    }

    #[test]
    fn corrupt_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        let store = FileStore::new(dir.path());

        let err = store.load("broken").unwrap_err();
        assert!(err.starts_with("Failed to parse broken config"), "{err}");
    }

    #[test]
    fn partial_records_fill_missing_fields() {
        let store = MemoryStore::new();
        store.save("sample", &serde_json::json!({ "name": "only" })).unwrap();
        let loaded: Sample = load_record(&store, "sample").unwrap();
        assert_eq!(loaded, Sample { name: "only".into(), count: 0 });
    }
}
