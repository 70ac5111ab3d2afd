//! Settings
//!
//! The settings blob the host persists for this extension, and the storage seam
//! used to read and write it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{ContextId, HierarchyTree};
use crate::persist::encode_record;

/// Context id seeded into fresh settings
pub const GLOBAL_CONTEXT: &str = "global";

/// User-facing settings plus every persisted tree, keyed by context id.
///
/// Every field has a default so partial blobs written by older versions load.
/// Tree records stay raw JSON here and are decoded per context, so one bad
/// record never stops the rest of the blob from loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enabled: bool,
    pub auto_collapse: bool,
    /// Pixels of indentation per nesting level
    pub indent_size: u32,
    /// Deepest depth a node may be moved to
    pub max_nesting_level: usize,
    pub animations: bool,
    pub show_collapse_buttons: bool,
    pub theme: String,
    pub prompt_hierarchy: BTreeMap<ContextId, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut prompt_hierarchy = BTreeMap::new();
        prompt_hierarchy.insert(
            GLOBAL_CONTEXT.to_string(),
            encode_record(&HierarchyTree::new()),
        );

        Self {
            enabled: true,
            auto_collapse: true,
            indent_size: 20,
            max_nesting_level: 5,
            animations: true,
            show_collapse_buttons: true,
            theme: "default".to_string(),
            prompt_hierarchy,
        }
    }
}

/// Settings storage errors
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Settings store lock poisoned")]
    LockError,
}

/// Where the settings blob lives
pub trait SettingsStore: Send + Sync {
    /// Reads the settings, falling back to defaults when nothing was stored yet
    fn load(&self) -> Result<Settings, SettingsError>;

    fn save(&self, settings: &Settings) -> Result<(), SettingsError>;
}

/// Stores settings as pretty-printed JSON in a single file
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SettingsStore for JsonFileStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "No settings at {}, starting from defaults",
                    self.path.display()
                );
                return Ok(Settings::default());
            }
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let encoded = serde_json::to_string_pretty(settings)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        // Write next to the target and rename so readers never see a partial file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, encoded).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// Keeps settings in memory; handy for tests and for running without a file
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Option<Settings>>>,
    saves: Arc<Mutex<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(settings))),
            saves: Arc::default(),
        }
    }

    /// Number of completed saves
    pub fn save_count(&self) -> usize {
        self.saves.lock().map(|count| *count).unwrap_or(0)
    }

    /// Last saved settings, if any
    pub fn snapshot(&self) -> Option<Settings> {
        self.inner.lock().ok().and_then(|guard| guard.clone())
    }
}

impl SettingsStore for MemoryStore {
    fn load(&self) -> Result<Settings, SettingsError> {
        let guard = self.inner.lock().map_err(|_| SettingsError::LockError)?;
        Ok(guard.clone().unwrap_or_default())
    }

    fn save(&self, settings: &Settings) -> Result<(), SettingsError> {
        let mut guard = self.inner.lock().map_err(|_| SettingsError::LockError)?;
        *guard = Some(settings.clone());
        let mut saves = self.saves.lock().map_err(|_| SettingsError::LockError)?;
        *saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_partial_blob_fills_defaults() {
        let settings: Settings = serde_json::from_value(json!({
            "indentSize": 12,
            "promptHierarchy": { "alice": { "root": ["a"] } }
        }))
        .unwrap();

        assert_eq!(settings.indent_size, 12);
        assert_eq!(settings.max_nesting_level, 5);
        assert!(settings.enabled);
        assert_eq!(settings.prompt_hierarchy["alice"]["root"], json!(["a"]));
        assert!(!settings.prompt_hierarchy.contains_key(GLOBAL_CONTEXT));
    }

    #[test]
    fn test_defaults_seed_global_context() {
        let settings = Settings::default();
        assert_eq!(settings.prompt_hierarchy[GLOBAL_CONTEXT], json!({ "root": [] }));
        assert_eq!(settings.theme, "default");
    }

    #[test]
    fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("settings.json"));

        assert_eq!(store.load().unwrap(), Settings::default());

        let mut settings = Settings::default();
        settings.auto_collapse = false;
        store.save(&settings).unwrap();

        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn test_one_bad_record_does_not_block_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "autoCollapse": false,
                "promptHierarchy": {
                    "alice": { "root": ["a", "b"], "a": { "children": ["c"] } },
                    "examplePrompt4": { "children": [], "level": 1 }
                }
            }"#,
        )
        .unwrap();

        let settings = JsonFileStore::new(&path).load().unwrap();

        assert!(!settings.auto_collapse);
        assert_eq!(settings.prompt_hierarchy.len(), 2);
        assert_eq!(
            settings.prompt_hierarchy["examplePrompt4"]["level"],
            json!(1)
        );
    }

    #[test]
    fn test_json_file_store_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn test_memory_store_counts_saves() {
        let store = MemoryStore::new();
        store.save(&Settings::default()).unwrap();
        store.save(&Settings::default()).unwrap();
        assert_eq!(store.save_count(), 2);
        assert!(store.snapshot().is_some());
    }
}
