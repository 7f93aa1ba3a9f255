//! Persistent key-value storage shared by all plugins.
//!
//! Backed by a JSON object on disk. Loaded once when the engine initialises;
//! every `set` writes the file back.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on '{path}': {message}")]
    Io { path: PathBuf, message: String },

    #[error("Could not serialise shared storage: {0}")]
    Serialize(String),
}

pub struct SharedStorage {
    path: Option<PathBuf>,
    data: RwLock<Map<String, Value>>,
}

impl SharedStorage {
    /// Storage that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(Map::new()),
        }
    }

    /// Load from `path`. A missing or unreadable file starts empty.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!("Ignoring malformed shared storage {}: {}", path.display(), e);
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                tracing::warn!("Could not read shared storage {}: {}", path.display(), e);
                Map::new()
            }
        };
        tracing::debug!("Loaded {} shared storage keys", data.len());
        Self {
            path: Some(path.to_path_buf()),
            data: RwLock::new(data),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Store `value` (removing the key for null) and flush.
    pub fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        {
            let mut data = self.data.write();
            if value.is_null() {
                data.remove(key);
            } else {
                data.insert(key.to_string(), value);
            }
        }
        self.save()
    }

    /// Write the current contents to disk.
    pub fn save(&self) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let text = serde_json::to_string_pretty(&*self.data.read())
            .map_err(|e| StorageError::Serialize(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Io {
                path: parent.to_path_buf(),
                message: e.to_string(),
            })?;
        }
        std::fs::write(path, text).map_err(|e| StorageError::Io {
            path: path.clone(),
            message: e.to_string(),
        })
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.data.read().clone()
    }
}
