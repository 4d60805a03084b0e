use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::persist::write_json_atomic;

pub const PREFERENCES_FILE_NAME: &str = "preferences.json";

/// Key-value JSON preference file. Every `set` is written through.
pub struct PreferenceStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl PreferenceStore {
    /// Open `preferences.json` under `data_dir`. A missing file is an empty
    /// store; an unreadable one is logged and replaced on the next write.
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(PREFERENCES_FILE_NAME);
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Map<String, Value>>(&raw) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring malformed preferences at {}: {}", path.display(), e);
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!("Failed to read preferences at {}: {}", path.display(), e);
                Map::new()
            }
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.lock().get(key).cloned()?;
        match serde_json::from_value(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Preference {} has an unexpected shape: {}", key, e);
                None
            }
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), String> {
        let value = serde_json::to_value(value)
            .map_err(|e| format!("Failed to serialize preference {}: {}", key, e))?;
        let snapshot = {
            let mut values = self.lock();
            values.insert(key.to_string(), value);
            values.clone()
        };
        info!("Setting preference: {}", key);
        self.save(&snapshot)
    }

    pub fn remove(&self, key: &str) -> Result<(), String> {
        let snapshot = {
            let mut values = self.lock();
            if values.remove(key).is_none() {
                return Ok(());
            }
            values.clone()
        };
        self.save(&snapshot)
    }

    fn save(&self, snapshot: &Map<String, Value>) -> Result<(), String> {
        write_json_atomic(&self.path, snapshot).map_err(|e| {
            warn!("Failed to save preferences: {}", e);
            format!("Failed to save preferences: {}", e)
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
