//! Durable media a `SessionStore` can persist into.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use keyring::Entry;
use tracing::{info, warn};

use super::types::Session;
use crate::persist::write_json_atomic;

pub const KEYRING_SERVICE: &str = "insights-client-session";
pub const KEYRING_USER: &str = "insights";
pub const SESSION_FILE_NAME: &str = "session.json";

/// Physical storage behind a `SessionStore`.
pub trait SessionMedium: Send + Sync {
    fn load(&self) -> Result<Option<Session>, String>;
    fn save(&self, session: &Session) -> Result<(), String>;
    fn clear(&self) -> Result<(), String>;
    fn name(&self) -> &'static str;
}

/// Session stored as a JSON blob in the OS keychain.
pub struct KeyringMedium {
    service: String,
    user: String,
}

impl KeyringMedium {
    pub fn new() -> Self {
        Self::with_names(KEYRING_SERVICE, KEYRING_USER)
    }

    pub fn with_names(service: &str, user: &str) -> Self {
        Self {
            service: service.to_string(),
            user: user.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry, String> {
        Entry::new(&self.service, &self.user).map_err(|e| {
            warn!("Failed to create keyring entry for {}: {}", self.service, e);
            e.to_string()
        })
    }
}

impl Default for KeyringMedium {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMedium for KeyringMedium {
    fn load(&self) -> Result<Option<Session>, String> {
        match self.entry()?.get_password() {
            Ok(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| format!("Failed to parse stored session: {}", e)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                warn!("Failed to read session from keyring: {}", e);
                Err(e.to_string())
            }
        }
    }

    fn save(&self, session: &Session) -> Result<(), String> {
        let json = serde_json::to_string(session)
            .map_err(|e| format!("Failed to serialize session: {}", e))?;
        self.entry()?.set_password(&json).map_err(|e| {
            warn!("Failed to store session in keyring: {}", e);
            e.to_string()
        })
    }

    fn clear(&self) -> Result<(), String> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                warn!("Failed to delete session from keyring: {}", e);
                Err(e.to_string())
            }
        }
    }

    fn name(&self) -> &'static str {
        "keyring"
    }
}

/// Session stored as `session.json` in the data directory.
pub struct FileMedium {
    path: PathBuf,
}

impl FileMedium {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionMedium for FileMedium {
    fn load(&self) -> Result<Option<Session>, String> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| format!("Failed to read {:?}: {}", self.path, e))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| format!("Failed to parse {:?}: {}", self.path, e))
    }

    fn save(&self, session: &Session) -> Result<(), String> {
        write_json_atomic(&self.path, session)
            .map_err(|e| format!("Failed to write {:?}: {}", self.path, e))
    }

    fn clear(&self) -> Result<(), String> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed session file {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("Failed to remove {:?}: {}", self.path, e)),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

/// In-process medium; nothing survives the process.
#[derive(Default)]
pub struct MemoryMedium {
    slot: Mutex<Option<Session>>,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }
}

impl SessionMedium for MemoryMedium {
    fn load(&self) -> Result<Option<Session>, String> {
        Ok(self.slot.lock().map_err(|e| e.to_string())?.clone())
    }

    fn save(&self, session: &Session) -> Result<(), String> {
        *self.slot.lock().map_err(|e| e.to_string())? = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), String> {
        *self.slot.lock().map_err(|e| e.to_string())? = None;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
