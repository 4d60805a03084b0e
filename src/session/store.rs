use std::sync::Mutex;

use tracing::{info, warn};
use url::Url;

use super::medium::SessionMedium;
use super::types::Session;
use crate::error::InsightsError;

/// Query parameters the backend's OAuth redirect carries.
pub const BOOTSTRAP_TOKEN_PARAM: &str = "token";
pub const BOOTSTRAP_TENANT_PARAM: &str = "tenant_id";
pub const BOOTSTRAP_USER_PARAM: &str = "user_id";

/// Single owner of the backend session.
///
/// Two tiers sit behind it: a durable medium, and one-time values carried on
/// a redirect URL. `bootstrap_from_url` migrates the latter into the former,
/// so callers only ever see `get`/`set`/`clear`.
pub struct SessionStore {
    medium: Box<dyn SessionMedium>,
    current: Mutex<Option<Session>>,
}

impl SessionStore {
    /// Open the store, reading whatever the medium already holds.
    /// An unreadable medium starts the store signed out.
    pub fn open(medium: Box<dyn SessionMedium>) -> Self {
        let current = match medium.load() {
            Ok(Some(session)) if session.is_usable() => {
                info!(
                    "Restored session for tenant {} from {}",
                    session.tenant_id,
                    medium.name()
                );
                Some(session)
            }
            Ok(Some(_)) => {
                warn!("Ignoring unusable session in {}", medium.name());
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to load session from {}: {}", medium.name(), e);
                None
            }
        };

        Self {
            medium,
            current: Mutex::new(current),
        }
    }

    pub fn get(&self) -> Option<Session> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.get().is_some()
    }

    /// Replace any existing session.
    pub fn set(&self, session: Session) -> Result<(), InsightsError> {
        if !session.is_usable() {
            return Err(InsightsError::Storage(
                "refusing to store a session without token or tenant".to_string(),
            ));
        }
        self.medium
            .save(&session)
            .map_err(InsightsError::Storage)?;
        info!(
            "Stored session for tenant {} in {}",
            session.tenant_id,
            self.medium.name()
        );
        *self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(session);
        Ok(())
    }

    /// Drop the session. The in-memory copy is always cleared, even when the
    /// medium fails.
    pub fn clear(&self) -> Result<(), InsightsError> {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if previous.is_some() {
            info!("Clearing session");
        }
        self.medium.clear().map_err(InsightsError::Storage)
    }

    /// Consume session values carried on a redirect URL.
    ///
    /// Returns the URL with the bootstrap parameters removed (other parameters
    /// are kept). When the URL carries no complete session, it is returned
    /// unchanged and the store is untouched.
    pub fn bootstrap_from_url(&self, raw_url: &str) -> Result<String, InsightsError> {
        let mut url = Url::parse(raw_url)
            .map_err(|e| InsightsError::Config(format!("invalid bootstrap URL: {}", e)))?;

        let mut token = None;
        let mut tenant = None;
        let mut user = None;
        let mut kept: Vec<(String, String)> = Vec::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                BOOTSTRAP_TOKEN_PARAM => token = Some(value.into_owned()),
                BOOTSTRAP_TENANT_PARAM => tenant = Some(value.into_owned()),
                BOOTSTRAP_USER_PARAM => user = Some(value.into_owned()),
                _ => kept.push((key.into_owned(), value.into_owned())),
            }
        }

        let (Some(token), Some(tenant)) = (token, tenant) else {
            return Ok(raw_url.to_string());
        };

        self.set(Session::new(token, tenant, user.unwrap_or_default()))?;

        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
        Ok(url.to_string())
    }
}
