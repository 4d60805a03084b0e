use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InsightsError {
    #[error("Missing credentials: upstream token and provider token are both required")]
    MissingCredentials,

    #[error("Session expired, please log in again")]
    AuthExpired,

    #[error("Identity is not synchronized with Insights: {0}")]
    IdentityUnsynced(String),

    #[error("Sync rejected ({status}): {detail}")]
    SyncRejected { status: u16, detail: String },

    #[error("Could not finish connecting your account, please reconnect: {0}")]
    ReconnectRequired(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Fetch failed ({status}): {detail}")]
    Fetch { status: u16, detail: String },

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Refresh error: {0}")]
    Refresh(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl InsightsError {
    /// Errors that call for a forced logout.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired)
    }
}

impl From<InsightsError> for String {
    fn from(err: InsightsError) -> Self {
        err.to_string()
    }
}

impl From<reqwest::Error> for InsightsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network(format!("request timed out: {}", err))
        } else {
            Self::Network(err.to_string())
        }
    }
}
