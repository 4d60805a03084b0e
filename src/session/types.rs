use std::fmt;

use serde::{Deserialize, Serialize};

/// Backend session for one signed-in tenant user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub tenant_id: String,
    /// Upstream identity id. Empty when the session was bootstrapped from a
    /// redirect that did not carry it.
    #[serde(default)]
    pub identity_user_id: String,
}

impl Session {
    pub fn new(
        access_token: impl Into<String>,
        tenant_id: impl Into<String>,
        identity_user_id: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            tenant_id: tenant_id.into(),
            identity_user_id: identity_user_id.into(),
        }
    }

    pub fn is_usable(&self) -> bool {
        !self.access_token.trim().is_empty() && !self.tenant_id.trim().is_empty()
    }
}

// Tokens never reach logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("identity_user_id", &self.identity_user_id)
            .finish()
    }
}
