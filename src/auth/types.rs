use serde::Serialize;

use crate::session::Session;

/// What a successful callback sync or SSO login hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncGrant {
    pub tenant_id: String,
    pub identity_user_id: String,
    pub accounts_count: u32,
}

/// Session plus grant, as decoded from a 2xx sync/SSO body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub session: Session,
    pub grant: SyncGrant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SsoFailure {
    /// No upstream session; the backend was not contacted.
    NoSession,
    /// Upstream identity exists but has no linked Insights identity (403).
    /// The upstream session is kept so linking can still be completed.
    IdentityNotLinked { detail: String },
    BackendError { status: Option<u16>, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SsoOutcome {
    Authenticated(SyncGrant),
    NotAuthenticated(SsoFailure),
}

impl SsoOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}
