//! Callback-sync state machine.
//!
//! `transition` is pure: it never touches the network, the clock or storage.
//! It returns the next state plus the effects the driver must run, and the
//! driver feeds the effect results back in as events.
//!
//! ```text
//! Unauthenticated --Begin--> Syncing(1) --ok--> Authenticated
//!                      \           |  \--4xx--> Failed(Rejected)
//!                       \          |--5xx/net (attempt < max)--> Wait, Syncing(n+1)
//!                        \         \--5xx/net (attempt = max)--> Failed(RetriesExhausted) + Rollback
//!                         \--no tokens--> Failed(MissingTokens)
//! ```

use std::time::Duration;

use super::types::SessionGrant;
use crate::error::InsightsError;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Same wait before every retry.
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    MissingTokens,
    /// 4xx from the backend; nothing was created server-side.
    Rejected { status: u16, detail: String },
    /// Transient failures used up the retry budget; upstream was rolled back.
    RetriesExhausted { attempts: u32, last_error: String },
    /// Sync succeeded but the session could not be persisted.
    Storage(String),
}

impl FailureReason {
    pub fn to_error(&self) -> InsightsError {
        match self {
            Self::MissingTokens => InsightsError::MissingCredentials,
            Self::Rejected { status, detail } => InsightsError::SyncRejected {
                status: *status,
                detail: detail.clone(),
            },
            Self::RetriesExhausted { last_error, .. } => {
                InsightsError::ReconnectRequired(last_error.clone())
            }
            Self::Storage(detail) => InsightsError::Storage(detail.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Syncing { attempt: u32 },
    Authenticated { tenant_id: String },
    Failed(FailureReason),
}

impl AuthState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated { .. } | Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Begin { tokens_present: bool },
    SyncSucceeded(SessionGrant),
    SyncRejected { status: u16, detail: String },
    SyncTransientFailure { detail: String },
    RetryElapsed,
    StoreFailed { detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    SendSync { attempt: u32 },
    Wait(Duration),
    StoreSession(Session),
    /// Terminate the upstream identity session (zombie-user prevention).
    RollbackUpstream,
}

/// Compute the next state and the effects to run.
///
/// Events that make no sense in the current state leave it unchanged and
/// produce no effects.
pub fn transition(state: &AuthState, event: AuthEvent, policy: &RetryPolicy) -> (AuthState, Vec<Effect>) {
    match (state, event) {
        (AuthState::Syncing { .. }, AuthEvent::Begin { .. }) => (state.clone(), Vec::new()),

        (_, AuthEvent::Begin { tokens_present: false }) => {
            (AuthState::Failed(FailureReason::MissingTokens), Vec::new())
        }
        (_, AuthEvent::Begin { tokens_present: true }) => (
            AuthState::Syncing { attempt: 1 },
            vec![Effect::SendSync { attempt: 1 }],
        ),

        (AuthState::Syncing { .. }, AuthEvent::SyncSucceeded(granted)) => (
            AuthState::Authenticated {
                tenant_id: granted.session.tenant_id.clone(),
            },
            vec![Effect::StoreSession(granted.session)],
        ),

        (AuthState::Syncing { .. }, AuthEvent::SyncRejected { status, detail }) => (
            AuthState::Failed(FailureReason::Rejected { status, detail }),
            Vec::new(),
        ),

        (AuthState::Syncing { attempt }, AuthEvent::SyncTransientFailure { detail }) => {
            if *attempt >= policy.max_attempts {
                (
                    AuthState::Failed(FailureReason::RetriesExhausted {
                        attempts: *attempt,
                        last_error: detail,
                    }),
                    vec![Effect::RollbackUpstream],
                )
            } else {
                (state.clone(), vec![Effect::Wait(policy.interval)])
            }
        }

        (AuthState::Syncing { attempt }, AuthEvent::RetryElapsed) => {
            let next = attempt + 1;
            (
                AuthState::Syncing { attempt: next },
                vec![Effect::SendSync { attempt: next }],
            )
        }

        (AuthState::Authenticated { .. }, AuthEvent::StoreFailed { detail }) => {
            (AuthState::Failed(FailureReason::Storage(detail)), Vec::new())
        }

        (_, _) => (state.clone(), Vec::new()),
    }
}
