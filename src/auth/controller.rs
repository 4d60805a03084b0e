use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use super::machine::{transition, AuthEvent, AuthState, Effect, RetryPolicy};
use super::types::{SessionGrant, SsoFailure, SsoOutcome, SyncGrant};
use super::upstream::IdentityProvider;
use crate::backend::wire::SessionGrantBody;
use crate::backend::{ApiResponse, Backend};
use crate::config::ClientConfig;
use crate::error::InsightsError;
use crate::session::{Session, SessionStore};

/// Drives the callback-sync machine and owns login/logout.
pub struct AuthSyncController {
    backend: Arc<dyn Backend>,
    identity: Arc<dyn IdentityProvider>,
    sessions: Arc<SessionStore>,
    policy: RetryPolicy,
    state: Mutex<AuthState>,
}

impl AuthSyncController {
    pub fn new(
        backend: Arc<dyn Backend>,
        identity: Arc<dyn IdentityProvider>,
        sessions: Arc<SessionStore>,
        policy: RetryPolicy,
    ) -> Self {
        let initial = match sessions.get() {
            Some(session) => AuthState::Authenticated {
                tenant_id: session.tenant_id,
            },
            None => AuthState::Unauthenticated,
        };
        Self {
            backend,
            identity,
            sessions,
            policy,
            state: Mutex::new(initial),
        }
    }

    pub fn from_config(
        backend: Arc<dyn Backend>,
        identity: Arc<dyn IdentityProvider>,
        sessions: Arc<SessionStore>,
        config: &ClientConfig,
    ) -> Self {
        let policy = RetryPolicy {
            max_attempts: config.max_sync_attempts,
            interval: config.retry_interval(),
        };
        Self::new(backend, identity, sessions, policy)
    }

    pub fn state(&self) -> AuthState {
        self.lock().clone()
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Mirror a fresh upstream identity (OAuth callback) into a backend session.
    ///
    /// Transient failures are retried at a fixed interval. When the budget runs
    /// out the upstream session is terminated before the error is returned.
    pub async fn begin_callback_sync(
        &self,
        upstream_token: Option<&str>,
        provider_token: Option<&str>,
    ) -> Result<SyncGrant, InsightsError> {
        let upstream_token = upstream_token.map(str::trim).filter(|t| !t.is_empty());
        let provider_token = provider_token.map(str::trim).filter(|t| !t.is_empty());
        let tokens = upstream_token.zip(provider_token);

        let mut pending = VecDeque::from([AuthEvent::Begin {
            tokens_present: tokens.is_some(),
        }]);
        let mut granted: Option<SyncGrant> = None;

        while let Some(event) = pending.pop_front() {
            let (next, effects) = transition(&self.state(), event, &self.policy);
            self.set_state(next);

            for effect in effects {
                match effect {
                    Effect::SendSync { attempt } => {
                        // SendSync is only emitted after Begin with tokens present.
                        let Some((upstream, provider)) = tokens else {
                            continue;
                        };
                        info!("Sync attempt {}/{}", attempt, self.policy.max_attempts);
                        let event = self.attempt_sync(upstream, provider).await;
                        if let AuthEvent::SyncSucceeded(ref session_grant) = event {
                            granted = Some(session_grant.grant.clone());
                        }
                        pending.push_back(event);
                    }
                    Effect::Wait(interval) => {
                        tokio::time::sleep(interval).await;
                        pending.push_back(AuthEvent::RetryElapsed);
                    }
                    Effect::StoreSession(session) => {
                        if let Err(e) = self.sessions.set(session) {
                            error!("Failed to store session after sync: {}", e);
                            pending.push_back(AuthEvent::StoreFailed {
                                detail: e.to_string(),
                            });
                        }
                    }
                    Effect::RollbackUpstream => {
                        warn!("Sync retries exhausted, terminating upstream session");
                        if let Err(e) = self.identity.sign_out().await {
                            error!("Upstream rollback failed: {}", e);
                        }
                    }
                }
            }
        }

        match self.state() {
            AuthState::Authenticated { tenant_id } => {
                info!("Callback sync complete for tenant {}", tenant_id);
                granted.ok_or_else(|| InsightsError::Storage("sync grant missing".to_string()))
            }
            AuthState::Failed(reason) => {
                let err = reason.to_error();
                warn!("Callback sync failed: {}", err);
                Err(err)
            }
            other => Err(InsightsError::Storage(format!(
                "sync ended in non-terminal state {:?}",
                other
            ))),
        }
    }

    async fn attempt_sync(&self, upstream_token: &str, provider_token: &str) -> AuthEvent {
        let response = match self.backend.sync_callback(upstream_token, provider_token).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Sync request failed: {}", e);
                return AuthEvent::SyncTransientFailure {
                    detail: e.to_string(),
                };
            }
        };

        if response.is_success() {
            return match decode_grant(&response) {
                Ok(session_grant) => AuthEvent::SyncSucceeded(session_grant),
                Err(e) => {
                    warn!("Sync returned an unreadable body: {}", e);
                    AuthEvent::SyncTransientFailure {
                        detail: e.to_string(),
                    }
                }
            };
        }

        let detail = response.detail();
        if response.is_client_error() {
            warn!("Sync rejected with HTTP {}: {}", response.status, detail);
            AuthEvent::SyncRejected {
                status: response.status,
                detail,
            }
        } else {
            warn!("Sync failed with HTTP {}: {}", response.status, detail);
            AuthEvent::SyncTransientFailure {
                detail: format!("HTTP {}: {}", response.status, detail),
            }
        }
    }

    /// Sign in silently by reusing an existing upstream session.
    pub async fn try_sso_login(&self) -> SsoOutcome {
        let Some(upstream) = self.identity.current_session().await else {
            info!("SSO: no upstream session");
            return SsoOutcome::NotAuthenticated(SsoFailure::NoSession);
        };

        let response = match self.backend.sso_login(&upstream.access_token).await {
            Ok(response) => response,
            Err(e) => {
                warn!("SSO request failed: {}", e);
                return SsoOutcome::NotAuthenticated(SsoFailure::BackendError {
                    status: None,
                    detail: e.to_string(),
                });
            }
        };

        if response.status == 403 {
            let detail = response.detail();
            info!("SSO: upstream identity not linked: {}", detail);
            return SsoOutcome::NotAuthenticated(SsoFailure::IdentityNotLinked { detail });
        }

        if !response.is_success() {
            let detail = response.detail();
            warn!("SSO failed with HTTP {}: {}", response.status, detail);
            return SsoOutcome::NotAuthenticated(SsoFailure::BackendError {
                status: Some(response.status),
                detail,
            });
        }

        let SessionGrant { session, grant } = match decode_grant(&response) {
            Ok(session_grant) => session_grant,
            Err(e) => {
                warn!("SSO returned an unreadable body: {}", e);
                return SsoOutcome::NotAuthenticated(SsoFailure::BackendError {
                    status: Some(response.status),
                    detail: e.to_string(),
                });
            }
        };

        if let Err(e) = self.sessions.set(session) {
            error!("Failed to store SSO session: {}", e);
            return SsoOutcome::NotAuthenticated(SsoFailure::BackendError {
                status: None,
                detail: e.to_string(),
            });
        }

        info!("SSO login complete for tenant {}", grant.tenant_id);
        self.set_state(AuthState::Authenticated {
            tenant_id: grant.tenant_id.clone(),
        });
        SsoOutcome::Authenticated(grant)
    }

    /// Clear the local session and terminate the upstream one. Safe to call
    /// repeatedly; only a failure to clear local storage is reported.
    pub async fn logout(&self) -> Result<(), InsightsError> {
        let cleared = self.sessions.clear();
        if let Err(e) = self.identity.sign_out().await {
            warn!("Upstream sign-out during logout failed: {}", e);
        }
        self.set_state(AuthState::Unauthenticated);
        info!("Logged out");
        cleared
    }

    fn set_state(&self, state: AuthState) {
        *self.lock() = state;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AuthState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn decode_grant(response: &ApiResponse) -> Result<SessionGrant, InsightsError> {
    let body: SessionGrantBody = response.parse()?;
    let session = Session::new(body.access_token, body.tenant_id, body.supabase_user_id);
    if !session.is_usable() {
        return Err(InsightsError::Decode(
            "session grant without access token or tenant".to_string(),
        ));
    }
    let grant = SyncGrant {
        tenant_id: session.tenant_id.clone(),
        identity_user_id: session.identity_user_id.clone(),
        accounts_count: body.ad_accounts_count.unwrap_or(0),
    };
    Ok(SessionGrant { session, grant })
}
