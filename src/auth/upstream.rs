//! Upstream (federated) identity provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::error::InsightsError;

/// An upstream session as the identity provider reports it.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamSession {
    pub access_token: String,
    pub user_id: String,
}

impl std::fmt::Debug for UpstreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamSession")
            .field("access_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_session(&self) -> Option<UpstreamSession>;

    /// Terminate the upstream session. The local copy is dropped even when the
    /// remote call fails.
    async fn sign_out(&self) -> Result<(), InsightsError>;
}

/// Supabase-style auth service reached over HTTP.
pub struct SupabaseIdentity {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: Mutex<Option<UpstreamSession>>,
}

impl SupabaseIdentity {
    pub fn new(config: &ClientConfig) -> Result<Self, InsightsError> {
        let client = reqwest::Client::builder()
            .user_agent(crate::backend::http::USER_AGENT)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| InsightsError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.identity_url.trim_end_matches('/').to_string(),
            anon_key: config.identity_anon_key.clone(),
            session: Mutex::new(None),
        })
    }

    /// Record the session handed over by the OAuth callback.
    pub fn set_session(&self, session: UpstreamSession) {
        *self.lock() = Some(session);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<UpstreamSession>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IdentityProvider for SupabaseIdentity {
    async fn current_session(&self) -> Option<UpstreamSession> {
        self.lock().clone()
    }

    async fn sign_out(&self) -> Result<(), InsightsError> {
        let Some(session) = self.lock().take() else {
            info!("Upstream sign-out: no session to terminate");
            return Ok(());
        };

        let url = format!("{}/auth/v1/logout", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&session.access_token)
            .header("apikey", &self.anon_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!("Upstream session terminated for user {}", session.user_id);
            Ok(())
        } else {
            warn!("Upstream sign-out returned HTTP {}", status.as_u16());
            Err(InsightsError::Fetch {
                status: status.as_u16(),
                detail: "upstream sign-out failed".to_string(),
            })
        }
    }
}

/// In-memory identity provider for tests and offline development.
#[derive(Default)]
pub struct MockIdentity {
    session: Mutex<Option<UpstreamSession>>,
    sign_outs: AtomicUsize,
    fail_sign_out: bool,
}

impl MockIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(access_token: &str, user_id: &str) -> Self {
        Self {
            session: Mutex::new(Some(UpstreamSession {
                access_token: access_token.to_string(),
                user_id: user_id.to_string(),
            })),
            ..Self::default()
        }
    }

    /// Sign-out drops the session but reports a failure.
    pub fn failing_sign_out(mut self) -> Self {
        self.fail_sign_out = true;
        self
    }

    pub fn sign_out_count(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    pub fn has_session(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<UpstreamSession>> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn current_session(&self) -> Option<UpstreamSession> {
        self.lock().clone()
    }

    async fn sign_out(&self) -> Result<(), InsightsError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.lock().take();
        if self.fail_sign_out {
            return Err(InsightsError::Network("identity service unreachable".to_string()));
        }
        Ok(())
    }
}
