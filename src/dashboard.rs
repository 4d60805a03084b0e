//! Wires session, auth and period loading into the dashboard's startup and
//! recovery flows.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::auth::{AuthSyncController, IdentityProvider, SsoFailure, SsoOutcome};
use crate::backend::{Backend, HttpBackend};
use crate::comparison::{compare, AccountFilter, ComparisonResult};
use crate::config::ClientConfig;
use crate::error::InsightsError;
use crate::period::{
    AccountScope, Outcome, PeriodDataLoader, PeriodDataset, PollCancel, PollOutcome, WindowCache,
    WindowKey,
};
use crate::session::{SessionMedium, SessionStore};

/// Where the dashboard landed. Every start or retry ends in one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardState {
    LoginRequired,
    /// Upstream identity exists but is not linked to an Insights tenant.
    LinkIdentity,
    /// Backend has no data yet. `manual_retry` means automatic polling gave up.
    DataPending { manual_retry: bool },
    Ready {
        window: WindowKey,
        dataset: Arc<PeriodDataset>,
    },
}

pub struct Dashboard {
    config: ClientConfig,
    sessions: Arc<SessionStore>,
    auth: AuthSyncController,
    loader: Arc<PeriodDataLoader>,
    poll_cancel: Mutex<Option<PollCancel>>,
    background: Mutex<Option<JoinHandle<()>>>,
}

impl Dashboard {
    pub fn new(
        config: ClientConfig,
        backend: Arc<dyn Backend>,
        identity: Arc<dyn IdentityProvider>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        let auth = AuthSyncController::from_config(
            backend.clone(),
            identity,
            sessions.clone(),
            &config,
        );
        let loader = Arc::new(PeriodDataLoader::new(
            backend,
            sessions.clone(),
            Arc::new(WindowCache::new()),
            config.background_stagger(),
        ));
        Self {
            config,
            sessions,
            auth,
            loader,
            poll_cancel: Mutex::new(None),
            background: Mutex::new(None),
        }
    }

    /// Dashboard talking to the real API over HTTP.
    pub fn with_http(
        config: ClientConfig,
        identity: Arc<dyn IdentityProvider>,
        medium: Box<dyn SessionMedium>,
    ) -> Result<Self, InsightsError> {
        let backend = Arc::new(HttpBackend::new(&config)?);
        let sessions = Arc::new(SessionStore::open(medium));
        Ok(Self::new(config, backend, identity, sessions))
    }

    pub fn auth(&self) -> &AuthSyncController {
        &self.auth
    }

    pub fn loader(&self) -> &Arc<PeriodDataLoader> {
        &self.loader
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn default_window(&self) -> WindowKey {
        WindowKey::tenant(self.config.default_window)
    }

    /// Resolve the startup state from whatever the session store holds,
    /// falling back to SSO when it is empty.
    pub async fn start(&self) -> Result<DashboardState, InsightsError> {
        if !self.sessions.is_authenticated() {
            match self.auth.try_sso_login().await {
                SsoOutcome::Authenticated(grant) => {
                    info!("Signed in via SSO, {} ad account(s)", grant.accounts_count);
                }
                SsoOutcome::NotAuthenticated(SsoFailure::IdentityNotLinked { .. }) => {
                    return Ok(DashboardState::LinkIdentity);
                }
                SsoOutcome::NotAuthenticated(reason) => {
                    info!("Login required: {:?}", reason);
                    return Ok(DashboardState::LoginRequired);
                }
            }
        }
        self.load_default().await
    }

    /// OAuth callback: sync the fresh upstream identity, then load data.
    pub async fn complete_callback(
        &self,
        upstream_token: Option<&str>,
        provider_token: Option<&str>,
    ) -> Result<DashboardState, InsightsError> {
        self.auth
            .begin_callback_sync(upstream_token, provider_token)
            .await?;
        self.load_default().await
    }

    /// Manual retry offered after polling gave up.
    pub async fn retry_data(&self) -> Result<DashboardState, InsightsError> {
        self.cancel_polling();
        if !self.sessions.is_authenticated() {
            return Ok(DashboardState::LoginRequired);
        }
        self.load_default().await
    }

    pub fn cancel_polling(&self) {
        if let Some(cancel) = self.lock_poll_cancel().take() {
            cancel.cancel();
        }
    }

    pub async fn logout(&self) -> Result<(), InsightsError> {
        self.cancel_polling();
        self.abort_background();
        self.loader.invalidate_all();
        self.auth.logout().await
    }

    /// Wait for the background windows scheduled by the last successful load.
    pub async fn wait_background(&self) {
        let handle = self
            .background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Background loading task failed: {}", e);
            }
        }
    }

    /// Load the default window, recovering once from "not computed yet" by
    /// triggering a backend refresh and polling for readiness.
    async fn load_default(&self) -> Result<DashboardState, InsightsError> {
        let default = self.default_window();
        let background: Vec<WindowKey> = self
            .config
            .background_windows()
            .into_iter()
            .map(WindowKey::tenant)
            .collect();
        let mut recovered = false;

        loop {
            let result = self.loader.load_initial(&default, background.clone()).await;
            match result {
                Ok((Outcome::Ready(dataset), handle)) => {
                    *self
                        .background
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner()) = handle;
                    info!("Dashboard ready with {} ads", dataset.ads.len());
                    return Ok(DashboardState::Ready {
                        window: default,
                        dataset,
                    });
                }
                Ok((Outcome::NotYetComputed, _)) if !recovered => {
                    recovered = true;
                    if let Some(state) = self.wait_for_backend_data().await? {
                        return Ok(state);
                    }
                }
                Ok((Outcome::NotYetComputed, _)) => {
                    warn!("Backend reported ready but {} is still missing", default);
                    return Ok(DashboardState::DataPending { manual_retry: true });
                }
                Ok((Outcome::Unauthorized, _)) | Err(InsightsError::AuthExpired) => {
                    return self.force_logout().await;
                }
                Ok((Outcome::IdentityUnsynced, _)) => return Ok(DashboardState::LinkIdentity),
                Err(e) => return Err(e),
            }
        }
    }

    /// Trigger a refresh and poll. `None` means data is ready to fetch.
    async fn wait_for_backend_data(&self) -> Result<Option<DashboardState>, InsightsError> {
        match self.loader.trigger_backend_refresh().await {
            Ok(ticket) if ticket.has_no_accounts() => {
                warn!("Backend refresh: tenant has no ad accounts");
                return Ok(Some(DashboardState::DataPending { manual_retry: true }));
            }
            Ok(ticket) => info!(
                "Backend refresh {} (~{} min)",
                ticket.status,
                ticket.estimated_time_minutes.unwrap_or(0)
            ),
            Err(InsightsError::AuthExpired) => return self.force_logout().await.map(Some),
            Err(e) => {
                warn!("Backend refresh failed: {}", e);
                return Ok(Some(DashboardState::DataPending { manual_retry: true }));
            }
        }

        let cancel = PollCancel::new();
        *self.lock_poll_cancel() = Some(cancel.clone());
        let polled = self
            .loader
            .poll_until_ready(
                self.config.poll_interval(),
                self.config.poll_max_attempts,
                &cancel,
            )
            .await;
        self.lock_poll_cancel().take();

        match polled {
            Ok(PollOutcome::Ready { .. }) => Ok(None),
            Ok(PollOutcome::TimedOut { attempts }) => {
                warn!("Gave up waiting for data after {} probe(s)", attempts);
                Ok(Some(DashboardState::DataPending { manual_retry: true }))
            }
            // Logout cancels polling too.
            Ok(PollOutcome::Cancelled { .. }) if !self.sessions.is_authenticated() => {
                Ok(Some(DashboardState::LoginRequired))
            }
            Ok(PollOutcome::Cancelled { attempts }) => {
                info!("Polling cancelled after {} probe(s)", attempts);
                Ok(Some(DashboardState::DataPending { manual_retry: true }))
            }
            Err(InsightsError::AuthExpired) => self.force_logout().await.map(Some),
            Err(e) => Err(e),
        }
    }

    /// Load any window outside the startup flow (account switch, window pick).
    pub async fn load_window(&self, window: &WindowKey) -> Result<DashboardState, InsightsError> {
        match self.loader.request(window).await {
            Ok(Outcome::Ready(dataset)) => Ok(DashboardState::Ready {
                window: window.clone(),
                dataset,
            }),
            Ok(Outcome::NotYetComputed) => Ok(DashboardState::DataPending { manual_retry: true }),
            Ok(Outcome::Unauthorized) | Err(InsightsError::AuthExpired) => self.force_logout().await,
            Ok(Outcome::IdentityUnsynced) => Ok(DashboardState::LinkIdentity),
            Err(e) => Err(e),
        }
    }

    /// Current-vs-previous comparison for `scope`, restricted by `filter`.
    ///
    /// Returns `Ok(None)` while the current window or every previous source
    /// is still missing.
    ///
    /// The dedicated previous feed is only requested when
    /// `previous_period_feed` is set; otherwise the previous period is always
    /// synthesized.
    pub async fn comparison(
        &self,
        scope: AccountScope,
        filter: &AccountFilter,
    ) -> Result<Option<ComparisonResult>, InsightsError> {
        let short_days = self.config.comparison_short_window;
        let long_days = self.config.comparison_long_window;

        let Some(current) = self
            .comparison_input(&WindowKey::trailing(scope.clone(), short_days))
            .await?
        else {
            return Ok(None);
        };
        let dedicated = if self.config.previous_period_feed {
            self.comparison_input(&WindowKey::previous(scope.clone(), short_days))
                .await?
        } else {
            None
        };
        let long = match dedicated {
            Some(_) => None,
            None => {
                self.comparison_input(&WindowKey::trailing(scope, long_days))
                    .await?
            }
        };

        Ok(compare(
            &current,
            dedicated.as_deref(),
            long.as_deref(),
            Some(current.as_ref()),
            filter,
        ))
    }

    async fn comparison_input(
        &self,
        window: &WindowKey,
    ) -> Result<Option<Arc<PeriodDataset>>, InsightsError> {
        match self.loader.request(window).await? {
            Outcome::Ready(dataset) => Ok(Some(dataset)),
            Outcome::NotYetComputed => Ok(None),
            Outcome::Unauthorized => {
                self.force_logout().await?;
                Err(InsightsError::AuthExpired)
            }
            Outcome::IdentityUnsynced => Err(InsightsError::IdentityUnsynced(format!(
                "window {} requires identity linking",
                window
            ))),
        }
    }

    async fn force_logout(&self) -> Result<DashboardState, InsightsError> {
        warn!("Session rejected by backend, logging out");
        if let Err(e) = self.logout().await {
            error!("Forced logout could not clear the session: {}", e);
        }
        Ok(DashboardState::LoginRequired)
    }

    fn abort_background(&self) {
        let handle = self
            .background
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!("Aborted background window loading");
        }
    }

    fn lock_poll_cancel(&self) -> std::sync::MutexGuard<'_, Option<PollCancel>> {
        self.poll_cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
