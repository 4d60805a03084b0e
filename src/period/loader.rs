use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, OnceCell};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

use super::cache::WindowCache;
use super::normalize::normalize_period_body;
use super::refresh::{AccountRefreshJob, PollCancel, PollOutcome, RefreshJobStatus, RefreshTicket};
use super::types::{Outcome, PeriodDataset, WindowKey, WindowReady};
use crate::aggregation::aggregate;
use crate::backend::wire::{AccountRefreshBody, AccountSummary, AccountsBody, RefreshBody, RefreshStatusBody};
use crate::backend::{ApiResponse, Backend};
use crate::error::InsightsError;
use crate::session::SessionStore;

type FetchResult = Result<Outcome, InsightsError>;

/// In-flight fetches are shared per tenant, never across tenants.
type FlightKey = (String, WindowKey);

const READY_CHANNEL_CAPACITY: usize = 32;

/// Fetches, classifies and caches window datasets.
pub struct PeriodDataLoader {
    backend: Arc<dyn Backend>,
    sessions: Arc<SessionStore>,
    cache: Arc<WindowCache>,
    in_flight: Mutex<HashMap<FlightKey, Arc<OnceCell<FetchResult>>>>,
    /// Tenant whose datasets the cache currently holds.
    tenant: Mutex<Option<String>>,
    /// Bumped by `invalidate_all`. A fetch started under an older generation
    /// never writes into the cache.
    generation: AtomicU64,
    ready_tx: broadcast::Sender<WindowReady>,
    background_stagger: Duration,
}

impl PeriodDataLoader {
    pub fn new(
        backend: Arc<dyn Backend>,
        sessions: Arc<SessionStore>,
        cache: Arc<WindowCache>,
        background_stagger: Duration,
    ) -> Self {
        let (ready_tx, _) = broadcast::channel(READY_CHANNEL_CAPACITY);
        Self {
            backend,
            sessions,
            cache,
            in_flight: Mutex::new(HashMap::new()),
            tenant: Mutex::new(None),
            generation: AtomicU64::new(0),
            ready_tx,
            background_stagger,
        }
    }

    pub fn cache(&self) -> &Arc<WindowCache> {
        &self.cache
    }

    /// Notified each time a window lands in the cache.
    pub fn subscribe(&self) -> broadcast::Receiver<WindowReady> {
        self.ready_tx.subscribe()
    }

    pub fn invalidate(&self, window: &WindowKey) {
        if self.cache.invalidate(window) {
            info!("Invalidated window {}", window);
        }
    }

    /// Drop every cached window and detach in-flight fetches from the cache.
    pub fn invalidate_all(&self) {
        let mut in_flight = self.lock_in_flight();
        self.generation.fetch_add(1, Ordering::SeqCst);
        in_flight.clear();
        self.cache.invalidate_all();
        info!("Invalidated all windows");
    }

    /// Flush the cache when the session now belongs to another tenant.
    fn bind_tenant(&self, tenant_id: &str) {
        let mut bound = self
            .tenant
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if bound.as_deref() == Some(tenant_id) {
            return;
        }
        if let Some(previous) = bound.replace(tenant_id.to_string()) {
            info!("Tenant changed from {} to {}, dropping cached windows", previous, tenant_id);
            self.invalidate_all();
        }
    }

    /// Load one window. Concurrent callers for the same uncached window share
    /// a single backend request.
    pub async fn request(&self, window: &WindowKey) -> FetchResult {
        let Some(session) = self.sessions.get() else {
            return Ok(Outcome::Unauthorized);
        };
        self.bind_tenant(&session.tenant_id);
        if let Some(dataset) = self.cache.get(window) {
            return Ok(Outcome::Ready(dataset));
        }

        let key: FlightKey = (session.tenant_id.clone(), window.clone());
        let (cell, generation) = {
            let mut in_flight = self.lock_in_flight();
            let cell = in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone();
            (cell, self.generation.load(Ordering::SeqCst))
        };

        let result = cell
            .get_or_init(|| self.fetch(window, &session.access_token, generation))
            .await
            .clone();

        let mut in_flight = self.lock_in_flight();
        if in_flight
            .get(&key)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            in_flight.remove(&key);
        }
        result
    }

    async fn fetch(&self, window: &WindowKey, access_token: &str, generation: u64) -> FetchResult {
        let response = self.backend.fetch_period(access_token, window).await?;

        match response.status {
            401 => {
                warn!("Window {}: session rejected (401)", window);
                Ok(Outcome::Unauthorized)
            }
            412 => {
                warn!("Window {}: identity not synchronized (412)", window);
                Ok(Outcome::IdentityUnsynced)
            }
            404 => {
                info!("Window {}: not computed yet", window);
                Ok(Outcome::NotYetComputed)
            }
            429 => Err(InsightsError::QuotaExceeded(response.detail())),
            _ if response.is_success() => {
                let normalized = normalize_period_body(&response.body)?;
                let dataset = Arc::new(PeriodDataset {
                    window: window.clone(),
                    ads: aggregate(&normalized.rows),
                    metadata: normalized.metadata,
                });
                info!(
                    "Window {}: {} rows -> {} ads",
                    window,
                    dataset.metadata.row_count,
                    dataset.ads.len()
                );
                if !self.store_if_current(&dataset, generation) {
                    info!("Window {}: session changed during fetch, not caching", window);
                    return Ok(Outcome::Ready(dataset));
                }
                // No subscribers is fine.
                let _ = self.ready_tx.send(WindowReady {
                    window: window.clone(),
                    ads: dataset.ads.len(),
                });
                Ok(Outcome::Ready(dataset))
            }
            status => {
                let detail = response.detail();
                warn!("Window {}: HTTP {}: {}", window, status, detail);
                Err(InsightsError::Fetch { status, detail })
            }
        }
    }

    /// Await the default window, then warm the background windows.
    ///
    /// Background loading only starts once the default window is `Ready`; the
    /// returned handle resolves when every background window has settled.
    pub async fn load_initial(
        self: &Arc<Self>,
        default: &WindowKey,
        background: Vec<WindowKey>,
    ) -> Result<(Outcome, Option<JoinHandle<()>>), InsightsError> {
        let outcome = self.request(default).await?;
        let handle = match outcome {
            Outcome::Ready(_) => {
                let pending: Vec<WindowKey> =
                    background.into_iter().filter(|w| w != default).collect();
                Some(self.schedule_background(pending))
            }
            _ => None,
        };
        Ok((outcome, handle))
    }

    /// Spawn each window independently after the stagger delay.
    pub fn schedule_background(self: &Arc<Self>, windows: Vec<WindowKey>) -> JoinHandle<()> {
        let loader = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(loader.background_stagger).await;

            let mut tasks = JoinSet::new();
            for window in windows {
                let loader = Arc::clone(&loader);
                tasks.spawn(async move {
                    match loader.request(&window).await {
                        Ok(Outcome::Ready(_)) => {}
                        Ok(other) => info!("Background window {}: {:?}", window, other),
                        Err(e) => warn!("Background window {} failed: {}", window, e),
                    }
                });
            }
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!("Background window task aborted: {}", e);
                }
            }
        })
    }

    /// Ask the backend to regenerate every tenant dataset.
    pub async fn trigger_backend_refresh(&self) -> Result<RefreshTicket, InsightsError> {
        let token = self.access_token()?;
        let response = check_status(self.backend.trigger_refresh(&token).await?)
            .map_err(as_refresh_error)?;
        let body: RefreshBody = response.parse()?;

        if body.success == Some(false) {
            let reason = body
                .error
                .or(body.message)
                .unwrap_or_else(|| "refresh rejected".to_string());
            warn!("Backend refresh rejected: {}", reason);
            return Err(InsightsError::Refresh(reason));
        }

        let ticket = RefreshTicket::from(body);
        info!(
            "Backend refresh: status {}, {} jobs launched",
            ticket.status,
            ticket.jobs_launched.unwrap_or(0)
        );
        Ok(ticket)
    }

    pub async fn refresh_account(&self, account_id: &str) -> Result<AccountRefreshJob, InsightsError> {
        let token = self.access_token()?;
        let response = check_status(self.backend.refresh_account(&token, account_id).await?)
            .map_err(as_refresh_error)?;
        let job = AccountRefreshJob::from(response.parse::<AccountRefreshBody>()?);
        info!(
            "Account {} refresh job {} ({})",
            account_id, job.job_id, job.status
        );
        Ok(job)
    }

    pub async fn refresh_status(&self, job_id: &str) -> Result<RefreshJobStatus, InsightsError> {
        let token = self.access_token()?;
        let response = check_status(self.backend.refresh_status(&token, job_id).await?)?;
        Ok(RefreshJobStatus::from(response.parse::<RefreshStatusBody>()?))
    }

    pub async fn list_accounts(&self) -> Result<Vec<AccountSummary>, InsightsError> {
        let token = self.access_token()?;
        let response = check_status(self.backend.list_accounts(&token).await?)?;
        Ok(response.parse::<AccountsBody>()?.accounts)
    }

    /// Probe readiness until it succeeds, `max_attempts` probes have run, or
    /// `cancel` fires. Cancelling interrupts the sleep immediately.
    pub async fn poll_until_ready(
        &self,
        interval: Duration,
        max_attempts: u32,
        cancel: &PollCancel,
    ) -> Result<PollOutcome, InsightsError> {
        let token = self.access_token()?;
        let mut cancelled = cancel.subscribe();

        for attempt in 1..=max_attempts {
            if *cancelled.borrow() {
                return Ok(PollOutcome::Cancelled {
                    attempts: attempt - 1,
                });
            }

            match self.backend.probe_ready(&token).await {
                Ok(response) if response.is_success() => {
                    info!("Data ready after {} probe(s)", attempt);
                    return Ok(PollOutcome::Ready { attempts: attempt });
                }
                Ok(response) if response.status == 401 => return Err(InsightsError::AuthExpired),
                Ok(response) => {
                    info!(
                        "Readiness probe {}/{}: HTTP {}",
                        attempt, max_attempts, response.status
                    );
                }
                Err(e) => warn!("Readiness probe {}/{} failed: {}", attempt, max_attempts, e),
            }

            if attempt == max_attempts {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                Ok(_) = cancelled.wait_for(|flag| *flag) => {
                    info!("Readiness polling cancelled after {} probe(s)", attempt);
                    return Ok(PollOutcome::Cancelled { attempts: attempt });
                }
            }
        }

        warn!("Data still not ready after {} probe(s)", max_attempts);
        Ok(PollOutcome::TimedOut {
            attempts: max_attempts,
        })
    }

    /// Cache `dataset` unless `invalidate_all` ran since its fetch started.
    /// Holds the in-flight lock so the check and the write cannot straddle
    /// an invalidation.
    fn store_if_current(&self, dataset: &Arc<PeriodDataset>, generation: u64) -> bool {
        let _in_flight = self.lock_in_flight();
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        self.cache.set(dataset.clone());
        true
    }

    fn access_token(&self) -> Result<String, InsightsError> {
        self.sessions
            .get()
            .map(|session| session.access_token)
            .ok_or(InsightsError::AuthExpired)
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<FlightKey, Arc<OnceCell<FetchResult>>>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Shared auth/quota classification for the non-period endpoints.
fn check_status(response: ApiResponse) -> Result<ApiResponse, InsightsError> {
    match response.status {
        _ if response.is_success() => Ok(response),
        401 => Err(InsightsError::AuthExpired),
        412 => Err(InsightsError::IdentityUnsynced(response.detail())),
        429 => Err(InsightsError::QuotaExceeded(response.detail())),
        status => Err(InsightsError::Fetch {
            status,
            detail: response.detail(),
        }),
    }
}

fn as_refresh_error(err: InsightsError) -> InsightsError {
    match err {
        InsightsError::Fetch { status, detail } => {
            InsightsError::Refresh(format!("HTTP {}: {}", status, detail))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::backend::mock::Endpoint;
    use crate::backend::MockBackend;
    use crate::period::types::AccountScope;
    use crate::session::{MemoryMedium, Session};

    fn signed_in() -> Arc<SessionStore> {
        Arc::new(SessionStore::open(Box::new(MemoryMedium::with_session(
            Session::new("jwt", "tenant-1", "user-1"),
        ))))
    }

    fn loader_with(backend: Arc<MockBackend>, sessions: Arc<SessionStore>) -> Arc<PeriodDataLoader> {
        Arc::new(PeriodDataLoader::new(
            backend,
            sessions,
            Arc::new(WindowCache::new()),
            Duration::from_millis(500),
        ))
    }

    fn period_body(ad_id: &str, spend: f64) -> serde_json::Value {
        json!({
            "meta_v1": {"ads": {ad_id: {"name": "Ad", "account_id": "act_1"}}},
            "agg_v1": {"rows": [
                {"ad_id": ad_id, "date": "2024-03-01", "spend": spend, "purchases": 1},
                {"ad_id": ad_id, "date": "2024-03-02", "spend": spend, "purchases": 1}
            ]}
        })
    }

    #[tokio::test]
    async fn test_no_session_is_unauthorized_without_network() {
        let backend = Arc::new(MockBackend::new());
        let sessions = Arc::new(SessionStore::open(Box::new(MemoryMedium::new())));
        let loader = loader_with(backend.clone(), sessions);

        let outcome = loader.request(&WindowKey::tenant(7)).await.unwrap();
        assert_eq!(outcome, Outcome::Unauthorized);
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_ready_is_aggregated_and_cached() {
        let backend = Arc::new(MockBackend::new());
        let window = WindowKey::tenant(7);
        backend.push_response(Endpoint::Period(window.clone()), 200, period_body("a1", 5.0));
        let loader = loader_with(backend.clone(), signed_in());

        let first = loader.request(&window).await.unwrap();
        let dataset = first.dataset().unwrap();
        assert_eq!(dataset.ads.len(), 1);
        assert_eq!(dataset.ads[0].spend, 10.0);
        assert_eq!(dataset.metadata.row_count, 2);

        let second = loader.request(&window).await.unwrap();
        assert!(Arc::ptr_eq(second.dataset().unwrap(), dataset));
        assert_eq!(backend.call_count(&Endpoint::Period(window)), 1);
        assert_eq!(backend.calls()[0].bearer, "jwt");
    }

    #[tokio::test]
    async fn test_status_classification() {
        let backend = Arc::new(MockBackend::new());
        let loader = loader_with(backend.clone(), signed_in());
        let cases = [
            (3, 401, Outcome::Unauthorized),
            (7, 412, Outcome::IdentityUnsynced),
            (14, 404, Outcome::NotYetComputed),
        ];
        for (days, status, expected) in cases {
            let window = WindowKey::tenant(days);
            backend.push_response(Endpoint::Period(window.clone()), status, json!({"detail": "x"}));
            assert_eq!(loader.request(&window).await.unwrap(), expected);
            assert!(!loader.cache().contains(&window));
        }

        let quota = WindowKey::tenant(30);
        backend.push_response(
            Endpoint::Period(quota.clone()),
            429,
            json!({"detail": "Hourly quota reached"}),
        );
        assert_eq!(
            loader.request(&quota).await,
            Err(InsightsError::QuotaExceeded("Hourly quota reached".into()))
        );

        let broken = WindowKey::tenant(90);
        backend.push(Endpoint::Period(broken.clone()), Ok(ApiResponse::new(500, "boom")));
        assert_eq!(
            loader.request(&broken).await,
            Err(InsightsError::Fetch {
                status: 500,
                detail: "boom".into()
            })
        );
    }

    #[tokio::test]
    async fn test_network_failure_is_error_and_not_cached() {
        let backend = Arc::new(MockBackend::new());
        let window = WindowKey::tenant(7);
        backend.push(
            Endpoint::Period(window.clone()),
            Err(InsightsError::Network("connection reset".into())),
        );
        backend.push_response(Endpoint::Period(window.clone()), 200, period_body("a1", 1.0));
        let loader = loader_with(backend.clone(), signed_in());

        assert!(matches!(loader.request(&window).await, Err(InsightsError::Network(_))));
        assert!(loader.request(&window).await.unwrap().dataset().is_some());
        assert_eq!(backend.call_count(&Endpoint::Period(window)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_share_one_fetch() {
        let backend = Arc::new(MockBackend::with_latency(Duration::from_millis(200)));
        let window = WindowKey::tenant(14);
        backend.push_response(Endpoint::Period(window.clone()), 200, period_body("a1", 2.0));
        let loader = loader_with(backend.clone(), signed_in());

        let (a, b) = tokio::join!(loader.request(&window), loader.request(&window));

        let a = a.unwrap();
        let b = b.unwrap();
        assert!(Arc::ptr_eq(a.dataset().unwrap(), b.dataset().unwrap()));
        assert_eq!(backend.call_count(&Endpoint::Period(window)), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let backend = Arc::new(MockBackend::new());
        let window = WindowKey::tenant(7);
        backend.set_sticky(
            Endpoint::Period(window.clone()),
            Ok(ApiResponse::json(200, period_body("a1", 1.0))),
        );
        let loader = loader_with(backend.clone(), signed_in());

        loader.request(&window).await.unwrap();
        loader.invalidate(&window);
        loader.request(&window).await.unwrap();
        assert_eq!(backend.call_count(&Endpoint::Period(window)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_finishing_after_logout_stays_out_of_cache() {
        let backend = Arc::new(MockBackend::with_latency(Duration::from_millis(200)));
        let window = WindowKey::tenant(30);
        backend.push_response(Endpoint::Period(window.clone()), 200, period_body("tenant-a-ad", 1.0));
        backend.push_response(Endpoint::Period(window.clone()), 200, period_body("tenant-b-ad", 2.0));
        let sessions = Arc::new(SessionStore::open(Box::new(MemoryMedium::with_session(
            Session::new("jwt-a", "tenant-a", "user-a"),
        ))));
        let loader = loader_with(backend.clone(), sessions.clone());

        let stale = tokio::spawn({
            let loader = loader.clone();
            let window = window.clone();
            async move { loader.request(&window).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        loader.invalidate_all();
        sessions.clear().unwrap();
        sessions.set(Session::new("jwt-b", "tenant-b", "user-b")).unwrap();

        let fresh = loader.request(&window).await.unwrap();
        assert_eq!(fresh.dataset().unwrap().ads[0].ad_id, "tenant-b-ad");

        // The old request still answers its own caller.
        let stale = stale.await.unwrap().unwrap();
        assert_eq!(stale.dataset().unwrap().ads[0].ad_id, "tenant-a-ad");

        assert_eq!(loader.cache().get(&window).unwrap().ads[0].ad_id, "tenant-b-ad");
        let bearers: Vec<String> = backend.calls().into_iter().map(|call| call.bearer).collect();
        assert_eq!(bearers, vec!["jwt-a", "jwt-b"]);
    }

    #[tokio::test]
    async fn test_tenant_switch_drops_cached_windows() {
        let backend = Arc::new(MockBackend::new());
        let window = WindowKey::tenant(7);
        backend.push_response(Endpoint::Period(window.clone()), 200, period_body("tenant-a-ad", 1.0));
        backend.push_response(Endpoint::Period(window.clone()), 200, period_body("tenant-b-ad", 1.0));
        let sessions = Arc::new(SessionStore::open(Box::new(MemoryMedium::with_session(
            Session::new("jwt-a", "tenant-a", "user-a"),
        ))));
        let loader = loader_with(backend.clone(), sessions.clone());

        loader.request(&window).await.unwrap();
        sessions.set(Session::new("jwt-b", "tenant-b", "user-b")).unwrap();

        let switched = loader.request(&window).await.unwrap();
        assert_eq!(switched.dataset().unwrap().ads[0].ad_id, "tenant-b-ad");
        assert_eq!(backend.call_count(&Endpoint::Period(window)), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_initial_then_background_notifications() {
        let backend = Arc::new(MockBackend::new());
        let default = WindowKey::tenant(7);
        let others = vec![WindowKey::tenant(3), WindowKey::tenant(7), WindowKey::tenant(30)];
        for window in [&default, &others[0], &others[2]] {
            backend.push_response(Endpoint::Period(window.clone()), 200, period_body("a1", 1.0));
        }
        let loader = loader_with(backend.clone(), signed_in());
        let mut ready = loader.subscribe();

        let (outcome, handle) = loader.load_initial(&default, others).await.unwrap();
        assert!(outcome.dataset().is_some());
        assert_eq!(ready.recv().await.unwrap().window, default);
        assert_eq!(backend.total_calls(), 1);

        handle.unwrap().await.unwrap();

        let mut landed = vec![ready.recv().await.unwrap().window, ready.recv().await.unwrap().window];
        landed.sort_by_key(|w| w.period.days());
        assert_eq!(landed, vec![WindowKey::tenant(3), WindowKey::tenant(30)]);
        assert_eq!(backend.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_load_initial_skips_background_when_not_ready() {
        let backend = Arc::new(MockBackend::new());
        let default = WindowKey::tenant(7);
        backend.push_response(Endpoint::Period(default.clone()), 404, json!({"detail": "none"}));
        let loader = loader_with(backend.clone(), signed_in());

        let (outcome, handle) = loader
            .load_initial(&default, vec![WindowKey::tenant(30)])
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::NotYetComputed);
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_account_scope_is_separate_key() {
        let backend = Arc::new(MockBackend::new());
        let tenant = WindowKey::tenant(7);
        let account = WindowKey::trailing(AccountScope::Account("act_1".into()), 7);
        backend.push_response(Endpoint::Period(tenant.clone()), 200, period_body("a1", 1.0));
        backend.push_response(Endpoint::Period(account.clone()), 200, period_body("a2", 3.0));
        let loader = loader_with(backend.clone(), signed_in());

        loader.request(&tenant).await.unwrap();
        let scoped = loader.request(&account).await.unwrap();
        assert_eq!(scoped.dataset().unwrap().ads[0].ad_id, "a2");
    }

    #[tokio::test]
    async fn test_refresh_ticket_and_rejections() {
        let backend = Arc::new(MockBackend::new());
        let loader = loader_with(backend.clone(), signed_in());

        backend.push_response(
            Endpoint::Refresh,
            200,
            json!({"status": "processing", "accounts_total": 3, "jobs_launched": 3, "estimated_time_minutes": 5}),
        );
        let ticket = loader.trigger_backend_refresh().await.unwrap();
        assert!(ticket.success);
        assert_eq!(ticket.jobs_launched, Some(3));

        backend.push_response(Endpoint::Refresh, 200, json!({"success": false, "error": "no token"}));
        assert_eq!(
            loader.trigger_backend_refresh().await,
            Err(InsightsError::Refresh("no token".into()))
        );

        backend.push_response(Endpoint::Refresh, 401, json!({"detail": "expired"}));
        assert_eq!(loader.trigger_backend_refresh().await, Err(InsightsError::AuthExpired));

        backend.push_response(Endpoint::Refresh, 429, json!({"detail": "slow down"}));
        assert!(matches!(
            loader.trigger_backend_refresh().await,
            Err(InsightsError::QuotaExceeded(_))
        ));
    }

    #[tokio::test]
    async fn test_account_refresh_and_status() {
        let backend = Arc::new(MockBackend::new());
        let loader = loader_with(backend.clone(), signed_in());

        backend.push_response(
            Endpoint::RefreshAccount,
            200,
            json!({"status": "queued", "job_id": "job-1", "already_processing": false}),
        );
        backend.push_response(
            Endpoint::RefreshStatus,
            200,
            json!({"status": "error", "started_at": "2024-03-01T10:00:00Z", "error": "token revoked"}),
        );
        backend.push_response(
            Endpoint::Accounts,
            200,
            json!({"accounts": [{"id": "1", "fb_account_id": "act_1", "name": "Main"}]}),
        );

        let job = loader.refresh_account("act_1").await.unwrap();
        assert_eq!(job.job_id, "job-1");

        let status = loader.refresh_status(&job.job_id).await.unwrap();
        assert!(status.state.is_finished());
        assert_eq!(status.error.as_deref(), Some("token revoked"));

        let accounts = loader.list_accounts().await.unwrap();
        assert_eq!(accounts[0].fb_account_id, "act_1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_after_max_attempts() {
        let backend = Arc::new(MockBackend::new());
        backend.set_sticky(Endpoint::Probe, Ok(ApiResponse::new(404, "")));
        let loader = loader_with(backend.clone(), signed_in());

        let outcome = loader
            .poll_until_ready(Duration::from_secs(5), 4, &PollCancel::new())
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut { attempts: 4 });
        assert_eq!(backend.call_count(&Endpoint::Probe), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_ready_on_third_probe() {
        let backend = Arc::new(MockBackend::new());
        backend.push(Endpoint::Probe, Ok(ApiResponse::new(404, "")));
        backend.push(Endpoint::Probe, Err(InsightsError::Network("reset".into())));
        backend.push(Endpoint::Probe, Ok(ApiResponse::new(200, "{}")));
        let loader = loader_with(backend.clone(), signed_in());

        let outcome = loader
            .poll_until_ready(Duration::from_secs(5), 10, &PollCancel::new())
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Ready { attempts: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_cancel_interrupts_sleep() {
        let backend = Arc::new(MockBackend::new());
        backend.set_sticky(Endpoint::Probe, Ok(ApiResponse::new(404, "")));
        let loader = loader_with(backend.clone(), signed_in());
        let cancel = PollCancel::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let outcome = loader
            .poll_until_ready(Duration::from_secs(5), 10, &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 2 });
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(backend.call_count(&Endpoint::Probe), 2);
    }

    #[tokio::test]
    async fn test_poll_without_session_is_auth_expired() {
        let backend = Arc::new(MockBackend::new());
        let sessions = Arc::new(SessionStore::open(Box::new(MemoryMedium::new())));
        let loader = loader_with(backend, sessions);
        assert_eq!(
            loader
                .poll_until_ready(Duration::from_secs(1), 3, &PollCancel::new())
                .await,
            Err(InsightsError::AuthExpired)
        );
    }
}
