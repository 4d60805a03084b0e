use async_trait::async_trait;
use tracing::{info, warn};
use url::Url;

use super::wire::SyncRequest;
use super::{ApiResponse, Backend};
use crate::config::ClientConfig;
use crate::error::InsightsError;
use crate::period::types::{AccountScope, WindowKey};

pub const USER_AGENT: &str = "InsightsClient/0.1";

pub const SYNC_PATH: &str = "/auth/facebook/sync-facebook";
pub const SSO_PATH: &str = "/auth/facebook/login-via-supabase";
pub const TENANT_PERIOD_PATH: &str = "/api/data/tenant-aggregated";
pub const REFRESH_TENANT_PATH: &str = "/api/accounts/refresh-tenant-accounts";
pub const ACCOUNTS_PATH: &str = "/api/accounts/";

/// reqwest-backed implementation of `Backend`.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    probe_days: u16,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, InsightsError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| InsightsError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Url::parse(&config.api_base_url)
            .map_err(|e| InsightsError::Config(format!("Invalid api_base_url: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            probe_days: config.default_window,
        })
    }

    /// Absolute URL for an API path, keeping any path prefix of the base URL.
    fn endpoint(&self, path: &str) -> Result<Url, InsightsError> {
        Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| InsightsError::Config(format!("Invalid endpoint {}: {}", path, e)))
    }

    pub fn period_url(&self, window: &WindowKey, cache_bust: Option<i64>) -> Result<Url, InsightsError> {
        let mut url = match &window.scope {
            AccountScope::Tenant => self.endpoint(TENANT_PERIOD_PATH)?,
            // Per-account period endpoint; see DESIGN.md on the server contract.
            AccountScope::Account(id) => {
                self.endpoint(&format!("/api/data/accounts/{}/period", urlencoding::encode(id)))?
            }
        };
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("days", &window.period.days().to_string());
            if window.period.is_previous() {
                query.append_pair("previous", "true");
            }
            if let Some(ts) = cache_bust {
                query.append_pair("_ts", &ts.to_string());
            }
        }
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder, label: &str) -> Result<ApiResponse, InsightsError> {
        let response = request.send().await.map_err(|e| {
            warn!("{} request failed: {}", label, e);
            InsightsError::from(e)
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| {
            warn!("Failed to read {} response body: {}", label, e);
            InsightsError::from(e)
        })?;
        info!("{} -> HTTP {}", label, status);
        Ok(ApiResponse { status, body })
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn sync_callback(
        &self,
        upstream_token: &str,
        provider_token: &str,
    ) -> Result<ApiResponse, InsightsError> {
        let request = self
            .client
            .post(self.endpoint(SYNC_PATH)?)
            .bearer_auth(upstream_token)
            .json(&SyncRequest { provider_token });
        self.send(request, "sync-facebook").await
    }

    async fn sso_login(&self, upstream_token: &str) -> Result<ApiResponse, InsightsError> {
        let request = self
            .client
            .post(self.endpoint(SSO_PATH)?)
            .bearer_auth(upstream_token);
        self.send(request, "login-via-supabase").await
    }

    async fn fetch_period(
        &self,
        access_token: &str,
        window: &WindowKey,
    ) -> Result<ApiResponse, InsightsError> {
        let url = self.period_url(window, Some(chrono::Utc::now().timestamp_millis()))?;
        let request = self.client.get(url).bearer_auth(access_token);
        self.send(request, &format!("period {}", window)).await
    }

    async fn trigger_refresh(&self, access_token: &str) -> Result<ApiResponse, InsightsError> {
        let request = self
            .client
            .post(self.endpoint(REFRESH_TENANT_PATH)?)
            .bearer_auth(access_token);
        self.send(request, "refresh-tenant-accounts").await
    }

    async fn refresh_account(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<ApiResponse, InsightsError> {
        let path = format!("/api/accounts/refresh/{}", urlencoding::encode(account_id));
        let request = self.client.post(self.endpoint(&path)?).bearer_auth(access_token);
        self.send(request, "refresh-account").await
    }

    async fn refresh_status(
        &self,
        access_token: &str,
        job_id: &str,
    ) -> Result<ApiResponse, InsightsError> {
        let path = format!("/api/accounts/refresh/status/{}", urlencoding::encode(job_id));
        let request = self.client.get(self.endpoint(&path)?).bearer_auth(access_token);
        self.send(request, "refresh-status").await
    }

    async fn list_accounts(&self, access_token: &str) -> Result<ApiResponse, InsightsError> {
        let request = self
            .client
            .get(self.endpoint(ACCOUNTS_PATH)?)
            .bearer_auth(access_token);
        self.send(request, "accounts").await
    }

    async fn probe_ready(&self, access_token: &str) -> Result<ApiResponse, InsightsError> {
        let url = self.period_url(&WindowKey::tenant(self.probe_days), None)?;
        let request = self.client.get(url).bearer_auth(access_token);
        self.send(request, "readiness probe").await
    }
}
