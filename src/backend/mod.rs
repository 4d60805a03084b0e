//! Transport seam to the Insights API.
//!
//! `Backend` methods return the raw status and body of each call, and only fail
//! on transport errors. Status classification belongs to the callers
//! (auth controller, period loader), which keeps it testable against the
//! scripted `MockBackend`.

pub mod http;
pub mod mock;
pub mod wire;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::InsightsError;
use crate::period::types::WindowKey;

pub use http::HttpBackend;
pub use mock::MockBackend;

const MAX_DETAIL_LEN: usize = 1024;

/// Status and body of one HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, InsightsError> {
        serde_json::from_str(&self.body).map_err(|e| {
            InsightsError::Decode(format!("unexpected body for status {}: {}", self.status, e))
        })
    }

    /// Human-readable error detail: the `detail` field when the body has one,
    /// otherwise the (truncated) raw body.
    pub fn detail(&self) -> String {
        if let Ok(body) = serde_json::from_str::<wire::ErrorBody>(&self.body) {
            return body.detail;
        }
        let trimmed = self.body.trim();
        if trimmed.is_empty() {
            return format!("HTTP {}", self.status);
        }
        if trimmed.len() > MAX_DETAIL_LEN {
            let mut end = MAX_DETAIL_LEN;
            while !trimmed.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &trimmed[..end])
        } else {
            trimmed.to_string()
        }
    }
}

/// Calls the client makes against the Insights API.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Mirror an upstream identity into a tenant session (OAuth callback).
    async fn sync_callback(
        &self,
        upstream_token: &str,
        provider_token: &str,
    ) -> Result<ApiResponse, InsightsError>;

    /// Reuse an upstream session to sign in silently.
    async fn sso_login(&self, upstream_token: &str) -> Result<ApiResponse, InsightsError>;

    async fn fetch_period(
        &self,
        access_token: &str,
        window: &WindowKey,
    ) -> Result<ApiResponse, InsightsError>;

    /// Ask the backend to regenerate datasets for every tenant account.
    async fn trigger_refresh(&self, access_token: &str) -> Result<ApiResponse, InsightsError>;

    async fn refresh_account(
        &self,
        access_token: &str,
        account_id: &str,
    ) -> Result<ApiResponse, InsightsError>;

    async fn refresh_status(
        &self,
        access_token: &str,
        job_id: &str,
    ) -> Result<ApiResponse, InsightsError>;

    async fn list_accounts(&self, access_token: &str) -> Result<ApiResponse, InsightsError>;

    /// Lightweight readiness check; only the status matters.
    async fn probe_ready(&self, access_token: &str) -> Result<ApiResponse, InsightsError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_prefers_detail_field() {
        let response = ApiResponse::json(400, serde_json::json!({"detail": "Missing scope"}));
        assert_eq!(response.detail(), "Missing scope");
    }

    #[test]
    fn test_detail_falls_back_to_body_or_status() {
        assert_eq!(ApiResponse::new(502, "Bad gateway").detail(), "Bad gateway");
        assert_eq!(ApiResponse::new(503, "").detail(), "HTTP 503");
    }

    #[test]
    fn test_detail_truncates_long_bodies() {
        let body = "x".repeat(5000);
        let detail = ApiResponse::new(500, body).detail();
        assert_eq!(detail.len(), MAX_DETAIL_LEN + 3);
        assert!(detail.ends_with("..."));
    }

    #[test]
    fn test_status_classes() {
        assert!(ApiResponse::new(204, "").is_success());
        assert!(ApiResponse::new(404, "").is_client_error());
        assert!(ApiResponse::new(503, "").is_server_error());
        assert!(!ApiResponse::new(302, "").is_success());
    }

    #[test]
    fn test_grant_body_ignores_extra_fields() {
        let response = ApiResponse::json(
            200,
            serde_json::json!({
                "access_token": "jwt",
                "tenant_id": "t-1",
                "supabase_user_id": "u-1",
                "user_id": "legacy-id"
            }),
        );
        let body: wire::SessionGrantBody = response.parse().unwrap();
        assert_eq!(body.supabase_user_id, "u-1");
        assert_eq!(body.ad_accounts_count, None);
    }
}
