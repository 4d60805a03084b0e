//! JSON bodies exchanged with the Insights API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct SyncRequest<'a> {
    pub provider_token: &'a str,
}

/// Success body of both sync-facebook and login-via-supabase.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionGrantBody {
    pub access_token: String,
    pub tenant_id: String,
    pub supabase_user_id: String,
    #[serde(default)]
    pub ad_accounts_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// Body of POST /api/accounts/refresh-tenant-accounts.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshBody {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub jobs_launched: Option<u32>,
    #[serde(default)]
    pub accounts_total: Option<u32>,
    #[serde(default)]
    pub estimated_time_minutes: Option<u32>,
    #[serde(default)]
    pub retry_in_minutes: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of POST /api/accounts/refresh/{act_id}.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountRefreshBody {
    pub status: String,
    pub job_id: String,
    #[serde(default)]
    pub already_processing: bool,
}

/// Body of GET /api/accounts/refresh/status/{job_id}.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshStatusBody {
    pub status: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub finished_at: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: String,
    pub fb_account_id: String,
    pub name: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub last_refresh_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountsBody {
    pub accounts: Vec<AccountSummary>,
}
