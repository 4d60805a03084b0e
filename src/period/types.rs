use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregation::types::AggregatedAd;

/// Which accounts a window covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountScope {
    /// Every ad account of the tenant, aggregated server-side.
    Tenant,
    Account(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// The last N days.
    Trailing(u16),
    /// The N days before the trailing N days (dedicated comparison feed).
    Previous(u16),
}

impl Period {
    pub fn days(self) -> u16 {
        match self {
            Self::Trailing(days) | Self::Previous(days) => days,
        }
    }

    pub fn is_previous(self) -> bool {
        matches!(self, Self::Previous(_))
    }
}

/// Cache and dedup key for one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowKey {
    pub scope: AccountScope,
    pub period: Period,
}

impl WindowKey {
    pub fn trailing(scope: AccountScope, days: u16) -> Self {
        Self {
            scope,
            period: Period::Trailing(days),
        }
    }

    pub fn previous(scope: AccountScope, days: u16) -> Self {
        Self {
            scope,
            period: Period::Previous(days),
        }
    }

    pub fn tenant(days: u16) -> Self {
        Self::trailing(AccountScope::Tenant, days)
    }
}

impl fmt::Display for WindowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = match &self.scope {
            AccountScope::Tenant => "tenant",
            AccountScope::Account(id) => id.as_str(),
        };
        match self.period {
            Period::Trailing(days) => write!(f, "{}/{}d", scope, days),
            Period::Previous(days) => write!(f, "{}/prev{}d", scope, days),
        }
    }
}

/// Descriptive fields of an ad; constant across the days of one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdMetadata {
    pub name: String,
    pub format: String,
    pub created_time: Option<DateTime<Utc>>,
    pub account_id: String,
    pub account_name: String,
    pub status: String,
}

/// One ad's metrics for one calendar day, after ingestion normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAdRow {
    pub ad_id: String,
    pub date: NaiveDate,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub purchases: u64,
    pub purchase_value: f64,
    pub metadata: AdMetadata,
}

/// Server-supplied context about a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub accounts_total: Option<u32>,
    #[serde(default)]
    pub accounts_loaded: Option<u32>,
    #[serde(default)]
    pub accounts_failed: Option<u32>,
    #[serde(default)]
    pub reference_date: Option<NaiveDate>,
    /// Raw rows received before aggregation.
    #[serde(default)]
    pub row_count: usize,
    /// Rows dropped during normalization.
    #[serde(default)]
    pub rejected_rows: usize,
}

/// Aggregated dataset for one window. Never mutated; reloads replace it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodDataset {
    pub window: WindowKey,
    pub ads: Vec<AggregatedAd>,
    pub metadata: DatasetMetadata,
}

impl PeriodDataset {
    pub fn is_empty(&self) -> bool {
        self.ads.is_empty()
    }

    /// Distinct account ids present, in first-seen order.
    pub fn account_ids(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for ad in &self.ads {
            if !ad.metadata.account_id.is_empty() && !seen.contains(&ad.metadata.account_id) {
                seen.push(ad.metadata.account_id.clone());
            }
        }
        seen
    }
}

/// Result of asking the loader for a window.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Ready(Arc<PeriodDataset>),
    /// 404: nothing generated yet for this tenant/window.
    NotYetComputed,
    /// 401, or no session. Caller must force logout.
    Unauthorized,
    /// 412: backend does not know this identity. Caller must keep the session
    /// and route to identity linking.
    IdentityUnsynced,
}

impl Outcome {
    pub fn dataset(&self) -> Option<&Arc<PeriodDataset>> {
        match self {
            Self::Ready(dataset) => Some(dataset),
            _ => None,
        }
    }
}

/// Published when a window lands in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowReady {
    pub window: WindowKey,
    pub ads: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_key_display() {
        assert_eq!(WindowKey::tenant(7).to_string(), "tenant/7d");
        assert_eq!(
            WindowKey::previous(AccountScope::Account("act_1".into()), 14).to_string(),
            "act_1/prev14d"
        );
    }

    #[test]
    fn test_trailing_and_previous_are_distinct_keys() {
        let a = WindowKey::tenant(7);
        let b = WindowKey::previous(AccountScope::Tenant, 7);
        assert_ne!(a, b);
        assert_eq!(a.period.days(), b.period.days());
    }
}
