use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::period::types::AdMetadata;

/// One ad over one window: summed totals plus ratios derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedAd {
    pub ad_id: String,
    pub metadata: AdMetadata,

    // === Additive totals ===
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub purchases: u64,
    pub purchase_value: f64,

    // === Derived from totals (never averaged per row) ===
    pub roas: f64,
    pub cpa: f64,
    /// Percent, 0-100.
    pub ctr: f64,

    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    /// Number of daily rows merged into this record.
    pub days_with_data: u32,
}

impl AggregatedAd {
    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        self.metadata.created_time
    }

    /// Recompute `roas`, `cpa` and `ctr` from the current totals.
    pub fn refresh_ratios(&mut self) {
        let ratios = DerivedRatios::from_totals(
            self.spend,
            self.impressions,
            self.clicks,
            self.purchases,
            self.purchase_value,
        );
        self.roas = ratios.roas;
        self.cpa = ratios.cpa;
        self.ctr = ratios.ctr;
    }
}

/// Sums across many ads, with the same ratio rules as a single ad.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub purchases: u64,
    pub purchase_value: f64,
    pub roas: f64,
    pub cpa: f64,
    pub ctr: f64,
    pub ads: usize,
}

/// Ratios derived from additive totals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedRatios {
    pub roas: f64,
    pub cpa: f64,
    pub ctr: f64,
}

impl DerivedRatios {
    pub fn from_totals(spend: f64, impressions: u64, clicks: u64, purchases: u64, value: f64) -> Self {
        Self {
            roas: if spend > 0.0 { value / spend } else { 0.0 },
            cpa: if purchases > 0 { spend / purchases as f64 } else { 0.0 },
            ctr: if impressions > 0 {
                clicks as f64 / impressions as f64 * 100.0
            } else {
                0.0
            },
        }
    }
}
