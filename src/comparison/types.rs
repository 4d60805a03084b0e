use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::aggregation::{AggregatedAd, Totals};

/// Largest delta reported as-is, in percent.
pub const DELTA_CEILING: f64 = 999.0;

/// Percentage change between two periods.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "pct", rename_all = "snake_case")]
pub enum DeltaPct {
    Value(f64),
    /// Beyond the display ceiling; carries `+/-DELTA_CEILING`.
    Capped(f64),
    /// Previous period was zero (or negative), so no percentage exists.
    NotApplicable,
}

impl DeltaPct {
    pub fn between(current: f64, previous: f64) -> Self {
        if previous <= 0.0 || !previous.is_finite() || !current.is_finite() {
            return Self::NotApplicable;
        }
        let delta = (current - previous) / previous * 100.0;
        if delta.abs() > DELTA_CEILING {
            Self::Capped(DELTA_CEILING.copysign(delta))
        } else {
            Self::Value(delta)
        }
    }

    pub fn is_applicable(&self) -> bool {
        !matches!(self, Self::NotApplicable)
    }
}

impl fmt::Display for DeltaPct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotApplicable => write!(f, "n/a"),
            Self::Capped(bound) if *bound > 0.0 => write!(f, "+{:.0}%+", bound),
            Self::Capped(bound) => write!(f, "{:.0}%", bound),
            Self::Value(delta) => write!(f, "{:+.1}%", delta),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricDeltas {
    pub spend: DeltaPct,
    pub impressions: DeltaPct,
    pub clicks: DeltaPct,
    pub purchases: DeltaPct,
    pub purchase_value: DeltaPct,
    pub roas: DeltaPct,
    pub cpa: DeltaPct,
    pub ctr: DeltaPct,
}

impl MetricDeltas {
    pub fn between(current: &Totals, previous: &Totals) -> Self {
        Self {
            spend: DeltaPct::between(current.spend, previous.spend),
            impressions: DeltaPct::between(current.impressions as f64, previous.impressions as f64),
            clicks: DeltaPct::between(current.clicks as f64, previous.clicks as f64),
            purchases: DeltaPct::between(current.purchases as f64, previous.purchases as f64),
            purchase_value: DeltaPct::between(current.purchase_value, previous.purchase_value),
            roas: DeltaPct::between(current.roas, previous.roas),
            cpa: DeltaPct::between(current.cpa, previous.cpa),
            ctr: DeltaPct::between(current.ctr, previous.ctr),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviousSource {
    /// Backend served the previous period directly.
    Dedicated,
    /// Derived as long window minus short window.
    Synthesized,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub current_totals: Totals,
    pub previous_totals: Totals,
    pub deltas: MetricDeltas,
    pub previous_source: PreviousSource,
}

/// Restricts datasets to a set of ad accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum AccountFilter {
    #[default]
    All,
    Accounts(BTreeSet<String>),
}

impl AccountFilter {
    /// An empty selection means no restriction.
    pub fn accounts<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            Self::All
        } else {
            Self::Accounts(ids)
        }
    }

    pub fn matches(&self, ad: &AggregatedAd) -> bool {
        match self {
            Self::All => true,
            Self::Accounts(ids) => ids.contains(&ad.metadata.account_id),
        }
    }

    pub fn apply<'a>(&self, ads: &'a [AggregatedAd]) -> Vec<&'a AggregatedAd> {
        ads.iter().filter(|ad| self.matches(ad)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_previous_is_not_applicable() {
        assert_eq!(DeltaPct::between(0.0, 0.0), DeltaPct::NotApplicable);
        assert_eq!(DeltaPct::between(50.0, 0.0), DeltaPct::NotApplicable);
        assert_eq!(DeltaPct::between(50.0, 0.0).to_string(), "n/a");
    }

    #[test]
    fn test_extreme_delta_is_capped() {
        // 1500%
        let delta = DeltaPct::between(160.0, 10.0);
        assert_eq!(delta, DeltaPct::Capped(DELTA_CEILING));
        assert_eq!(delta.to_string(), "+999%+");
    }

    #[test]
    fn test_regular_delta() {
        assert_eq!(DeltaPct::between(150.0, 100.0), DeltaPct::Value(50.0));
        assert_eq!(DeltaPct::between(75.0, 100.0).to_string(), "-25.0%");
        assert_eq!(DeltaPct::between(112.3, 100.0).to_string(), "+12.3%");
    }

    #[test]
    fn test_empty_account_selection_is_all() {
        assert_eq!(AccountFilter::accounts(Vec::<String>::new()), AccountFilter::All);
    }
}
