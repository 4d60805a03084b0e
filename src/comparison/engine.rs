//! Current-vs-previous period comparison.

use std::collections::HashMap;

use super::types::{AccountFilter, ComparisonResult, MetricDeltas, PreviousSource};
use crate::aggregation::{AggregatedAd, Totals};
use crate::period::types::PeriodDataset;

/// Compare `current` against the previous period.
///
/// A dedicated `previous` dataset is used when present. Otherwise the
/// previous period is synthesized from `long` minus `short`. Returns `None`
/// when neither source is available.
pub fn compare(
    current: &PeriodDataset,
    previous: Option<&PeriodDataset>,
    long: Option<&PeriodDataset>,
    short: Option<&PeriodDataset>,
    filter: &AccountFilter,
) -> Option<ComparisonResult> {
    let current_totals = Totals::from_ads(filter.apply(&current.ads));

    let (previous_totals, previous_source) = match (previous, long, short) {
        (Some(dedicated), _, _) => (
            Totals::from_ads(filter.apply(&dedicated.ads)),
            PreviousSource::Dedicated,
        ),
        (None, Some(long), Some(short)) => {
            let synthesized = synthesize_previous(
                &filter.apply(&long.ads),
                &filter.apply(&short.ads),
            );
            (Totals::from_ads(&synthesized), PreviousSource::Synthesized)
        }
        _ => return None,
    };

    Some(ComparisonResult {
        current_totals,
        previous_totals,
        deltas: MetricDeltas::between(&current_totals, &previous_totals),
        previous_source,
    })
}

/// Previous-period aggregates derived from two overlapping trailing windows.
///
/// For ads present in both windows, every additive metric becomes
/// `max(0, long - short)`. Ads where neither spend nor purchases remain are
/// dropped. Output follows the order of `long`.
pub fn synthesize_previous(long: &[&AggregatedAd], short: &[&AggregatedAd]) -> Vec<AggregatedAd> {
    let short_by_id: HashMap<&str, &AggregatedAd> =
        short.iter().map(|ad| (ad.ad_id.as_str(), *ad)).collect();

    long.iter()
        .filter_map(|long_ad| {
            let short_ad = short_by_id.get(long_ad.ad_id.as_str())?;
            let spend = (long_ad.spend - short_ad.spend).max(0.0);
            let purchases = long_ad.purchases.saturating_sub(short_ad.purchases);
            if spend <= 0.0 && purchases == 0 {
                return None;
            }

            let mut ad = AggregatedAd {
                ad_id: long_ad.ad_id.clone(),
                metadata: long_ad.metadata.clone(),
                spend,
                impressions: long_ad.impressions.saturating_sub(short_ad.impressions),
                clicks: long_ad.clicks.saturating_sub(short_ad.clicks),
                purchases,
                purchase_value: (long_ad.purchase_value - short_ad.purchase_value).max(0.0),
                roas: 0.0,
                cpa: 0.0,
                ctr: 0.0,
                first_date: long_ad.first_date,
                last_date: short_ad.first_date.and_then(|d| d.pred_opt()),
                days_with_data: long_ad.days_with_data.saturating_sub(short_ad.days_with_data),
            };
            ad.refresh_ratios();
            Some(ad)
        })
        .collect()
}
