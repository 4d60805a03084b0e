//! Per-ad aggregation of daily rows.
//!
//! The backend returns one row per ad per day. Everything downstream (table,
//! comparison, sorting) works on one record per ad, so rows are merged here
//! once, and the ratio metrics are recomputed from the merged totals.

use std::collections::HashMap;

use super::types::{AggregatedAd, DerivedRatios, Totals};
use crate::period::types::RawAdRow;

/// Merge daily rows into one record per `ad_id`.
///
/// Output order follows the first appearance of each ad in `rows`.
/// Additive fields are summed exactly, so `sum(out.spend) == sum(in.spend)`.
pub fn aggregate(rows: &[RawAdRow]) -> Vec<AggregatedAd> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(rows.len());
    let mut ads: Vec<AggregatedAd> = Vec::new();

    for row in rows {
        match index.get(row.ad_id.as_str()) {
            Some(&i) => merge_row(&mut ads[i], row),
            None => {
                index.insert(row.ad_id.as_str(), ads.len());
                ads.push(start_record(row));
            }
        }
    }

    for ad in &mut ads {
        ad.refresh_ratios();
    }

    ads
}

fn start_record(row: &RawAdRow) -> AggregatedAd {
    AggregatedAd {
        ad_id: row.ad_id.clone(),
        metadata: row.metadata.clone(),
        spend: row.spend,
        impressions: row.impressions,
        clicks: row.clicks,
        purchases: row.purchases,
        purchase_value: row.purchase_value,
        roas: 0.0,
        cpa: 0.0,
        ctr: 0.0,
        first_date: Some(row.date),
        last_date: Some(row.date),
        days_with_data: 1,
    }
}

fn merge_row(ad: &mut AggregatedAd, row: &RawAdRow) {
    ad.spend += row.spend;
    ad.impressions = ad.impressions.saturating_add(row.impressions);
    ad.clicks = ad.clicks.saturating_add(row.clicks);
    ad.purchases = ad.purchases.saturating_add(row.purchases);
    ad.purchase_value += row.purchase_value;
    ad.days_with_data = ad.days_with_data.saturating_add(1);

    // Earliest known creation time wins.
    if let Some(created) = row.metadata.created_time {
        if ad.metadata.created_time.map_or(true, |current| created < current) {
            ad.metadata.created_time = Some(created);
        }
    }

    ad.first_date = Some(ad.first_date.map_or(row.date, |d| d.min(row.date)));
    ad.last_date = Some(ad.last_date.map_or(row.date, |d| d.max(row.date)));
}

impl Totals {
    /// Sum a set of aggregated ads and derive window-level ratios.
    pub fn from_ads<'a>(ads: impl IntoIterator<Item = &'a AggregatedAd>) -> Self {
        let mut totals = Totals::default();
        for ad in ads {
            totals.spend += ad.spend;
            totals.impressions = totals.impressions.saturating_add(ad.impressions);
            totals.clicks = totals.clicks.saturating_add(ad.clicks);
            totals.purchases = totals.purchases.saturating_add(ad.purchases);
            totals.purchase_value += ad.purchase_value;
            totals.ads += 1;
        }
        let ratios = DerivedRatios::from_totals(
            totals.spend,
            totals.impressions,
            totals.clicks,
            totals.purchases,
            totals.purchase_value,
        );
        totals.roas = ratios.roas;
        totals.cpa = ratios.cpa;
        totals.ctr = ratios.ctr;
        totals
    }
}
