use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregation::AggregatedAd;

/// Table columns usable for sorting and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    AdId,
    Name,
    Format,
    AccountName,
    Status,
    CreatedTime,
    Spend,
    Impressions,
    Clicks,
    Purchases,
    PurchaseValue,
    Roas,
    Cpa,
    Ctr,
    DaysWithData,
}

impl Column {
    pub fn is_numeric(self) -> bool {
        !matches!(
            self,
            Self::AdId | Self::Name | Self::Format | Self::AccountName | Self::Status
        )
    }

    /// Numeric cell value. Created time reads as a unix timestamp; a missing
    /// one reads as `None`.
    pub fn number(self, ad: &AggregatedAd) -> Option<f64> {
        match self {
            Self::CreatedTime => ad.created_time().map(|t| t.timestamp() as f64),
            Self::Spend => Some(ad.spend),
            Self::Impressions => Some(ad.impressions as f64),
            Self::Clicks => Some(ad.clicks as f64),
            Self::Purchases => Some(ad.purchases as f64),
            Self::PurchaseValue => Some(ad.purchase_value),
            Self::Roas => Some(ad.roas),
            Self::Cpa => Some(ad.cpa),
            Self::Ctr => Some(ad.ctr),
            Self::DaysWithData => Some(ad.days_with_data as f64),
            _ => None,
        }
    }

    pub fn text(self, ad: &AggregatedAd) -> Option<&str> {
        match self {
            Self::AdId => Some(&ad.ad_id),
            Self::Name => Some(&ad.metadata.name),
            Self::Format => Some(&ad.metadata.format),
            Self::AccountName => Some(&ad.metadata.account_name),
            Self::Status => Some(&ad.metadata.status),
            _ => None,
        }
    }

    /// Order two ads by this column, ascending.
    pub fn compare(self, a: &AggregatedAd, b: &AggregatedAd) -> Ordering {
        if self.is_numeric() {
            // Missing values sort first.
            let a = self.number(a).unwrap_or(f64::NEG_INFINITY);
            let b = self.number(b).unwrap_or(f64::NEG_INFINITY);
            a.total_cmp(&b)
        } else {
            let a = self.text(a).unwrap_or_default().to_lowercase();
            let b = self.text(b).unwrap_or_default().to_lowercase();
            a.cmp(&b)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum FilterPredicate {
    Min(f64),
    Max(f64),
    Between { min: f64, max: f64 },
    /// Case-insensitive substring.
    Contains(String),
    /// Case-insensitive equality.
    Equals(String),
}

impl FilterPredicate {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Min(_) | Self::Max(_) | Self::Between { .. })
    }

    pub fn applies_to(&self, column: Column) -> bool {
        self.is_numeric() == column.is_numeric()
    }

    pub fn matches(&self, column: Column, ad: &AggregatedAd) -> bool {
        match self {
            Self::Min(min) => column.number(ad).is_some_and(|v| v >= *min),
            Self::Max(max) => column.number(ad).is_some_and(|v| v <= *max),
            Self::Between { min, max } => column.number(ad).is_some_and(|v| v >= *min && v <= *max),
            Self::Contains(needle) => column
                .text(ad)
                .is_some_and(|v| v.to_lowercase().contains(&needle.to_lowercase())),
            Self::Equals(expected) => column
                .text(ad)
                .is_some_and(|v| v.eq_ignore_ascii_case(expected)),
        }
    }
}

/// Persisted table state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewPreferences {
    pub sort_key: Column,
    pub sort_direction: SortDirection,
    pub page_size: usize,
    pub filters: BTreeMap<Column, FilterPredicate>,
}

pub const DEFAULT_PAGE_SIZE: usize = 25;

impl Default for ViewPreferences {
    fn default() -> Self {
        Self {
            sort_key: Column::Spend,
            sort_direction: SortDirection::Desc,
            page_size: DEFAULT_PAGE_SIZE,
            filters: BTreeMap::new(),
        }
    }
}

/// One rendered page. Rows borrow from the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct TablePage<'a> {
    pub rows: Vec<&'a AggregatedAd>,
    /// 1-based.
    pub page: usize,
    pub total_pages: usize,
    /// Rows left after filtering.
    pub filtered_rows: usize,
    pub total_rows: usize,
    pub page_size: usize,
}

impl TablePage<'_> {
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }
}
