//! Filter -> sort -> paginate over aggregated ads.

use std::sync::Arc;

use tracing::{info, warn};

use super::prefs::PreferenceStore;
use super::types::{Column, FilterPredicate, SortDirection, TablePage, ViewPreferences};
use crate::aggregation::AggregatedAd;

pub const VIEW_PREFERENCES_KEY: &str = "view_preferences";

pub struct ViewTableEngine {
    prefs: ViewPreferences,
    current_page: usize,
    store: Option<Arc<PreferenceStore>>,
}

impl ViewTableEngine {
    /// Engine without persistence.
    pub fn new(prefs: ViewPreferences) -> Self {
        Self {
            prefs,
            current_page: 1,
            store: None,
        }
    }

    /// Restore saved preferences, falling back to defaults with
    /// `default_page_size`.
    pub fn load(store: Arc<PreferenceStore>, default_page_size: usize) -> Self {
        let prefs = match store.get::<ViewPreferences>(VIEW_PREFERENCES_KEY) {
            Some(mut saved) => {
                info!("Restored view preferences (sort by {:?})", saved.sort_key);
                saved.filters.retain(|column, predicate| predicate.applies_to(*column));
                if saved.page_size == 0 {
                    saved.page_size = default_page_size.max(1);
                }
                saved
            }
            None => ViewPreferences {
                page_size: default_page_size.max(1),
                ..ViewPreferences::default()
            },
        };
        Self {
            prefs,
            current_page: 1,
            store: Some(store),
        }
    }

    pub fn preferences(&self) -> &ViewPreferences {
        &self.prefs
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn set_sort(&mut self, key: Column, direction: SortDirection) -> Result<(), String> {
        self.prefs.sort_key = key;
        self.prefs.sort_direction = direction;
        self.current_page = 1;
        self.persist()
    }

    /// Header-click behavior: same column flips direction, a new column
    /// starts descending.
    pub fn toggle_sort(&mut self, key: Column) -> Result<(), String> {
        let direction = if self.prefs.sort_key == key {
            self.prefs.sort_direction.flipped()
        } else {
            SortDirection::Desc
        };
        self.set_sort(key, direction)
    }

    pub fn set_filter(&mut self, column: Column, predicate: FilterPredicate) -> Result<(), String> {
        if !predicate.applies_to(column) {
            return Err(format!("{:?} cannot filter column {:?}", predicate, column));
        }
        self.prefs.filters.insert(column, predicate);
        self.current_page = 1;
        self.persist()
    }

    pub fn clear_filter(&mut self, column: Column) -> Result<(), String> {
        if self.prefs.filters.remove(&column).is_none() {
            return Ok(());
        }
        self.current_page = 1;
        self.persist()
    }

    pub fn clear_filters(&mut self) -> Result<(), String> {
        self.prefs.filters.clear();
        self.current_page = 1;
        self.persist()
    }

    pub fn set_page_size(&mut self, page_size: usize) -> Result<(), String> {
        if page_size == 0 {
            return Err("page size must be at least 1".to_string());
        }
        self.prefs.page_size = page_size;
        self.current_page = 1;
        self.persist()
    }

    /// Pages are 1-based; `render` clamps past-the-end pages.
    pub fn set_page(&mut self, page: usize) {
        self.current_page = page.max(1);
    }

    pub fn render<'a>(&self, ads: &'a [AggregatedAd]) -> TablePage<'a> {
        let mut rows: Vec<&AggregatedAd> = ads
            .iter()
            .filter(|ad| {
                self.prefs
                    .filters
                    .iter()
                    .all(|(column, predicate)| predicate.matches(*column, ad))
            })
            .collect();

        let key = self.prefs.sort_key;
        let direction = self.prefs.sort_direction;
        rows.sort_by(|a, b| {
            let ordering = key.compare(a, b);
            let ordering = match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            ordering.then_with(|| a.ad_id.cmp(&b.ad_id))
        });

        let page_size = self.prefs.page_size.max(1);
        let filtered_rows = rows.len();
        let total_pages = filtered_rows.div_ceil(page_size).max(1);
        let page = self.current_page.clamp(1, total_pages);
        let start = (page - 1) * page_size;
        let rows = rows.into_iter().skip(start).take(page_size).collect();

        TablePage {
            rows,
            page,
            total_pages,
            filtered_rows,
            total_rows: ads.len(),
            page_size,
        }
    }

    fn persist(&self) -> Result<(), String> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        store.set(VIEW_PREFERENCES_KEY, &self.prefs).map_err(|e| {
            warn!("View preferences not saved: {}", e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::types::AdMetadata;

    fn ad(id: &str, name: &str, spend: f64, purchases: u64) -> AggregatedAd {
        let mut ad = AggregatedAd {
            ad_id: id.to_string(),
            metadata: AdMetadata {
                name: name.to_string(),
                ..AdMetadata::default()
            },
            spend,
            impressions: 1000,
            clicks: 10,
            purchases,
            purchase_value: purchases as f64 * 20.0,
            roas: 0.0,
            cpa: 0.0,
            ctr: 0.0,
            first_date: None,
            last_date: None,
            days_with_data: 1,
        };
        ad.refresh_ratios();
        ad
    }

    fn ads() -> Vec<AggregatedAd> {
        vec![
            ad("a1", "Hook B", 120.0, 3),
            ad("a2", "Hook A", 15.0, 0),
            ad("a3", "UGC", 80.0, 4),
            ad("a4", "Static", 5.0, 1),
            ad("a5", "Carousel", 80.0, 2),
        ]
    }

    fn ids(page: &TablePage<'_>) -> Vec<String> {
        page.rows.iter().map(|ad| ad.ad_id.clone()).collect()
    }

    #[test]
    fn test_default_sort_is_spend_desc_with_id_tiebreak() {
        let data = ads();
        let engine = ViewTableEngine::new(ViewPreferences::default());
        assert_eq!(ids(&engine.render(&data)), vec!["a1", "a3", "a5", "a2", "a4"]);
    }

    #[test]
    fn test_filter_then_sort_keeps_subset() {
        let data = ads();
        let mut engine = ViewTableEngine::new(ViewPreferences::default());
        engine.set_filter(Column::Spend, FilterPredicate::Min(50.0)).unwrap();
        assert_eq!(ids(&engine.render(&data)), vec!["a1", "a3", "a5"]);

        engine.set_sort(Column::Purchases, SortDirection::Asc).unwrap();
        let page = engine.render(&data);
        assert_eq!(ids(&page), vec!["a5", "a1", "a3"]);
        assert_eq!(page.filtered_rows, 3);
        assert_eq!(page.total_rows, 5);
    }

    #[test]
    fn test_text_filters() {
        let data = ads();
        let mut engine = ViewTableEngine::new(ViewPreferences::default());
        engine
            .set_filter(Column::Name, FilterPredicate::Contains("hook".into()))
            .unwrap();
        assert_eq!(ids(&engine.render(&data)), vec!["a1", "a2"]);

        engine
            .set_filter(Column::Name, FilterPredicate::Equals("ugc".into()))
            .unwrap();
        assert_eq!(ids(&engine.render(&data)), vec!["a3"]);
    }

    #[test]
    fn test_mismatched_predicate_is_rejected() {
        let mut engine = ViewTableEngine::new(ViewPreferences::default());
        assert!(engine.set_filter(Column::Name, FilterPredicate::Min(1.0)).is_err());
        assert!(engine.preferences().filters.is_empty());
    }

    #[test]
    fn test_pagination_and_reset_on_change() {
        let data = ads();
        let mut engine = ViewTableEngine::new(ViewPreferences {
            page_size: 2,
            ..ViewPreferences::default()
        });
        engine.set_page(3);
        let page = engine.render(&data);
        assert_eq!(page.page, 3);
        assert_eq!(page.total_pages, 3);
        assert_eq!(ids(&page), vec!["a4"]);
        assert!(!page.has_next());

        engine.set_filter(Column::Spend, FilterPredicate::Max(100.0)).unwrap();
        assert_eq!(engine.current_page(), 1);

        engine.set_page(2);
        engine.toggle_sort(Column::Spend).unwrap();
        assert_eq!(engine.current_page(), 1);
        assert_eq!(engine.preferences().sort_direction, SortDirection::Asc);
    }

    #[test]
    fn test_page_past_end_is_clamped() {
        let data = ads();
        let mut engine = ViewTableEngine::new(ViewPreferences {
            page_size: 2,
            ..ViewPreferences::default()
        });
        engine.set_page(9);
        assert_eq!(engine.render(&data).page, 3);
        assert_eq!(engine.render(&[]).page, 1);
    }

    #[test]
    fn test_preferences_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PreferenceStore::open(dir.path()));
        let mut engine = ViewTableEngine::load(store, 25);
        engine.set_sort(Column::Roas, SortDirection::Asc).unwrap();
        engine
            .set_filter(Column::Spend, FilterPredicate::Between { min: 10.0, max: 100.0 })
            .unwrap();
        engine.set_page_size(50).unwrap();

        let reopened = ViewTableEngine::load(Arc::new(PreferenceStore::open(dir.path())), 25);
        let prefs = reopened.preferences();
        assert_eq!(prefs.sort_key, Column::Roas);
        assert_eq!(prefs.sort_direction, SortDirection::Asc);
        assert_eq!(prefs.page_size, 50);
        assert_eq!(
            prefs.filters.get(&Column::Spend),
            Some(&FilterPredicate::Between { min: 10.0, max: 100.0 })
        );
        assert_eq!(reopened.current_page(), 1);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut engine = ViewTableEngine::new(ViewPreferences::default());
        assert!(engine.set_page_size(0).is_err());
    }
}
