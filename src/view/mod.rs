pub mod prefs;
pub mod table;
pub mod types;

pub use prefs::PreferenceStore;
pub use table::{ViewTableEngine, VIEW_PREFERENCES_KEY};
pub use types::{Column, FilterPredicate, SortDirection, TablePage, ViewPreferences};
