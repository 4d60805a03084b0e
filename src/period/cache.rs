use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::types::{PeriodDataset, WindowKey};

/// Owned cache of loaded windows. Injected into the loader; replaced entries
/// are dropped wholesale, never patched.
#[derive(Default)]
pub struct WindowCache {
    entries: Mutex<HashMap<WindowKey, Arc<PeriodDataset>>>,
}

impl WindowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, window: &WindowKey) -> Option<Arc<PeriodDataset>> {
        self.lock().get(window).cloned()
    }

    pub fn set(&self, dataset: Arc<PeriodDataset>) {
        self.lock().insert(dataset.window.clone(), dataset);
    }

    pub fn invalidate(&self, window: &WindowKey) -> bool {
        self.lock().remove(window).is_some()
    }

    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    pub fn contains(&self, window: &WindowKey) -> bool {
        self.lock().contains_key(window)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<WindowKey, Arc<PeriodDataset>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
