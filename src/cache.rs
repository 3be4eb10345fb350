use std::collections::HashMap;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::models::ReportResult;
use crate::selector::ReportFilter;

/// Nothing expires on its own; writers must clear it after changing data.
#[derive(Debug, Default)]
pub struct ReportCache {
    entries: Mutex<HashMap<String, ReportResult>>,
}

pub fn filter_key(filter: &ReportFilter) -> String {
    hex::encode(Sha256::digest(filter.canonical().as_bytes()))
}

impl ReportCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filter: &ReportFilter) -> Option<ReportResult> {
        self.entries.lock().get(&filter_key(filter)).cloned()
    }

    pub fn insert(&self, filter: &ReportFilter, result: ReportResult) {
        self.entries.lock().insert(filter_key(filter), result);
    }

    pub fn invalidate(&self, filter: &ReportFilter) -> bool {
        self.entries.lock().remove(&filter_key(filter)).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Subject;
    use uuid::Uuid;

    #[test]
    fn keys_are_hex_sha256_and_filter_sensitive() {
        let base = ReportFilter::default();
        let math = ReportFilter {
            subject: Some(Subject::Matematica),
            ..ReportFilter::default()
        };
        assert_eq!(filter_key(&base).len(), 64);
        assert_eq!(filter_key(&base), filter_key(&ReportFilter::default()));
        assert_ne!(filter_key(&base), filter_key(&math));
    }

    #[test]
    fn invalidation_is_explicit() {
        let cache = ReportCache::new();
        let filter = ReportFilter {
            class_id: Some(Uuid::new_v4()),
            ..ReportFilter::default()
        };
        assert!(cache.get(&filter).is_none());

        cache.insert(&filter, ReportResult::default());
        cache.insert(&ReportFilter::default(), ReportResult::default());
        assert_eq!(cache.get(&filter), Some(ReportResult::default()));
        assert_eq!(cache.len(), 2);

        assert!(cache.invalidate(&filter));
        assert!(!cache.invalidate(&filter));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
