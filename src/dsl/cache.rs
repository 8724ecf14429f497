//! Process-wide cache of parsed filters.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use super::error::Result;
use super::filter::Filter;

/// Parsed filters keyed by their source text.
///
/// Lookups take a read lock; a miss parses outside any lock and then inserts
/// only if no other thread got there first.
#[derive(Debug, Default)]
pub struct FilterCache {
    entries: RwLock<HashMap<String, Arc<Filter>>>,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached filter for `source`, parsing it on first use.
    /// Parse failures are not cached.
    pub fn get_or_parse(&self, source: &str) -> Result<Arc<Filter>> {
        if let Some(filter) = self.read().get(source) {
            return Ok(Arc::clone(filter));
        }

        let parsed = Arc::new(Filter::parse(source)?);
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = entries.entry(source.to_string()).or_insert(parsed);
        Ok(Arc::clone(entry))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<Filter>>> {
        // Entries are only ever inserted whole, so a poisoned map is still usable
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The cache shared by [`match_record`]. Built on first use and kept for the
/// life of the process.
pub fn global_cache() -> &'static FilterCache {
    static CACHE: OnceLock<FilterCache> = OnceLock::new();
    CACHE.get_or_init(FilterCache::new)
}

/// Parse `filter` (through the global cache) and evaluate it against `record`.
pub fn match_record(filter: &str, record: &Value) -> Result<bool> {
    global_cache().get_or_parse(filter)?.matches(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_or_parse_reuses_entry() {
        let cache = FilterCache::new();
        let first = cache.get_or_parse("name=a").unwrap();
        let second = cache.get_or_parse("name=a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_parse_errors_not_cached() {
        let cache = FilterCache::new();
        assert!(cache.get_or_parse("name=").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_agree() {
        let cache = Arc::new(FilterCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_parse("zone:(a b)").unwrap())
            })
            .collect();
        let filters: Vec<Arc<Filter>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(cache.len(), 1);
        for filter in &filters {
            assert!(Arc::ptr_eq(filter, &filters[0]));
        }
    }

    #[test]
    fn test_match_record() {
        assert!(match_record("key=value", &json!({"key": "value"})).unwrap());
        assert!(!match_record("key=value", &json!({"key": "other"})).unwrap());
        assert!(match_record("- key:*", &json!({})).unwrap());
    }
}
