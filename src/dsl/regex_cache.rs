//! Compiled patterns for the `~` and `!~` operators.

use regex::Regex;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use super::error::{FilterError, Result};

/// Patterns past this many distinct entries are compiled but not kept.
const MAX_ENTRIES: usize = 1024;

/// Anchored regexes keyed by the pattern as written in the filter.
#[derive(Debug, Default)]
pub(crate) struct RegexCache {
    entries: RwLock<HashMap<String, Regex>>,
}

impl RegexCache {
    /// Return the compiled `^(?:pattern)`, compiling it on first use.
    /// Invalid patterns are not cached.
    pub(crate) fn get_or_compile(&self, pattern: &str) -> Result<Regex> {
        if let Some(regex) = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(pattern)
        {
            return Ok(regex.clone());
        }

        let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(|e| {
            FilterError::InvalidRegex {
                pattern: pattern.to_string(),
                message: e.to_string(),
            }
        })?;

        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if entries.len() < MAX_ENTRIES {
            entries
                .entry(pattern.to_string())
                .or_insert_with(|| regex.clone());
        }
        Ok(regex)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, pattern: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(pattern)
    }
}

pub(crate) fn regex_cache() -> &'static RegexCache {
    static CACHE: OnceLock<RegexCache> = OnceLock::new();
    CACHE.get_or_init(RegexCache::default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiles_once_and_anchors() {
        let cache = RegexCache::default();
        let first = cache.get_or_compile("(web|db)-[0-9]+").unwrap();
        assert!(cache.contains("(web|db)-[0-9]+"));
        let second = cache.get_or_compile("(web|db)-[0-9]+").unwrap();
        assert_eq!(first.as_str(), second.as_str());
        assert_eq!(first.as_str(), "^(?:(web|db)-[0-9]+)");
        assert!(first.is_match("web-12"));
        assert!(!first.is_match("x-web-12"));
    }

    #[test]
    fn test_invalid_pattern_is_not_cached() {
        let cache = RegexCache::default();
        let err = cache.get_or_compile("[unclosed").unwrap_err();
        assert!(matches!(err, FilterError::InvalidRegex { .. }));
        assert!(!cache.contains("[unclosed"));
    }
}
