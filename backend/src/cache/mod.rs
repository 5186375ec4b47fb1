//! Cross-table cache - Reuse cleaned shared fields across tables
//!
//! The table that provides a shared field (e.g. `student_id`) stores every
//! cleaned value keyed by its raw text. Dependent tables look the raw value
//! up instead of re-deriving it. One cache lives for one pipeline invocation
//! and is passed by `&mut` into Clean; nothing is global.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// Hit/miss counters for one shared field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FieldStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

impl FieldStats {
    /// Hits over lookups (0.0 with no lookups)
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Run-scoped cache of cleaned shared-field values
#[derive(Debug, Default)]
pub struct CrossTableCache {
    /// field -> (raw value -> cleaned value)
    values: HashMap<String, HashMap<String, Value>>,
    stats: HashMap<String, FieldStats>,
}

impl CrossTableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the cleaned value of `raw` for `field`, counting a hit or miss.
    pub fn get(&mut self, field: &str, raw: &str) -> Option<Value> {
        let found = self.values.get(field).and_then(|m| m.get(raw)).cloned();
        let stats = self.stats.entry(field.to_string()).or_default();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        found
    }

    /// Store the cleaned value of `raw` for `field`; the latest value wins.
    pub fn insert(&mut self, field: &str, raw: &str, cleaned: Value) {
        let map = self.values.entry(field.to_string()).or_default();
        map.insert(raw.to_string(), cleaned);
        let entries = map.len();
        self.stats.entry(field.to_string()).or_default().entries = entries;
    }

    /// Cached value, or compute, store and return it.
    pub fn get_or_insert_with<F>(&mut self, field: &str, raw: &str, compute: F) -> Value
    where
        F: FnOnce() -> Value,
    {
        if let Some(value) = self.get(field, raw) {
            return value;
        }
        let value = compute();
        self.insert(field, raw, value.clone());
        value
    }

    /// Whether any value has been stored for `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.values.get(field).is_some_and(|m| !m.is_empty())
    }

    /// Counters for one field.
    pub fn field_stats(&self, field: &str) -> FieldStats {
        self.stats.get(field).copied().unwrap_or_default()
    }

    /// Counters for every field, sorted by field name.
    pub fn stats(&self) -> Vec<(String, FieldStats)> {
        let mut all: Vec<_> = self
            .stats
            .iter()
            .map(|(field, stats)| (field.clone(), *stats))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_get() {
        let mut cache = CrossTableCache::new();
        cache.insert("student_id", " s001 ", json!("S001"));

        assert_eq!(cache.get("student_id", " s001 "), Some(json!("S001")));
        assert_eq!(cache.get("student_id", "s002"), None);
        assert_eq!(cache.get("term_code", " s001 "), None);

        let stats = cache.field_stats("student_id");
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_get_or_insert_with_computes_once() {
        let mut cache = CrossTableCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            cache.get_or_insert_with("term_code", "2010t1", || {
                calls += 1;
                json!("2010T1")
            });
        }
        assert_eq!(calls, 1);
        let stats = cache.field_stats("term_code");
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[test]
    fn test_stats_sorted_by_field() {
        let mut cache = CrossTableCache::new();
        cache.insert("term_code", "a", Value::Null);
        cache.insert("student_id", "b", Value::Null);
        let fields: Vec<String> = cache.stats().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["student_id", "term_code"]);
        assert!(cache.has_field("term_code"));
        assert!(!cache.has_field("other"));
    }
}
