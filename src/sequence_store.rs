//! Process-wide sequence cursor table for `seq` / `wildcardseq` tags (spec §4.D).
//!
//! Modeled as an explicit handle rather than module-level global state (spec
//! §9 "Global sequence store"), so tests can hold an isolated instance. The
//! table itself is small and every operation is O(1), so a single coarse
//! lock is acceptable (spec §5) -- the same tradeoff this codebase makes for
//! its other small shared-state tables (see `mesh::stores`).

use std::collections::HashMap;

use parking_lot::RwLock;

/// Composite key identifying one sequence cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceKey {
    pub kind: &'static str,
    pub discriminant: String,
}

impl SequenceKey {
    pub fn seq(raw_data: &str) -> Self {
        SequenceKey {
            kind: "seq",
            discriminant: raw_data.to_string(),
        }
    }

    pub fn wildcard(canonical_name: &str, options_hash: u64) -> Self {
        SequenceKey {
            kind: "wc",
            discriminant: format!("{canonical_name}_{options_hash}"),
        }
    }
}

#[derive(Debug, Clone)]
struct SequenceCursor {
    values: Vec<String>,
    next_index: usize,
    just_ran: bool,
}

/// Process-wide (or test-local) keyed cursor table.
#[derive(Debug, Default)]
pub struct SequenceStore {
    cursors: RwLock<HashMap<SequenceKey, SequenceCursor>>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `values[next_index % len]` without advancing. Initializes the
    /// cursor from `values` on first use but does not set `just_ran`, so a
    /// pure length-estimation pass never marks a sequence as referenced by
    /// the current request -- `gc_stale` would otherwise never reclaim it.
    pub fn peek(&self, key: &SequenceKey, values: &[String]) -> Option<String> {
        if values.is_empty() {
            return None;
        }
        let mut guard = self.cursors.write();
        let cursor = guard.entry(key.clone()).or_insert_with(|| SequenceCursor {
            values: values.to_vec(),
            next_index: 0,
            just_ran: false,
        });
        Some(cursor.values[cursor.next_index % cursor.values.len()].clone())
    }

    /// Returns `values[next_index]`, advances the cursor, and marks it as
    /// referenced by the current request.
    pub fn advance(&self, key: &SequenceKey, values: &[String]) -> Option<String> {
        if values.is_empty() {
            return None;
        }
        let mut guard = self.cursors.write();
        let cursor = guard.entry(key.clone()).or_insert_with(|| SequenceCursor {
            values: values.to_vec(),
            next_index: 0,
            just_ran: false,
        });
        let idx = cursor.next_index % cursor.values.len();
        let result = cursor.values[idx].clone();
        cursor.next_index = (idx + 1) % cursor.values.len();
        cursor.just_ran = true;
        Some(result)
    }

    /// Called at the start of `preparse_prompts()`: clears every cursor's
    /// `just_ran` flag so staleness tracking restarts for this request.
    pub fn clear_ran_flags(&self) {
        let mut guard = self.cursors.write();
        for cursor in guard.values_mut() {
            cursor.just_ran = false;
        }
    }

    /// Called at the end of `preparse_prompts()`: drops every cursor that
    /// wasn't referenced by the request just processed.
    pub fn gc_stale(&self) {
        let mut guard = self.cursors.write();
        guard.retain(|_, cursor| cursor.just_ran);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.cursors.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_wraps_around() {
        let store = SequenceStore::new();
        let key = SequenceKey::seq("a|b|c");
        let values = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(store.advance(&key, &values), Some("a".to_string()));
        assert_eq!(store.advance(&key, &values), Some("b".to_string()));
        assert_eq!(store.advance(&key, &values), Some("c".to_string()));
        assert_eq!(store.advance(&key, &values), Some("a".to_string()));
    }

    #[test]
    fn peek_does_not_advance() {
        let store = SequenceStore::new();
        let key = SequenceKey::seq("a|b");
        let values = vec!["a".to_string(), "b".to_string()];
        assert_eq!(store.peek(&key, &values), Some("a".to_string()));
        assert_eq!(store.peek(&key, &values), Some("a".to_string()));
        assert_eq!(store.advance(&key, &values), Some("a".to_string()));
    }

    #[test]
    fn gc_drops_unreferenced_entries() {
        let store = SequenceStore::new();
        let key = SequenceKey::seq("a|b");
        let values = vec!["a".to_string(), "b".to_string()];
        store.clear_ran_flags();
        store.advance(&key, &values);
        assert_eq!(store.len(), 1);

        // second request never references the key
        store.clear_ran_flags();
        store.gc_stale();
        assert_eq!(store.len(), 0);
    }
}
