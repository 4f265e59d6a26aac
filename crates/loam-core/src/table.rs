//! Open-addressed hash table keyed by interned-string identity.
//!
//! Used for the global environment, the const-global set, and the
//! string-intern table itself. Linear probing with tombstones: deleting
//! leaves a marker so probe chains stay intact, and inserts reclaim the
//! first tombstone seen on their probe path.
//!
//! Because keys are interned strings, equal handles imply equal bytes, so
//! bucket comparison is handle identity. The string arena is passed into
//! each operation to reach the precomputed hashes (and, for
//! [`Table::find_string`], the bytes); the table itself stores only
//! handles.

use crate::object::{ObjString, StringId};
use crate::value::Value;

/// Load factor ceiling; exceeding it doubles the capacity.
const MAX_LOAD: f64 = 0.75;

/// A bucket.
///
/// Three states: empty (`key: None, value: Null`), tombstone
/// (`key: None, value: Bool(true)`), live (`key: Some(..)`).
#[derive(Clone, Copy, Debug)]
struct Entry {
    key: Option<StringId>,
    value: Value,
}

impl Entry {
    const EMPTY: Entry = Entry {
        key: None,
        value: Value::Null,
    };

    const TOMBSTONE: Entry = Entry {
        key: None,
        value: Value::Bool(true),
    };

    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !matches!(self.value, Value::Null)
    }
}

/// The hash table.
///
/// # Example
///
/// ```
/// use loam_core::{Heap, Table, Value};
///
/// let mut heap = Heap::new();
/// let key = heap.copy_string("answer");
///
/// let mut table = Table::new();
/// assert!(table.set(heap.strings(), key, Value::Number(42.0)));
/// assert_eq!(table.get(heap.strings(), key), Some(Value::Number(42.0)));
/// assert!(table.delete(heap.strings(), key));
/// assert_eq!(table.get(heap.strings(), key), None);
/// ```
#[derive(Debug, Default)]
pub struct Table {
    /// Live entries plus tombstones; the growth trigger counts both so a
    /// probe chain can never wrap without hitting an empty bucket.
    count: usize,
    entries: Vec<Entry>,
}

impl Table {
    /// Creates an empty table. No allocation happens until the first
    /// insert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bucket capacity.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Looks up the value bound to `key`.
    pub fn get(&self, strings: &[ObjString], key: StringId) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let entry = &self.entries[self.find_slot(strings, key)];
        entry.key.map(|_| entry.value)
    }

    /// Binds `key` to `value`. Returns true when the key was newly
    /// inserted (including insertion into a reclaimed tombstone).
    pub fn set(&mut self, strings: &[ObjString], key: StringId, value: Value) -> bool {
        if self.count as f64 >= self.entries.len() as f64 * MAX_LOAD {
            self.grow(strings);
        }

        let slot = self.find_slot(strings, key);
        let entry = &mut self.entries[slot];
        let is_new_key = entry.key.is_none();
        // Tombstones already participate in the count; only a genuinely
        // empty bucket adds to it.
        if is_new_key && !entry.is_tombstone() {
            self.count += 1;
        }

        entry.key = Some(key);
        entry.value = value;
        is_new_key
    }

    /// Removes `key`, leaving a tombstone. Returns true if it was
    /// present.
    pub fn delete(&mut self, strings: &[ObjString], key: StringId) -> bool {
        if self.count == 0 {
            return false;
        }

        let slot = self.find_slot(strings, key);
        if self.entries[slot].key.is_none() {
            return false;
        }

        self.entries[slot] = Entry::TOMBSTONE;
        true
    }

    /// Copies every live entry of `other` into this table.
    pub fn add_all(&mut self, strings: &[ObjString], other: &Table) {
        for entry in &other.entries {
            if let Some(key) = entry.key {
                self.set(strings, key, entry.value);
            }
        }
    }

    /// Intern lookup: finds an existing string with these bytes without
    /// needing a handle. Walks the probe chain comparing hash, length,
    /// then bytes.
    pub fn find_string(&self, strings: &[ObjString], chars: &str, hash: u32) -> Option<StringId> {
        if self.count == 0 {
            return None;
        }

        let capacity = self.entries.len();
        let mut index = hash as usize % capacity;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    // Stop at a truly empty bucket; step over tombstones.
                    if !entry.is_tombstone() {
                        return None;
                    }
                }
                Some(key) => {
                    let interned = &strings[key.index()];
                    if interned.hash == hash
                        && interned.chars.len() == chars.len()
                        && &*interned.chars == chars
                    {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) % capacity;
        }
    }

    /// Iterates over live `(key, value)` pairs in bucket order.
    pub fn iter_entries(&self) -> impl Iterator<Item = (StringId, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|entry| entry.key.map(|key| (key, entry.value)))
    }

    /// Finds the bucket for `key`: either its live entry, or the first
    /// reusable bucket on its probe chain (preferring a tombstone over
    /// the terminating empty bucket).
    fn find_slot(&self, strings: &[ObjString], key: StringId) -> usize {
        let capacity = self.entries.len();
        let mut index = strings[key.index()].hash as usize % capacity;
        let mut tombstone: Option<usize> = None;

        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    if entry.is_tombstone() {
                        if tombstone.is_none() {
                            tombstone = Some(index);
                        }
                    } else {
                        return tombstone.unwrap_or(index);
                    }
                }
                Some(existing) if existing == key => return index,
                Some(_) => {}
            }
            index = (index + 1) % capacity;
        }
    }

    /// Doubles the capacity (0 becomes 8) and rehashes live entries.
    /// Tombstones are dropped, so the count is rebuilt from live entries.
    fn grow(&mut self, strings: &[ObjString]) {
        let new_capacity = if self.entries.len() < 8 {
            8
        } else {
            self.entries.len() * 2
        };

        let old_entries = std::mem::replace(&mut self.entries, vec![Entry::EMPTY; new_capacity]);
        self.count = 0;

        for entry in old_entries {
            if let Some(key) = entry.key {
                let slot = self.find_slot(strings, key);
                self.entries[slot] = entry;
                self.count += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Heap;

    fn heap_with_keys(n: usize) -> (Heap, Vec<StringId>) {
        let mut heap = Heap::new();
        let keys = (0..n).map(|i| heap.copy_string(&format!("key{i}"))).collect();
        (heap, keys)
    }

    #[test]
    fn test_set_then_get() {
        let (heap, keys) = heap_with_keys(1);
        let mut table = Table::new();
        assert!(table.set(heap.strings(), keys[0], Value::Number(1.0)));
        assert_eq!(table.get(heap.strings(), keys[0]), Some(Value::Number(1.0)));
    }

    #[test]
    fn test_set_overwrites() {
        let (heap, keys) = heap_with_keys(1);
        let mut table = Table::new();
        assert!(table.set(heap.strings(), keys[0], Value::Number(1.0)));
        assert!(!table.set(heap.strings(), keys[0], Value::Number(2.0)));
        assert_eq!(table.get(heap.strings(), keys[0]), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_get_missing() {
        let (heap, keys) = heap_with_keys(2);
        let mut table = Table::new();
        table.set(heap.strings(), keys[0], Value::Null);
        assert_eq!(table.get(heap.strings(), keys[1]), None);
    }

    #[test]
    fn test_delete_then_get() {
        let (heap, keys) = heap_with_keys(1);
        let mut table = Table::new();
        table.set(heap.strings(), keys[0], Value::Bool(true));
        assert!(table.delete(heap.strings(), keys[0]));
        assert_eq!(table.get(heap.strings(), keys[0]), None);
        assert!(!table.delete(heap.strings(), keys[0]));
    }

    #[test]
    fn test_delete_on_empty_table() {
        let (heap, keys) = heap_with_keys(1);
        let mut table = Table::new();
        assert!(!table.delete(heap.strings(), keys[0]));
    }

    #[test]
    fn test_tombstone_keeps_probe_chain() {
        // Fill enough keys that some share probe chains, then delete one
        // and confirm every other key is still reachable.
        let (heap, keys) = heap_with_keys(32);
        let mut table = Table::new();
        for (i, &key) in keys.iter().enumerate() {
            table.set(heap.strings(), key, Value::Number(i as f64));
        }
        assert!(table.delete(heap.strings(), keys[7]));
        for (i, &key) in keys.iter().enumerate() {
            if i == 7 {
                assert_eq!(table.get(heap.strings(), key), None);
            } else {
                assert_eq!(table.get(heap.strings(), key), Some(Value::Number(i as f64)));
            }
        }
    }

    #[test]
    fn test_tombstone_reuse_reports_new_key() {
        let (heap, keys) = heap_with_keys(1);
        let mut table = Table::new();
        table.set(heap.strings(), keys[0], Value::Number(1.0));
        table.delete(heap.strings(), keys[0]);
        // Reinsert lands in the tombstone and is reported as new.
        assert!(table.set(heap.strings(), keys[0], Value::Number(2.0)));
        assert_eq!(table.get(heap.strings(), keys[0]), Some(Value::Number(2.0)));
    }

    #[test]
    fn test_growth_preserves_entries() {
        let (heap, keys) = heap_with_keys(100);
        let mut table = Table::new();
        for (i, &key) in keys.iter().enumerate() {
            table.set(heap.strings(), key, Value::Number(i as f64));
        }
        assert!(table.capacity() >= 100);
        for (i, &key) in keys.iter().enumerate() {
            assert_eq!(table.get(heap.strings(), key), Some(Value::Number(i as f64)));
        }
    }

    #[test]
    fn test_initial_growth_is_eight() {
        let (heap, keys) = heap_with_keys(1);
        let mut table = Table::new();
        assert_eq!(table.capacity(), 0);
        table.set(heap.strings(), keys[0], Value::Null);
        assert_eq!(table.capacity(), 8);
    }

    #[test]
    fn test_add_all() {
        let (heap, keys) = heap_with_keys(3);
        let mut from = Table::new();
        for (i, &key) in keys.iter().enumerate() {
            from.set(heap.strings(), key, Value::Number(i as f64));
        }
        let mut to = Table::new();
        to.add_all(heap.strings(), &from);
        for (i, &key) in keys.iter().enumerate() {
            assert_eq!(to.get(heap.strings(), key), Some(Value::Number(i as f64)));
        }
    }

    #[test]
    fn test_find_string_by_bytes() {
        let mut heap = Heap::new();
        let id = heap.copy_string("needle");
        // The heap's intern table is itself a Table; search it.
        let hash = crate::object::hash_string("needle");
        assert_eq!(
            heap.interned().find_string(heap.strings(), "needle", hash),
            Some(id)
        );
        let missing_hash = crate::object::hash_string("missing");
        assert_eq!(
            heap.interned().find_string(heap.strings(), "missing", missing_hash),
            None
        );
    }

    #[test]
    fn test_iter_entries_skips_dead_buckets() {
        let (heap, keys) = heap_with_keys(4);
        let mut table = Table::new();
        for &key in &keys {
            table.set(heap.strings(), key, Value::Bool(true));
        }
        table.delete(heap.strings(), keys[2]);
        let live: Vec<_> = table.iter_entries().map(|(k, _)| k).collect();
        assert_eq!(live.len(), 3);
        assert!(!live.contains(&keys[2]));
    }
}
