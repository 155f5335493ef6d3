//! The per-connection HPACK dynamic table (RFC 7541 §2.3.2, §4): a bounded
//! FIFO of recently-seen header fields, indexed starting just past the
//! static table.

use std::collections::VecDeque;

/// Per RFC 7541 §4.1: an entry's size is its name and value octet lengths
/// plus 32 bytes of accounting overhead.
fn entry_size(name: &str, value: &str) -> usize {
    name.len() + value.len() + 32
}

pub struct DynamicTable {
    entries: VecDeque<(String, String)>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    pub fn new(max_size: usize) -> DynamicTable {
        DynamicTable {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a new entry at the front, evicting from the back until the
    /// table fits within `max_size`. An entry larger than `max_size` on its
    /// own empties the table entirely (RFC 7541 §4.4).
    pub fn insert(&mut self, name: String, value: String) {
        let added = entry_size(&name, &value);
        self.entries.push_front((name, value));
        self.size += added;
        self.evict_to_fit();
    }

    /// Change the negotiated maximum size, evicting if the new size is smaller.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_to_fit();
    }

    fn evict_to_fit(&mut self) {
        while self.size > self.max_size {
            match self.entries.pop_back() {
                Some((name, value)) => self.size -= entry_size(&name, &value),
                None => break,
            }
        }
    }

    /// Look up a dynamic-table index (1-based, counted from the most
    /// recently inserted entry).
    pub fn get(&self, index: usize) -> Option<(&str, &str)> {
        self.entries
            .get(index.checked_sub(1)?)
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn find_exact(&self, name: &str, value: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, v)| n == name && v == value)
            .map(|i| i + 1)
    }

    pub fn find_name(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(n, _)| n == name).map(|i| i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_and_looks_up_most_recent_first() {
        let mut table = DynamicTable::new(4096);
        table.insert("custom-header".to_string(), "value-1".to_string());
        table.insert("custom-header".to_string(), "value-2".to_string());
        assert_eq!(table.get(1), Some(("custom-header", "value-2")));
        assert_eq!(table.get(2), Some(("custom-header", "value-1")));
    }

    #[test]
    fn evicts_oldest_entries_when_over_budget() {
        let mut table = DynamicTable::new(entry_size("a", "1") + entry_size("b", "2"));
        table.insert("a".to_string(), "1".to_string());
        table.insert("b".to_string(), "2".to_string());
        assert_eq!(table.len(), 2);
        table.insert("c".to_string(), "3".to_string());
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some(("c", "3")));
        assert_eq!(table.get(2), Some(("b", "2")));
    }

    #[test]
    fn shrinking_max_size_evicts() {
        let mut table = DynamicTable::new(4096);
        table.insert("a".to_string(), "1".to_string());
        table.insert("b".to_string(), "2".to_string());
        table.set_max_size(entry_size("b", "2"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(1), Some(("b", "2")));
    }
}
