use super::cell::CellKey;
use std::collections::BTreeSet;

/// Keys of cells edited but not yet confirmed persisted.
#[derive(Debug, Default, Clone)]
pub struct PendingSet {
    keys: BTreeSet<CellKey>,
}

impl PendingSet {
    /// Inserts the key when the cell is modified, drops it when the edit
    /// restored the persisted value.
    pub fn track(&mut self, key: &CellKey, is_modified: bool) {
        if is_modified {
            if !self.keys.contains(key) {
                self.keys.insert(key.clone());
            }
        } else {
            self.keys.remove(key);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellKey> {
        self.keys.iter()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.keys.len();
        self.keys.clear();
        n
    }
}
