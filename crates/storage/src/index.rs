use std::collections::HashMap;
use std::hash::Hash;

/// Secondary index: maps an extracted key to the group of primary keys
/// that share it. Kept in sync by whoever mutates the origin table.
pub struct Index<K, R> {
    map: HashMap<K, Vec<R>>,
}

impl<K: Eq + Hash, R: PartialEq> Index<K, R> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn insert(&mut self, key: K, reference: R) {
        self.map.entry(key).or_insert_with(Vec::new).push(reference);
    }

    pub fn group(&self, key: &K) -> &[R] {
        self.map.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn remove(&mut self, key: &K, reference: &R) {
        if let Some(group) = self.map.get_mut(key) {
            group.retain(|r| r != reference);
            if group.is_empty() {
                self.map.remove(key);
            }
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<K: Eq + Hash, R: PartialEq> Default for Index<K, R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_by_key() {
        let mut index: Index<&str, u64> = Index::new();
        index.insert("alice", 1);
        index.insert("alice", 2);
        index.insert("bob", 3);

        assert_eq!(index.group(&"alice"), &[1, 2]);
        assert_eq!(index.group(&"bob"), &[3]);
        assert_eq!(index.group(&"carol"), &[] as &[u64]);
    }

    #[test]
    fn remove_drops_empty_group() {
        let mut index: Index<&str, u64> = Index::new();
        index.insert("alice", 1);

        index.remove(&"alice", &1);

        assert_eq!(index.group(&"alice"), &[] as &[u64]);
    }
}
