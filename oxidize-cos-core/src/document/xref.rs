//! Cross-reference table

use crate::config::XrefMergePolicy;
use crate::objects::ObjectKey;
use std::collections::BTreeMap;

/// Location of an indirect object in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum XrefEntry {
    /// Uncompressed object at a byte offset
    InUse { offset: u64 },
    /// Object stored in an object stream
    Compressed { stream_number: u64, index: u32 },
    /// Free object
    Free,
}

impl XrefEntry {
    pub fn is_free(&self) -> bool {
        matches!(self, XrefEntry::Free)
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            XrefEntry::InUse { offset } => Some(*offset),
            _ => None,
        }
    }
}

/// Cross-reference entries ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XrefTable {
    entries: BTreeMap<ObjectKey, XrefEntry>,
}

impl XrefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, replacing any existing one. Keys of compressed
    /// entries are annotated with their index in the object stream.
    pub fn insert(&mut self, key: ObjectKey, entry: XrefEntry) -> Option<XrefEntry> {
        let key = match entry {
            XrefEntry::Compressed { index, .. } => key.with_stream_index(index),
            _ => key,
        };
        // Remove first so the stored key carries the new annotation.
        let previous = self.entries.remove(&key);
        self.entries.insert(key, entry);
        previous
    }

    pub fn get(&self, key: ObjectKey) -> Option<XrefEntry> {
        self.entries.get(&key).copied()
    }

    /// The stored key, including its object stream index.
    pub fn stored_key(&self, key: ObjectKey) -> Option<ObjectKey> {
        self.entries.get_key_value(&key).map(|(k, _)| *k)
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectKey, XrefEntry)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, *v))
    }

    pub fn highest_object_number(&self) -> Option<u64> {
        self.entries.keys().next_back().map(ObjectKey::number)
    }

    /// Merge `entries` under `policy`. Returns the keys whose existing
    /// entry was replaced.
    pub fn merge(
        &mut self,
        entries: impl IntoIterator<Item = (ObjectKey, XrefEntry)>,
        policy: XrefMergePolicy,
    ) -> Vec<ObjectKey> {
        let mut replaced = Vec::new();
        for (key, entry) in entries {
            match (self.get(key), policy) {
                (Some(_), XrefMergePolicy::KeepExisting) => {}
                (Some(existing), XrefMergePolicy::Overwrite) => {
                    if existing != entry {
                        replaced.push(key);
                    }
                    self.insert(key, entry);
                }
                (None, _) => {
                    self.insert(key, entry);
                }
            }
        }
        replaced
    }
}

impl FromIterator<(ObjectKey, XrefEntry)> for XrefTable {
    fn from_iter<I: IntoIterator<Item = (ObjectKey, XrefEntry)>>(iter: I) -> Self {
        let mut table = XrefTable::new();
        for (key, entry) in iter {
            table.insert(key, entry);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u64, g: u32) -> ObjectKey {
        ObjectKey::from_parts(n, g)
    }

    #[test]
    fn test_insert_and_get() {
        let mut table = XrefTable::new();
        assert!(table.insert(key(5, 0), XrefEntry::InUse { offset: 120 }).is_none());

        assert_eq!(table.get(key(5, 0)), Some(XrefEntry::InUse { offset: 120 }));
        assert_eq!(table.get(key(5, 0)).and_then(|e| e.offset()), Some(120));
        assert_eq!(table.get(key(5, 1)), None);
    }

    #[test]
    fn test_compressed_entry_annotates_key() {
        let mut table = XrefTable::new();
        table.insert(
            key(12, 0),
            XrefEntry::Compressed {
                stream_number: 3,
                index: 7,
            },
        );

        let stored = table.stored_key(key(12, 0)).unwrap();
        assert_eq!(stored.stream_index(), Some(7));
    }

    #[test]
    fn test_merge_overwrite() {
        let mut table: XrefTable = [(key(1, 0), XrefEntry::InUse { offset: 10 })]
            .into_iter()
            .collect();

        let replaced = table.merge(
            [
                (key(1, 0), XrefEntry::InUse { offset: 900 }),
                (key(2, 0), XrefEntry::InUse { offset: 20 }),
            ],
            XrefMergePolicy::Overwrite,
        );

        assert_eq!(replaced, vec![key(1, 0)]);
        assert_eq!(table.get(key(1, 0)).and_then(|e| e.offset()), Some(900));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_merge_keep_existing() {
        let mut table: XrefTable = [(key(1, 0), XrefEntry::InUse { offset: 10 })]
            .into_iter()
            .collect();

        let replaced = table.merge(
            [(key(1, 0), XrefEntry::Free), (key(4, 0), XrefEntry::Free)],
            XrefMergePolicy::KeepExisting,
        );

        assert!(replaced.is_empty());
        assert_eq!(table.get(key(1, 0)).and_then(|e| e.offset()), Some(10));
        assert!(table.get(key(4, 0)).unwrap().is_free());
    }

    #[test]
    fn test_highest_object_number() {
        let table: XrefTable = [
            (key(3, 0), XrefEntry::Free),
            (key(17, 2), XrefEntry::InUse { offset: 1 }),
            (key(9, 0), XrefEntry::InUse { offset: 2 }),
        ]
        .into_iter()
        .collect();

        assert_eq!(table.highest_object_number(), Some(17));
        assert_eq!(XrefTable::new().highest_object_number(), None);
    }
}
