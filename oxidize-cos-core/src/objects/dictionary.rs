use crate::objects::{Array, Name, Object, PdfString, Stream};
use crate::update::{
    link_child, unlink_child, Container, ContainerId, UpdateEvent, UpdateKind, UpdateObserver,
    UpdateState,
};
use indexmap::IndexMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// How [`Dictionary::merge`] treats keys present on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// Entries from the merged dictionary replace existing ones.
    #[default]
    Overwrite,
    /// As `Overwrite`, except an existing `/Size` is kept. Used when
    /// assembling the trailer of linearized or incrementally updated files,
    /// where the first trailer read carries the authoritative size.
    KeepFirstSize,
}

/// An insertion-ordered mapping from names to values.
///
/// `Dictionary` is a handle: clones share the same entries. Mutations
/// through any handle notify the observers registered on the dictionary.
/// Concurrent mutation from several threads is memory safe but the
/// resulting entry order is unspecified; callers editing one dictionary
/// from several threads must serialize those edits themselves.
#[derive(Clone)]
pub struct Dictionary(Arc<DictionaryInner>);

struct DictionaryInner {
    entries: RwLock<IndexMap<Name, Object>>,
    state: UpdateState,
}

pub(crate) struct WeakDictionary(Weak<DictionaryInner>);

impl WeakDictionary {
    pub(crate) fn upgrade(&self) -> Option<Dictionary> {
        self.0.upgrade().map(Dictionary)
    }
}

impl Dictionary {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Dictionary(Arc::new(DictionaryInner {
            entries: RwLock::new(IndexMap::with_capacity(capacity)),
            state: UpdateState::new(),
        }))
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<Name, Object>> {
        self.0.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<Name, Object>> {
        self.0.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn as_container(&self) -> Container {
        Container::Dictionary(self.clone())
    }

    fn notify(&self, kind: UpdateKind) {
        self.0
            .state
            .notify(&UpdateEvent::new(kind, self.as_container()));
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    /// The stored value, references left unresolved.
    pub fn get(&self, key: &str) -> Option<Object> {
        self.read().get(key).cloned()
    }

    /// The stored value with references resolved. Null values and dangling
    /// references read as absent.
    pub fn get_dereferenced(&self, key: &str) -> Option<Object> {
        let value = self.get(key)?.dereference();
        (!value.is_null()).then_some(value)
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set(&self, key: impl Into<Name>, value: impl Into<Object>) {
        let key = key.into();
        let value = value.into();
        let previous = self.write().insert(key, value.clone());
        if let Some(previous) = previous {
            unlink_child(self.id(), &previous);
        }
        link_child(&self.as_container(), &value);
        self.notify(UpdateKind::EntriesAdded(vec![value]));
    }

    /// Store `value`, or remove `key` when `value` is `None`.
    pub fn set_option<V: Into<Object>>(&self, key: impl Into<Name>, value: Option<V>) {
        match value {
            Some(value) => self.set(key, value),
            None => {
                let key = key.into();
                self.remove(key.as_str());
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<Object> {
        let removed = self.write().shift_remove(key)?;
        unlink_child(self.id(), &removed);
        self.notify(UpdateKind::Updated);
        Some(removed)
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.write());
        for value in removed.values() {
            unlink_child(self.id(), value);
        }
        self.notify(UpdateKind::EntriesAdded(Vec::new()));
    }

    /// Copy every entry of `other` into this dictionary.
    pub fn merge(&self, other: &Dictionary, policy: MergePolicy) {
        if self.ptr_eq(other) {
            return;
        }
        let incoming = other.entries();
        let parent = self.as_container();
        let mut added = Vec::with_capacity(incoming.len());
        let mut replaced = Vec::new();
        {
            let mut entries = self.write();
            for (key, value) in incoming {
                if policy == MergePolicy::KeepFirstSize
                    && key.as_str() == "Size"
                    && entries.contains_key("Size")
                {
                    continue;
                }
                if let Some(previous) = entries.insert(key, value.clone()) {
                    replaced.push(previous);
                }
                added.push(value);
            }
        }
        for previous in &replaced {
            unlink_child(parent.id(), previous);
        }
        for value in &added {
            link_child(&parent, value);
        }
        if !added.is_empty() {
            self.notify(UpdateKind::EntriesAdded(added));
        }
    }

    /// Snapshot of the keys in insertion order.
    pub fn keys(&self) -> Vec<Name> {
        self.read().keys().cloned().collect()
    }

    /// Snapshot of the values in insertion order.
    pub fn values(&self) -> Vec<Object> {
        self.read().values().cloned().collect()
    }

    /// Snapshot of the entries in insertion order.
    pub fn entries(&self) -> Vec<(Name, Object)> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn iter(&self) -> std::vec::IntoIter<(Name, Object)> {
        self.entries().into_iter()
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get_dereferenced(key) {
            Some(Object::Integer(i)) => i,
            Some(Object::Real(r)) => r.value() as i64,
            _ => default,
        }
    }

    pub fn get_float(&self, key: &str, default: f32) -> f32 {
        self.get_dereferenced(key)
            .and_then(|v| v.as_real())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_dereferenced(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    pub fn get_name(&self, key: &str) -> Option<Name> {
        match self.get_dereferenced(key)? {
            Object::Name(name) => Some(name),
            _ => None,
        }
    }

    pub fn get_name_or(&self, key: &str, default: &str) -> Name {
        self.get_name(key).unwrap_or_else(|| Name::new(default))
    }

    pub fn get_string(&self, key: &str) -> Option<PdfString> {
        match self.get_dereferenced(key)? {
            Object::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text of a string entry, or `default`.
    pub fn get_text(&self, key: &str, default: &str) -> String {
        self.get_string(key)
            .map(|s| s.to_text())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_dictionary(&self, key: &str) -> Option<Dictionary> {
        match self.get_dereferenced(key)? {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    pub fn get_array(&self, key: &str) -> Option<Array> {
        match self.get_dereferenced(key)? {
            Object::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn get_stream(&self, key: &str) -> Option<Stream> {
        match self.get_dereferenced(key)? {
            Object::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this dictionary is written inline even if it has a key.
    pub fn is_direct(&self) -> bool {
        self.0.state.is_direct()
    }

    pub fn set_direct(&self, direct: bool) {
        self.0.state.store_direct(direct);
        self.notify(UpdateKind::DirectChanged(direct));
    }

    pub fn update_state(&self) -> &UpdateState {
        &self.0.state
    }

    pub fn register_observer(&self, observer: Arc<dyn UpdateObserver>) {
        self.0.state.register(observer);
    }

    pub fn unregister_observer(&self, observer: &Arc<dyn UpdateObserver>) -> bool {
        self.0.state.unregister(observer)
    }

    /// Report a change made outside the entry map, such as new stream data.
    pub fn report_update(&self) {
        self.notify(UpdateKind::Updated);
    }

    /// Whether any observer flags this dictionary for rewriting.
    pub fn needs_update(&self) -> bool {
        self.0.state.needs_update()
    }

    pub fn id(&self) -> ContainerId {
        ContainerId::of(&self.0)
    }

    /// Whether both handles refer to the same dictionary.
    pub fn ptr_eq(&self, other: &Dictionary) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakDictionary {
        WeakDictionary(Arc::downgrade(&self.0))
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Dictionary {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let theirs = other.entries();
        let ours = self.read();
        ours.len() == theirs.len()
            && theirs
                .iter()
                .all(|(key, value)| ours.get(key.as_str()) == Some(value))
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.entries()).finish()
    }
}

impl<K: Into<Name>, V: Into<Object>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let dict = Dictionary::new();
        for (key, value) in iter {
            dict.set(key, value);
        }
        dict
    }
}
