//! Document-wide object pool
//!
//! A [`CosDocument`] owns one [`Proxy`] per object key, the cross-reference
//! table, the trailer and the change tracker used for incremental saves.
//! It is the only place proxies are created, which keeps a single proxy per
//! key no matter how many threads ask for it.

mod xref;

pub use xref::{XrefEntry, XrefTable};

use crate::config::DocumentOptions;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, MergePolicy, Object, ObjectKey, Proxy};
use crate::source::ObjectSource;
use crate::update::{ChangeTracker, Container};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of proxies in the pool
    pub proxies: usize,
    /// Number of proxies holding a resolved value
    pub resolved: usize,
    /// Number of cross-reference entries
    pub xref_entries: usize,
    /// Number of objects flagged for rewriting
    pub dirty: usize,
}

/// The object pool of one PDF document.
///
/// `CosDocument` is a handle; clones refer to the same pool. Dropping the
/// last handle empties every proxy, so proxies held elsewhere read as null
/// afterwards.
#[derive(Clone)]
pub struct CosDocument {
    shared: Arc<DocumentShared>,
}

pub(crate) struct DocumentShared {
    options: DocumentOptions,
    proxies: RwLock<HashMap<ObjectKey, Proxy>>,
    xref: RwLock<XrefTable>,
    trailer: Dictionary,
    source: RwLock<Option<Arc<dyn ObjectSource>>>,
    tracker: Arc<ChangeTracker>,
}

impl CosDocument {
    pub fn new(options: DocumentOptions) -> Self {
        let tracker = Arc::new(ChangeTracker::new(options.max_nesting_depth));
        CosDocument {
            shared: Arc::new(DocumentShared {
                options,
                proxies: RwLock::new(HashMap::new()),
                xref: RwLock::new(XrefTable::new()),
                trailer: Dictionary::new(),
                source: RwLock::new(None),
                tracker,
            }),
        }
    }

    pub fn with_source(options: DocumentOptions, source: impl ObjectSource + 'static) -> Self {
        let document = Self::new(options);
        document.set_source(source);
        document
    }

    pub(crate) fn from_shared(shared: Arc<DocumentShared>) -> Self {
        CosDocument { shared }
    }

    /// Attach the source used to resolve proxies.
    pub fn set_source(&self, source: impl ObjectSource + 'static) {
        *self
            .shared
            .source
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(source));
    }

    fn source(&self) -> Option<Arc<dyn ObjectSource>> {
        self.shared
            .source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.shared.options
    }

    pub fn trailer(&self) -> &Dictionary {
        &self.shared.trailer
    }

    /// Merge a trailer read from the file into the document trailer. The
    /// first `/Size` merged is kept.
    pub fn merge_trailer(&self, trailer: &Dictionary) {
        self.shared
            .trailer
            .merge(trailer, MergePolicy::KeepFirstSize);
    }

    fn proxies(&self) -> RwLockReadGuard<'_, HashMap<ObjectKey, Proxy>> {
        self.shared
            .proxies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn proxies_mut(&self) -> RwLockWriteGuard<'_, HashMap<ObjectKey, Proxy>> {
        self.shared
            .proxies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn xref(&self) -> RwLockReadGuard<'_, XrefTable> {
        self.shared
            .xref
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The proxy for `key`, created unresolved on first request.
    pub fn get_or_create_proxy(&self, key: ObjectKey) -> Proxy {
        if let Some(proxy) = self.proxies().get(&key) {
            return proxy.clone();
        }
        let mut proxies = self.proxies_mut();
        // Another thread may have created it between the two locks.
        proxies
            .entry(key)
            .or_insert_with(|| Proxy::new(key, Arc::downgrade(&self.shared)))
            .clone()
    }

    pub fn get_proxy(&self, key: ObjectKey) -> Option<Proxy> {
        self.proxies().get(&key).cloned()
    }

    pub fn contains(&self, key: ObjectKey) -> bool {
        self.proxies().contains_key(&key)
    }

    /// Drop the pool entry for `key`. Containers still holding the proxy
    /// keep their handle.
    pub fn remove_proxy(&self, key: ObjectKey) -> Option<Proxy> {
        let removed = self.proxies_mut().remove(&key);
        if let Some(proxy) = &removed {
            if let Some(value) = proxy.cached() {
                self.detach(key, &value);
            }
            self.shared.tracker.forget(key);
            debug!(%key, "removed proxy from pool");
        }
        removed
    }

    /// Resolve `key` through its proxy.
    pub fn resolve(&self, key: ObjectKey) -> Object {
        self.get_or_create_proxy(key).resolve()
    }

    /// Install an object read by the parser. The object is not dirty.
    pub fn register_parsed(&self, key: ObjectKey, object: impl Into<Object>) -> Proxy {
        let object = object.into();
        let proxy = self.get_or_create_proxy(key);
        let previous = proxy.cached();
        proxy.install(object.clone());
        if let Some(previous) = previous {
            let replaced = Container::of_value(&previous).map(|c| c.id());
            if replaced != Container::of_value(&object).map(|c| c.id()) {
                self.detach(key, &previous);
            }
        }
        self.attach(key, &object);
        proxy
    }

    /// Add a new indirect object under the next free object number. The
    /// object is dirty until the next [`mark_saved`](Self::mark_saved).
    pub fn add_object(&self, object: impl Into<Object>) -> Proxy {
        let object = object.into();
        let (key, proxy) = {
            let mut proxies = self.proxies_mut();
            let highest_pooled = proxies.keys().map(ObjectKey::number).max().unwrap_or(0);
            let highest_xref = self.xref().highest_object_number().unwrap_or(0);
            let key = ObjectKey::from_parts(highest_pooled.max(highest_xref) + 1, 0);
            let proxy = Proxy::new(key, Arc::downgrade(&self.shared));
            proxies.insert(key, proxy.clone());
            (key, proxy)
        };
        proxy.install(object.clone());
        self.attach(key, &object);
        if self.shared.options.track_changes {
            self.shared.tracker.mark_dirty(key);
        }
        proxy
    }

    /// Hook a registered object into change tracking. An object already
    /// tracked under `key` keeps its single observer.
    pub(crate) fn attach(&self, key: ObjectKey, object: &Object) {
        if !self.shared.options.track_changes {
            return;
        }
        if let Some(container) = Container::of_value(object) {
            container
                .update_state()
                .register_keyed(key, self.shared.tracker.observer_for(key));
        }
        self.shared.tracker.index_references(key, object);
    }

    /// Stop tracking `object` under `key`.
    fn detach(&self, key: ObjectKey, object: &Object) {
        if let Some(container) = Container::of_value(object) {
            container.update_state().unregister_keyed(key);
        }
    }

    pub(crate) fn load_object(&self, key: ObjectKey) -> Result<Object> {
        let source = self
            .source()
            .ok_or_else(|| PdfError::unresolvable(key, "no object source attached"))?;
        let entry = self.xref_entry(key);
        if entry.is_some_and(|e| e.is_free()) {
            return Err(PdfError::unresolvable(key, "object is marked free"));
        }
        source.load_object(key, entry, self)
    }

    /// Merge cross-reference entries according to the configured policy.
    pub fn add_xref_entries(&self, entries: impl IntoIterator<Item = (ObjectKey, XrefEntry)>) {
        let replaced = self
            .shared
            .xref
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(entries, self.shared.options.xref_merge);
        for key in replaced {
            debug!(%key, "cross-reference entry overwritten");
        }
    }

    pub fn add_xref_table(&self, table: &XrefTable) {
        self.add_xref_entries(table.iter());
    }

    pub fn xref_entry(&self, key: ObjectKey) -> Option<XrefEntry> {
        self.xref().get(key)
    }

    /// Snapshot of the cross-reference table.
    pub fn xref_table(&self) -> XrefTable {
        self.xref().clone()
    }

    pub fn highest_object_number(&self) -> u64 {
        let pooled = self.proxies().keys().map(ObjectKey::number).max();
        let xref = self.xref().highest_object_number();
        pooled.max(xref).unwrap_or(0)
    }

    /// Keys in the pool, ascending.
    pub fn keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<ObjectKey> = self.proxies().keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.proxies().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the object under `key` must be written on the next save.
    pub fn is_dirty(&self, key: ObjectKey) -> bool {
        self.shared.tracker.is_dirty(key)
    }

    /// Flag `key` for rewriting.
    pub fn mark_dirty(&self, key: ObjectKey) {
        self.shared.tracker.mark_dirty(key);
    }

    /// The objects an incremental save has to write, ascending by key.
    /// Objects flagged direct are written inline by their referrers and are
    /// not listed.
    pub fn objects_to_update(&self) -> Vec<(ObjectKey, Proxy)> {
        let tracker = &self.shared.tracker;
        let proxies = self.proxies();
        tracker
            .dirty_keys()
            .into_iter()
            .filter(|key| !tracker.is_direct(*key))
            .filter_map(|key| proxies.get(&key).map(|proxy| (key, proxy.clone())))
            .collect()
    }

    /// Start a new save cycle after the writer has saved every dirty object.
    pub fn mark_saved(&self) {
        self.shared.tracker.reset();
    }

    pub fn change_tracker(&self) -> &ChangeTracker {
        &self.shared.tracker
    }

    pub fn stats(&self) -> PoolStats {
        let (proxies, resolved) = {
            let proxies = self.proxies();
            let resolved = proxies.values().filter(|p| p.is_resolved()).count();
            (proxies.len(), resolved)
        };
        PoolStats {
            proxies,
            resolved,
            xref_entries: self.xref().len(),
            dirty: self.shared.tracker.dirty_keys().len(),
        }
    }

    /// Close every resolved stream in the pool.
    pub fn close(&self) {
        let proxies: Vec<Proxy> = self.proxies().values().cloned().collect();
        let mut closed = 0usize;
        for proxy in proxies {
            if let Some(Object::Stream(stream)) = proxy.cached() {
                stream.close();
                closed += 1;
            }
        }
        debug!(closed, "closed document streams");
    }

    /// Whether both handles refer to the same document.
    pub fn ptr_eq(&self, other: &CosDocument) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Drop for DocumentShared {
    // Resolved objects and their proxies form cycles; emptying the slots
    // breaks them.
    fn drop(&mut self) {
        let proxies = self
            .proxies
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        let released: Vec<Object> = proxies.values().filter_map(Proxy::release).collect();
        proxies.clear();
        debug!(released = released.len(), "released resolved objects");
        drop(released);
    }
}

impl Default for CosDocument {
    fn default() -> Self {
        Self::new(DocumentOptions::default())
    }
}

impl fmt::Debug for CosDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CosDocument")
            .field("stats", &self.stats())
            .field("options", &self.shared.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::XrefMergePolicy;
    use crate::objects::{Array, Name, Stream};
    use crate::source::MemorySource;
    use pretty_assertions::assert_eq;
    use std::thread;

    fn key(n: u64) -> ObjectKey {
        ObjectKey::from_parts(n, 0)
    }

    #[test]
    fn test_get_or_create_returns_same_proxy() {
        let doc = CosDocument::default();
        let first = doc.get_or_create_proxy(key(1));
        let second = doc.get_or_create_proxy(key(1));

        assert!(first.ptr_eq(&second));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_concurrent_get_or_create() {
        let doc = CosDocument::default();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let doc = doc.clone();
                thread::spawn(move || doc.get_or_create_proxy(key(42)))
            })
            .collect();

        let proxies: Vec<Proxy> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(proxies.windows(2).all(|w| w[0].ptr_eq(&w[1])));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_forward_reference_filled_in_place() {
        let doc = CosDocument::default();
        doc.add_xref_entries([(key(5), XrefEntry::InUse { offset: 120 })]);

        let placeholder = doc.get_or_create_proxy(key(5));
        assert!(!placeholder.is_resolved());

        let catalog = Dictionary::new();
        catalog.set("Type", Name::new("Catalog"));
        let registered = doc.register_parsed(key(5), catalog.clone());

        assert!(placeholder.ptr_eq(&registered));
        assert_eq!(placeholder.resolve(), Object::Dictionary(catalog));
        assert!(!doc.is_dirty(key(5)), "Parsed objects start clean");
    }

    #[test]
    fn test_nested_direct_change_dirties_enclosing_object() {
        let doc = CosDocument::default();
        let page = Dictionary::new();
        let annots = Array::new();
        page.set("Annots", annots.clone());
        doc.register_parsed(key(10), page.clone());

        assert!(!page.needs_update());
        annots.add(1);

        assert!(page.needs_update());
        assert!(!annots.needs_update());
        let dirty: Vec<ObjectKey> = doc.objects_to_update().iter().map(|(k, _)| *k).collect();
        assert_eq!(dirty, vec![key(10)]);
    }

    #[test]
    fn test_mark_saved_starts_new_cycle() {
        let doc = CosDocument::default();
        let dict = Dictionary::new();
        doc.register_parsed(key(1), dict.clone());
        dict.set("A", 1);
        assert!(doc.is_dirty(key(1)));

        doc.mark_saved();
        assert!(!doc.is_dirty(key(1)));
        assert!(!dict.needs_update());

        dict.set("B", 2);
        assert!(doc.is_dirty(key(1)));
    }

    #[test]
    fn test_add_object_allocates_next_number() {
        let doc = CosDocument::default();
        doc.add_xref_entries([(key(7), XrefEntry::InUse { offset: 15 })]);
        doc.get_or_create_proxy(key(3));

        let proxy = doc.add_object(Dictionary::new());
        assert_eq!(proxy.key(), key(8));
        assert!(doc.is_dirty(key(8)));
        assert_eq!(doc.highest_object_number(), 8);
        assert_eq!(doc.keys(), vec![key(3), key(8)]);
    }

    #[test]
    fn test_direct_object_dirties_referrer() {
        let doc = CosDocument::default();
        let font = Dictionary::new();
        let font_proxy = doc.register_parsed(key(2), font.clone());
        let resources = Dictionary::new();
        resources.set("F1", font_proxy);
        doc.register_parsed(key(1), resources);

        font.set_direct(true);
        doc.mark_saved();

        font.set("BaseFont", Name::new("Helvetica"));
        assert!(doc.is_dirty(key(1)));
        assert!(!doc.is_dirty(key(2)));
        assert_eq!(doc.objects_to_update().len(), 1);
    }

    #[test]
    fn test_reference_added_later_is_indexed() {
        let doc = CosDocument::default();
        let holder = Dictionary::new();
        doc.register_parsed(key(1), holder.clone());
        let target = Array::new();
        let target_proxy = doc.register_parsed(key(2), target.clone());

        let nested = Dictionary::new();
        holder.set("Nested", nested.clone());
        nested.set("Target", target_proxy);

        assert_eq!(doc.change_tracker().referrers_of(key(2)), vec![key(1)]);
    }

    #[test]
    fn test_read_only_documents_do_not_track() {
        let doc = CosDocument::new(DocumentOptions::read_only());
        let dict = Dictionary::new();
        doc.register_parsed(key(1), dict.clone());
        dict.set("A", 1);

        assert!(!doc.is_dirty(key(1)));
        assert_eq!(dict.update_state().observer_count(), 0);
    }

    #[test]
    fn test_remove_proxy() {
        let doc = CosDocument::default();
        let proxy = doc.add_object(1);
        let key = proxy.key();

        assert!(doc.remove_proxy(key).is_some());
        assert!(!doc.contains(key));
        assert!(!doc.is_dirty(key));
        assert!(doc.objects_to_update().is_empty());
        assert!(doc.remove_proxy(key).is_none());
    }

    #[test]
    fn test_dropping_document_frees_page_tree_cycle() {
        let doc = CosDocument::default();
        let pages = Dictionary::new();
        pages.set("Type", Name::new("Pages"));
        pages.set("Kids", Array::from_iter([doc.get_or_create_proxy(key(3))]));
        let page = Dictionary::new();
        page.set("Type", Name::new("Page"));
        page.set("Parent", doc.get_or_create_proxy(key(2)));
        doc.register_parsed(key(2), pages.clone());
        doc.register_parsed(key(3), page.clone());

        let weak_pages = pages.downgrade();
        let weak_page = page.downgrade();
        drop(pages);
        drop(page);
        assert!(weak_pages.upgrade().is_some());

        drop(doc);
        assert!(weak_pages.upgrade().is_none());
        assert!(weak_page.upgrade().is_none());
    }

    #[test]
    fn test_repeated_resolution_keeps_one_observer() {
        let source = MemorySource::new();
        let dict = Dictionary::new();
        dict.set("Count", 1);
        source.insert(key(4), dict.clone());
        let doc = CosDocument::with_source(DocumentOptions::default(), source);
        let proxy = doc.get_or_create_proxy(key(4));

        for _ in 0..100 {
            proxy.resolve();
            proxy.reset();
        }
        proxy.resolve();
        doc.register_parsed(key(4), dict.clone());

        assert_eq!(dict.update_state().observer_count(), 1);
    }

    #[test]
    fn test_replaced_object_is_no_longer_tracked() {
        let doc = CosDocument::default();
        let old = Dictionary::new();
        doc.register_parsed(key(6), old.clone());
        let new = Dictionary::new();
        doc.register_parsed(key(6), new.clone());

        assert_eq!(old.update_state().observer_count(), 0);
        old.set("Stale", true);
        assert!(!doc.is_dirty(key(6)));

        new.set("Fresh", true);
        assert!(doc.is_dirty(key(6)));
    }

    #[test]
    fn test_removed_object_edits_are_not_tracked() {
        let doc = CosDocument::default();
        let dict = Dictionary::new();
        let key = doc.add_object(dict.clone()).key();
        doc.mark_saved();

        doc.remove_proxy(key);
        dict.set("After", 1);

        assert_eq!(dict.update_state().observer_count(), 0);
        assert!(!doc.is_dirty(key));
        assert_eq!(doc.stats().dirty, 0);
    }

    #[test]
    fn test_xref_overwrite_policy() {
        let doc = CosDocument::default();
        doc.add_xref_entries([(key(1), XrefEntry::InUse { offset: 10 })]);
        doc.add_xref_entries([(key(1), XrefEntry::InUse { offset: 500 })]);
        assert_eq!(doc.xref_entry(key(1)), Some(XrefEntry::InUse { offset: 500 }));

        let keep = CosDocument::new(
            DocumentOptions::default().with_xref_merge(XrefMergePolicy::KeepExisting),
        );
        keep.add_xref_entries([(key(1), XrefEntry::InUse { offset: 10 })]);
        keep.add_xref_entries([(key(1), XrefEntry::InUse { offset: 500 })]);
        assert_eq!(keep.xref_entry(key(1)), Some(XrefEntry::InUse { offset: 10 }));
    }

    #[test]
    fn test_free_entry_resolves_to_null() {
        let source = MemorySource::new();
        source.insert(key(4), 99);
        let doc = CosDocument::with_source(DocumentOptions::default(), source);
        doc.add_xref_entries([(key(4), XrefEntry::Free)]);

        assert_eq!(doc.resolve(key(4)), Object::Null);
    }

    #[test]
    fn test_resolved_objects_are_tracked() {
        let source = MemorySource::new();
        source.insert(key(3), Dictionary::new());
        let doc = CosDocument::with_source(DocumentOptions::default(), source);

        let dict = doc.resolve(key(3));
        assert!(!doc.is_dirty(key(3)));
        dict.as_dict().unwrap().set("Changed", true);
        assert!(doc.is_dirty(key(3)));
    }

    #[test]
    fn test_merge_trailer_keeps_first_size() {
        let doc = CosDocument::default();
        let first: Dictionary = [("Size", 10)].into_iter().collect();
        let second: Dictionary = [("Size", 25), ("Prev", 400)].into_iter().collect();

        doc.merge_trailer(&first);
        doc.merge_trailer(&second);

        assert_eq!(doc.trailer().get_int("Size", 0), 10);
        assert_eq!(doc.trailer().get_int("Prev", 0), 400);
    }

    #[test]
    fn test_close_releases_streams() {
        let doc = CosDocument::default();
        let stream = Stream::from_decoded(Dictionary::new(), b"data".to_vec());
        doc.register_parsed(key(1), stream.clone());

        doc.close();
        assert!(stream.is_closed());
    }

    #[test]
    fn test_stats() {
        let doc = CosDocument::default();
        doc.add_xref_entries([(key(1), XrefEntry::InUse { offset: 0 })]);
        doc.get_or_create_proxy(key(1));
        doc.add_object(true);

        assert_eq!(
            doc.stats(),
            PoolStats {
                proxies: 2,
                resolved: 1,
                xref_entries: 1,
                dirty: 1,
            }
        );
    }
}
