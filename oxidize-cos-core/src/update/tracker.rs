//! Document-scoped dirty tracking for incremental saves.

use super::{Container, UpdateEvent, UpdateKind, UpdateObserver};
use crate::error::Result;
use crate::objects::{Object, ObjectKey};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::trace;

/// Records which indirect objects changed since the last save.
///
/// Only keyed objects are individually rewritable. A keyed object that has
/// been flagged direct is written inline into the objects referring to it,
/// so marking it dirty marks those referrers instead.
#[derive(Debug)]
pub struct ChangeTracker {
    state: RwLock<TrackerState>,
    max_depth: usize,
}

#[derive(Debug, Default)]
struct TrackerState {
    dirty: BTreeSet<ObjectKey>,
    direct: HashSet<ObjectKey>,
    /// target -> keys of the objects holding a reference to it
    referrers: HashMap<ObjectKey, BTreeSet<ObjectKey>>,
}

impl ChangeTracker {
    pub fn new(max_depth: usize) -> Self {
        Self {
            state: RwLock::new(TrackerState::default()),
            max_depth,
        }
    }

    pub fn mark_dirty(&self, key: ObjectKey) {
        let mut state = self.write();
        Self::mark(&mut state, key);
    }

    fn mark(state: &mut TrackerState, key: ObjectKey) {
        let mut visited = HashSet::new();
        let mut pending = vec![key];
        while let Some(key) = pending.pop() {
            if !visited.insert(key) {
                continue;
            }
            if state.direct.contains(&key) {
                if let Some(referrers) = state.referrers.get(&key) {
                    if !referrers.is_empty() {
                        pending.extend(referrers.iter().copied());
                        continue;
                    }
                }
            }
            if state.dirty.insert(key) {
                trace!(%key, "marked dirty");
            }
        }
    }

    pub fn is_dirty(&self, key: ObjectKey) -> bool {
        self.read().dirty.contains(&key)
    }

    /// Dirty keys in ascending order.
    pub fn dirty_keys(&self) -> Vec<ObjectKey> {
        self.read().dirty.iter().copied().collect()
    }

    /// Start a new save cycle.
    pub fn reset(&self) {
        self.write().dirty.clear();
    }

    pub fn is_direct(&self, key: ObjectKey) -> bool {
        self.read().direct.contains(&key)
    }

    /// Record the direct flag of a keyed object and dirty whatever now has
    /// to be written for it.
    pub fn set_direct(&self, key: ObjectKey, direct: bool) {
        let mut state = self.write();
        if direct {
            state.direct.insert(key);
        } else {
            state.direct.remove(&key);
        }
        let referrers: Vec<ObjectKey> = state
            .referrers
            .get(&key)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default();
        for referrer in referrers {
            Self::mark(&mut state, referrer);
        }
        if !direct {
            Self::mark(&mut state, key);
        }
    }

    /// Keys of the objects known to reference `key`.
    pub fn referrers_of(&self, key: ObjectKey) -> Vec<ObjectKey> {
        self.read()
            .referrers
            .get(&key)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Record every reference reachable from `value` through direct
    /// containers as held by `owner`.
    pub fn index_references(&self, owner: ObjectKey, value: &Object) {
        let targets = collect_references(value, self.max_depth);
        if targets.is_empty() {
            return;
        }
        let mut state = self.write();
        for target in targets {
            state.referrers.entry(target).or_default().insert(owner);
        }
    }

    /// Drop all bookkeeping for `key`.
    pub fn forget(&self, key: ObjectKey) {
        let mut state = self.write();
        state.dirty.remove(&key);
        state.direct.remove(&key);
        state.referrers.remove(&key);
        for holders in state.referrers.values_mut() {
            holders.remove(&key);
        }
    }

    /// An observer marking `key` dirty whenever the object it is attached
    /// to changes.
    pub(crate) fn observer_for(self: &Arc<Self>, key: ObjectKey) -> Arc<KeyedObserver> {
        Arc::new(KeyedObserver {
            key,
            tracker: Arc::downgrade(self),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TrackerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TrackerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keys referenced from `value`, following direct containers only.
fn collect_references(value: &Object, max_depth: usize) -> Vec<ObjectKey> {
    let mut found = Vec::new();
    let mut pending = vec![(value.clone(), 0usize)];
    while let Some((value, depth)) = pending.pop() {
        if let Some(key) = value.reference_key() {
            found.push(key);
            continue;
        }
        if depth >= max_depth {
            continue;
        }
        match Container::of_value(&value) {
            Some(Container::Dictionary(dict)) => {
                pending.extend(dict.values().into_iter().map(|v| (v, depth + 1)));
            }
            Some(Container::Array(array)) => {
                pending.extend(array.to_vec().into_iter().map(|v| (v, depth + 1)));
            }
            None => {}
        }
    }
    found
}

/// Observer attached to a registered object on behalf of its document.
pub(crate) struct KeyedObserver {
    key: ObjectKey,
    tracker: Weak<ChangeTracker>,
}

impl UpdateObserver for KeyedObserver {
    fn on_update(&self, event: &UpdateEvent) -> Result<()> {
        let Some(tracker) = self.tracker.upgrade() else {
            return Ok(());
        };
        match event.kind() {
            UpdateKind::EntriesAdded(values) => {
                for value in values {
                    tracker.index_references(self.key, value);
                }
                tracker.mark_dirty(self.key);
            }
            UpdateKind::DirectChanged(direct) => tracker.set_direct(self.key, *direct),
            UpdateKind::Updated => tracker.mark_dirty(self.key),
        }
        Ok(())
    }

    fn needs_update(&self) -> bool {
        self.tracker
            .upgrade()
            .is_some_and(|tracker| tracker.is_dirty(self.key))
    }
    fn keyed_to(&self) -> Option<ObjectKey> {
        Some(self.key)
    }
}
