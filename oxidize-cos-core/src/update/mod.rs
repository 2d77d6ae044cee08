//! Change notification for mutable containers.
//!
//! Every [`Dictionary`] and [`Array`] (and every [`Stream`] through its
//! dictionary) owns an [`UpdateState`]. Mutations raise an [`UpdateEvent`]
//! that is dispatched to the registered [`UpdateObserver`]s once the
//! mutation has been applied and the container lock released, so observers
//! may read or even mutate the container they are notified about.
//!
//! A direct container nested inside another container forwards its events
//! to the parent through a [`ParentLink`], which is how a change deep inside
//! a page dictionary ends up marking the enclosing indirect object dirty.
//!
//! [`Stream`]: crate::objects::Stream

mod tracker;

pub use tracker::ChangeTracker;

use crate::error::{PdfError, Result};
use crate::objects::{Array, Dictionary, Object, ObjectKey, WeakArray, WeakDictionary};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Maximum number of parent hops an event travels before it is dropped.
pub const MAX_PROPAGATION_DEPTH: usize = 64;

/// Receives change events from containers.
pub trait UpdateObserver: Send + Sync {
    /// Called after the container has been mutated.
    fn on_update(&self, event: &UpdateEvent) -> Result<()>;

    /// Whether this observer considers the container in need of rewriting.
    fn needs_update(&self) -> bool {
        false
    }

    /// The container this observer relays events to, if it is a parent link.
    fn forwards_to(&self) -> Option<ContainerId> {
        None
    }

    /// The indirect object this observer tracks on behalf of a document.
    fn keyed_to(&self) -> Option<ObjectKey> {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    /// Values were stored. Bulk operations such as `clear` carry no values.
    EntriesAdded(Vec<Object>),
    /// The container's direct flag was set to the given value.
    DirectChanged(bool),
    /// Any other change, including stream data changes.
    Updated,
}

/// A change reported by a container.
#[derive(Debug, Clone)]
pub struct UpdateEvent {
    kind: UpdateKind,
    source: Container,
    depth: usize,
}

impl UpdateEvent {
    pub fn new(kind: UpdateKind, source: Container) -> Self {
        Self {
            kind,
            source,
            depth: 0,
        }
    }

    pub fn kind(&self) -> &UpdateKind {
        &self.kind
    }

    /// The container that raised or relayed the event.
    pub fn source(&self) -> &Container {
        &self.source
    }

    /// Number of parent links the event has crossed.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_forwarded(&self) -> bool {
        self.depth > 0
    }

    /// The event as seen by `parent`. A child's direct flag is content of
    /// the parent, so it arrives there as a plain update.
    pub fn forwarded(&self, parent: Container) -> Self {
        let kind = match &self.kind {
            UpdateKind::DirectChanged(_) => UpdateKind::Updated,
            other => other.clone(),
        };
        Self {
            kind,
            source: parent,
            depth: self.depth + 1,
        }
    }
}

/// Stable identity of a container allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerId(usize);

impl ContainerId {
    pub(crate) fn of<T>(inner: &Arc<T>) -> Self {
        ContainerId(Arc::as_ptr(inner) as *const () as usize)
    }
}

/// A mutable container that can raise events.
#[derive(Clone)]
pub enum Container {
    Dictionary(Dictionary),
    Array(Array),
}

impl Container {
    pub fn id(&self) -> ContainerId {
        match self {
            Container::Dictionary(d) => d.id(),
            Container::Array(a) => a.id(),
        }
    }

    pub fn update_state(&self) -> &UpdateState {
        match self {
            Container::Dictionary(d) => d.update_state(),
            Container::Array(a) => a.update_state(),
        }
    }

    pub fn as_object(&self) -> Object {
        match self {
            Container::Dictionary(d) => Object::Dictionary(d.clone()),
            Container::Array(a) => Object::Array(a.clone()),
        }
    }

    /// The container a value holds directly, if any.
    pub fn of_value(value: &Object) -> Option<Container> {
        match value {
            Object::Dictionary(d) => Some(Container::Dictionary(d.clone())),
            Object::Array(a) => Some(Container::Array(a.clone())),
            Object::Stream(s) => Some(Container::Dictionary(s.dictionary().clone())),
            _ => None,
        }
    }

    pub(crate) fn downgrade(&self) -> WeakContainer {
        match self {
            Container::Dictionary(d) => WeakContainer::Dictionary(d.downgrade()),
            Container::Array(a) => WeakContainer::Array(a.downgrade()),
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Container::Dictionary(_) => write!(f, "Dictionary@{:x}", self.id().0),
            Container::Array(_) => write!(f, "Array@{:x}", self.id().0),
        }
    }
}

pub(crate) enum WeakContainer {
    Dictionary(WeakDictionary),
    Array(WeakArray),
}

impl WeakContainer {
    fn upgrade(&self) -> Option<Container> {
        match self {
            WeakContainer::Dictionary(d) => d.upgrade().map(Container::Dictionary),
            WeakContainer::Array(a) => a.upgrade().map(Container::Array),
        }
    }
}

/// Per-container observer list and direct flag.
///
/// The observer list is copy-on-write: dispatch iterates a snapshot, so
/// observers registered or removed during dispatch take effect from the next
/// event on.
pub struct UpdateState {
    observers: RwLock<Arc<[Arc<dyn UpdateObserver>]>>,
    direct: AtomicBool,
}

impl UpdateState {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(Arc::from(Vec::new())),
            direct: AtomicBool::new(false),
        }
    }

    pub fn register(&self, observer: Arc<dyn UpdateObserver>) {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = observers.to_vec();
        next.push(observer);
        *observers = Arc::from(next);
    }

    /// Register `observer` unless an observer keyed to `key` is already
    /// present. Returns whether it was added.
    pub(crate) fn register_keyed(
        &self,
        key: ObjectKey,
        observer: Arc<dyn UpdateObserver>,
    ) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        if observers.iter().any(|o| o.keyed_to() == Some(key)) {
            return false;
        }
        let mut next = observers.to_vec();
        next.push(observer);
        *observers = Arc::from(next);
        true
    }

    /// Remove the observer keyed to `key`.
    pub(crate) fn unregister_keyed(&self, key: ObjectKey) -> bool {
        self.remove_first(|candidate| candidate.keyed_to() == Some(key))
    }

    /// Remove `observer`. Returns whether it was registered.
    pub fn unregister(&self, observer: &Arc<dyn UpdateObserver>) -> bool {
        self.remove_first(|candidate| same_observer(candidate, observer))
    }

    /// Remove one link relaying events to `parent`.
    pub(crate) fn unlink_parent(&self, parent: ContainerId) -> bool {
        self.remove_first(|candidate| candidate.forwards_to() == Some(parent))
    }

    fn remove_first(&self, matches: impl Fn(&Arc<dyn UpdateObserver>) -> bool) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        match observers.iter().position(|o| matches(o)) {
            Some(pos) => {
                let mut next = observers.to_vec();
                next.remove(pos);
                *observers = Arc::from(next);
                true
            }
            None => false,
        }
    }

    pub fn observer_count(&self) -> usize {
        self.snapshot().len()
    }

    fn snapshot(&self) -> Arc<[Arc<dyn UpdateObserver>]> {
        Arc::clone(&self.observers.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Dispatch `event` to every observer. Failures are logged and do not
    /// stop the remaining observers.
    pub fn notify(&self, event: &UpdateEvent) {
        for observer in self.snapshot().iter() {
            if let Err(e) = observer.on_update(event) {
                warn!(source = ?event.source(), depth = event.depth(), "update observer failed: {e}");
            }
        }
    }

    /// Whether any observer flags the container for rewriting.
    pub fn needs_update(&self) -> bool {
        self.snapshot().iter().any(|o| o.needs_update())
    }

    pub fn is_direct(&self) -> bool {
        self.direct.load(Ordering::Acquire)
    }

    pub(crate) fn store_direct(&self, direct: bool) {
        self.direct.store(direct, Ordering::Release);
    }
}

impl Default for UpdateState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateState")
            .field("observers", &self.observer_count())
            .field("direct", &self.is_direct())
            .finish()
    }
}

fn same_observer(a: &Arc<dyn UpdateObserver>, b: &Arc<dyn UpdateObserver>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Relays a child container's events to the container holding it.
///
/// Holds the parent weakly so a child outliving its parent does not keep
/// the parent alive.
pub(crate) struct ParentLink {
    parent: WeakContainer,
    parent_id: ContainerId,
}

impl ParentLink {
    pub(crate) fn new(parent: &Container) -> Self {
        Self {
            parent: parent.downgrade(),
            parent_id: parent.id(),
        }
    }
}

impl UpdateObserver for ParentLink {
    fn on_update(&self, event: &UpdateEvent) -> Result<()> {
        if event.depth() >= MAX_PROPAGATION_DEPTH {
            return Err(PdfError::RecursionLimitExceeded(MAX_PROPAGATION_DEPTH));
        }
        if let Some(parent) = self.parent.upgrade() {
            let forwarded = event.forwarded(parent.clone());
            parent.update_state().notify(&forwarded);
        }
        Ok(())
    }

    fn forwards_to(&self) -> Option<ContainerId> {
        Some(self.parent_id)
    }
}

/// Attach `value` to `parent` if it is a direct container.
pub(crate) fn link_child(parent: &Container, value: &Object) {
    if let Some(child) = Container::of_value(value) {
        child
            .update_state()
            .register(Arc::new(ParentLink::new(parent)));
    }
}

/// Detach `value` from `parent` if it is a direct container.
pub(crate) fn unlink_child(parent: ContainerId, value: &Object) {
    if let Some(child) = Container::of_value(value) {
        child.update_state().unlink_parent(parent);
    }
}
