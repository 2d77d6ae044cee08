use crate::document::{CosDocument, DocumentShared};
use crate::error::{PdfError, Result};
use crate::objects::{Object, ObjectKey};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use tracing::warn;

/// Placeholder for an indirect object, resolved on first access.
///
/// A document hands out exactly one `Proxy` per key. Resolution fills the
/// proxy in place, so every container already holding it sees the value.
/// Only [`CosDocument`] creates proxies.
#[derive(Clone)]
pub struct Proxy(Arc<ProxyInner>);

struct ProxyInner {
    key: ObjectKey,
    slot: Mutex<Slot>,
    ready: Condvar,
    owner: Weak<DocumentShared>,
}

enum Slot {
    Unresolved,
    /// Being loaded by the given thread. Other threads wait; the loading
    /// thread itself has hit a reference cycle.
    Resolving(ThreadId),
    Resolved(Object),
}

impl Proxy {
    pub(crate) fn new(key: ObjectKey, owner: Weak<DocumentShared>) -> Self {
        Proxy(Arc::new(ProxyInner {
            key,
            slot: Mutex::new(Slot::Unresolved),
            ready: Condvar::new(),
            owner,
        }))
    }

    pub fn key(&self) -> ObjectKey {
        self.0.key
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.0.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.lock(), Slot::Resolved(_))
    }

    /// The resolved value, without triggering resolution.
    pub fn cached(&self) -> Option<Object> {
        match &*self.lock() {
            Slot::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Resolve the referenced object. Failures are logged and read as null.
    pub fn resolve(&self) -> Object {
        self.try_resolve().unwrap_or_else(|e| {
            warn!(key = %self.key(), "unresolvable reference: {e}");
            Object::Null
        })
    }

    /// Resolve the referenced object, reporting why resolution failed.
    ///
    /// I/O failures leave the proxy unresolved so a later call retries.
    /// Structural failures are cached as null when the document is lenient;
    /// the failing call still reports the error, later calls return null.
    pub fn try_resolve(&self) -> Result<Object> {
        let current = thread::current().id();
        {
            let mut slot = self.lock();
            loop {
                match &*slot {
                    Slot::Resolved(value) => return Ok(value.clone()),
                    Slot::Resolving(loader) if *loader == current => {
                        return Err(PdfError::unresolvable(self.key(), "cyclic reference"));
                    }
                    Slot::Resolving(_) => {
                        slot = self
                            .0
                            .ready
                            .wait(slot)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    Slot::Unresolved => break,
                }
            }
            *slot = Slot::Resolving(current);
        }

        let document = self.document();
        let outcome = match &document {
            Some(doc) => doc.load_object(self.key()),
            None => Err(PdfError::unresolvable(
                self.key(),
                "owning document was dropped",
            )),
        };
        let cache_failures = document.as_ref().is_some_and(|d| d.options().lenient);

        let mut attach = None;
        let result = {
            let mut slot = self.lock();
            // The parser may have registered the object while this thread was loading.
            let installed = match &*slot {
                Slot::Resolved(installed) => Some(installed.clone()),
                _ => None,
            };
            let result = match (installed, outcome) {
                (Some(installed), _) => Ok(installed),
                (None, Ok(value)) => {
                    *slot = Slot::Resolved(value.clone());
                    attach = Some(value.clone());
                    Ok(value)
                }
                (None, Err(e)) => {
                    *slot = if e.is_io() || !cache_failures {
                        Slot::Unresolved
                    } else {
                        Slot::Resolved(Object::Null)
                    };
                    Err(e)
                }
            };
            self.0.ready.notify_all();
            result
        };

        if let (Some(doc), Some(value)) = (document, attach) {
            doc.attach(self.key(), &value);
        }
        result
    }

    /// Forget the resolved value so the next access loads it again.
    pub fn reset(&self) {
        let mut slot = self.lock();
        if matches!(*slot, Slot::Resolved(_)) {
            *slot = Slot::Unresolved;
        }
    }

    /// Take the resolved value out, leaving the proxy unresolved.
    pub(crate) fn release(&self) -> Option<Object> {
        let mut slot = self.lock();
        match std::mem::replace(&mut *slot, Slot::Unresolved) {
            Slot::Resolved(value) => Some(value),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Fill the proxy with a parsed or newly created object.
    pub(crate) fn install(&self, value: Object) {
        *self.lock() = Slot::Resolved(value);
        self.0.ready.notify_all();
    }

    /// Whether both handles are the same proxy instance.
    pub fn ptr_eq(&self, other: &Proxy) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn document(&self) -> Option<CosDocument> {
        self.0.owner.upgrade().map(CosDocument::from_shared)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.lock() {
            Slot::Unresolved => "unresolved",
            Slot::Resolving(_) => "resolving",
            Slot::Resolved(_) => "resolved",
        };
        write!(f, "Proxy({}, {state})", self.key())
    }
}
