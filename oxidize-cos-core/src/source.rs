//! Object sources
//!
//! A [`CosDocument`] resolves proxies by asking its [`ObjectSource`] for the
//! object stored under a key. A file parser implements the trait by seeking
//! to the cross-reference entry and parsing the object found there.

use crate::document::{CosDocument, XrefEntry};
use crate::error::{PdfError, Result};
use crate::objects::{Object, ObjectKey};
use std::collections::HashMap;
use std::io::{Error as IoError, ErrorKind};
use std::sync::{Arc, PoisonError, RwLock};

/// Supplies indirect objects on demand.
pub trait ObjectSource: Send + Sync {
    /// Load the object stored under `key`.
    ///
    /// `entry` is the document's cross-reference entry for the key, if any.
    /// References inside the returned object should be obtained from
    /// `document` through [`CosDocument::get_or_create_proxy`]. Failures of
    /// the underlying storage must be reported as [`PdfError::Io`] so the
    /// document retries them instead of caching null.
    fn load_object(
        &self,
        key: ObjectKey,
        entry: Option<XrefEntry>,
        document: &CosDocument,
    ) -> Result<Object>;
}

/// Objects held in memory, keyed by identity.
///
/// Clones share the same objects. Keys can be set to fail with an I/O
/// error to exercise retry paths.
#[derive(Clone, Default)]
pub struct MemorySource {
    inner: Arc<RwLock<MemoryObjects>>,
}

#[derive(Default)]
struct MemoryObjects {
    objects: HashMap<ObjectKey, Object>,
    failures: HashMap<ObjectKey, ErrorKind>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: ObjectKey, object: impl Into<Object>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .objects
            .insert(key, object.into());
    }

    pub fn remove(&self, key: ObjectKey) -> Option<Object> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .objects
            .remove(&key)
    }

    /// Make loads of `key` fail with an I/O error of `kind`.
    pub fn fail_with(&self, key: ObjectKey, kind: ErrorKind) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .failures
            .insert(key, kind);
    }

    pub fn clear_failure(&self, key: ObjectKey) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .failures
            .remove(&key);
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .objects
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectSource for MemorySource {
    fn load_object(
        &self,
        key: ObjectKey,
        _entry: Option<XrefEntry>,
        _document: &CosDocument,
    ) -> Result<Object> {
        let objects = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(kind) = objects.failures.get(&key) {
            return Err(PdfError::Io(IoError::new(
                *kind,
                format!("simulated failure reading {key}"),
            )));
        }
        objects
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| PdfError::unresolvable(key, "object not found in source"))
    }
}

/// Adapts a closure into an [`ObjectSource`].
pub struct FnSource<F> {
    load: F,
}

impl<F> FnSource<F>
where
    F: Fn(ObjectKey, Option<XrefEntry>, &CosDocument) -> Result<Object> + Send + Sync,
{
    pub fn new(load: F) -> Self {
        Self { load }
    }
}

impl<F> ObjectSource for FnSource<F>
where
    F: Fn(ObjectKey, Option<XrefEntry>, &CosDocument) -> Result<Object> + Send + Sync,
{
    fn load_object(
        &self,
        key: ObjectKey,
        entry: Option<XrefEntry>,
        document: &CosDocument,
    ) -> Result<Object> {
        (self.load)(key, entry, document)
    }
}
