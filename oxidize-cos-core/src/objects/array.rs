use crate::error::{PdfError, Result};
use crate::objects::{Name, Object, PdfString};
use crate::update::{
    link_child, unlink_child, Container, ContainerId, UpdateEvent, UpdateKind, UpdateObserver,
    UpdateState,
};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// An ordered sequence of values.
///
/// Like [`Dictionary`](crate::objects::Dictionary), an `Array` is a shared
/// handle and every mutation notifies its observers after the element list
/// has been updated.
#[derive(Clone)]
pub struct Array(Arc<ArrayInner>);

struct ArrayInner {
    elements: RwLock<Vec<Object>>,
    state: UpdateState,
}

pub(crate) struct WeakArray(Weak<ArrayInner>);

impl WeakArray {
    pub(crate) fn upgrade(&self) -> Option<Array> {
        self.0.upgrade().map(Array)
    }
}

impl Array {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_vec(Vec::with_capacity(capacity))
    }

    fn from_vec(elements: Vec<Object>) -> Self {
        let array = Array(Arc::new(ArrayInner {
            elements: RwLock::new(Vec::new()),
            state: UpdateState::new(),
        }));
        let parent = array.as_container();
        for element in &elements {
            link_child(&parent, element);
        }
        *array.write() = elements;
        array
    }

    pub fn from_floats(values: &[f32]) -> Self {
        Self::from_vec(values.iter().map(|&v| Object::from(v)).collect())
    }

    pub fn from_ints(values: &[i64]) -> Self {
        Self::from_vec(values.iter().map(|&v| Object::Integer(v)).collect())
    }

    pub fn from_names(values: &[&str]) -> Self {
        Self::from_vec(values.iter().map(|v| Object::Name(Name::new(v))).collect())
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Object>> {
        self.0.elements.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Object>> {
        self.0.elements.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn as_container(&self) -> Container {
        Container::Array(self.clone())
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

    pub fn get(&self, index: usize) -> Result<Object> {
        let elements = self.read();
        elements
            .get(index)
            .cloned()
            .ok_or(PdfError::IndexOutOfRange {
                index,
                len: elements.len(),
            })
    }

    /// The element with references resolved; null reads as `None`.
    pub fn get_dereferenced(&self, index: usize) -> Result<Option<Object>> {
        let value = self.get(index)?.dereference();
        Ok((!value.is_null()).then_some(value))
    }

    /// Replace the element at `index`, returning the previous one.
    pub fn set(&self, index: usize, value: impl Into<Object>) -> Result<Object> {
        let value = value.into();
        let previous = {
            let mut elements = self.write();
            let len = elements.len();
            let slot = elements
                .get_mut(index)
                .ok_or(PdfError::IndexOutOfRange { index, len })?;
            std::mem::replace(slot, value.clone())
        };
        unlink_child(self.id(), &previous);
        link_child(&self.as_container(), &value);
        self.notify(UpdateKind::EntriesAdded(vec![value]));
        Ok(previous)
    }

    pub fn add(&self, value: impl Into<Object>) {
        let value = value.into();
        self.write().push(value.clone());
        link_child(&self.as_container(), &value);
        self.notify(UpdateKind::EntriesAdded(vec![value]));
    }

    /// Insert before `index`. `index == len()` appends.
    pub fn insert_at(&self, index: usize, value: impl Into<Object>) -> Result<()> {
        let value = value.into();
        {
            let mut elements = self.write();
            if index > elements.len() {
                return Err(PdfError::IndexOutOfRange {
                    index,
                    len: elements.len(),
                });
            }
            elements.insert(index, value.clone());
        }
        link_child(&self.as_container(), &value);
        self.notify(UpdateKind::EntriesAdded(vec![value]));
        Ok(())
    }

    pub fn remove_at(&self, index: usize) -> Result<Object> {
        let removed = {
            let mut elements = self.write();
            if index >= elements.len() {
                return Err(PdfError::IndexOutOfRange {
                    index,
                    len: elements.len(),
                });
            }
            elements.remove(index)
        };
        unlink_child(self.id(), &removed);
        self.notify(UpdateKind::Updated);
        Ok(removed)
    }

    /// Remove the first element equal to `value`.
    pub fn remove_value(&self, value: &Object) -> bool {
        let position = self.read().iter().position(|e| e == value);
        self.remove_position(position)
    }

    /// Remove the first element equal to `value`, either as stored or after
    /// resolving a reference.
    pub fn remove_value_dereferenced(&self, value: &Object) -> bool {
        let position = self
            .to_vec()
            .iter()
            .position(|e| e == value || (e.is_reference() && e.dereference() == *value));
        self.remove_position(position)
    }

    fn remove_position(&self, position: Option<usize>) -> bool {
        match position {
            Some(index) => self.remove_at(index).is_ok(),
            None => false,
        }
    }

    /// Pad with `fill` up to `size` elements. Never shrinks.
    pub fn grow_to(&self, size: usize, fill: impl Into<Object>) {
        let fill = fill.into();
        let added = {
            let mut elements = self.write();
            if elements.len() >= size {
                return;
            }
            let added = size - elements.len();
            elements.resize(size, fill.clone());
            added
        };
        let parent = self.as_container();
        for _ in 0..added {
            link_child(&parent, &fill);
        }
        self.notify(UpdateKind::EntriesAdded(vec![fill; added]));
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.write());
        for value in &removed {
            unlink_child(self.id(), value);
        }
        self.notify(UpdateKind::EntriesAdded(Vec::new()));
    }

    /// Snapshot of the elements.
    pub fn to_vec(&self) -> Vec<Object> {
        self.read().clone()
    }

    pub fn iter(&self) -> std::vec::IntoIter<Object> {
        self.to_vec().into_iter()
    }

    pub fn get_int(&self, index: usize, default: i64) -> i64 {
        match self.get_dereferenced(index) {
            Ok(Some(Object::Integer(i))) => i,
            Ok(Some(Object::Real(r))) => r.value() as i64,
            _ => default,
        }
    }

    pub fn get_float(&self, index: usize, default: f32) -> f32 {
        match self.get_dereferenced(index) {
            Ok(Some(value)) => value.as_real().unwrap_or(default),
            _ => default,
        }
    }

    pub fn get_name(&self, index: usize) -> Option<Name> {
        match self.get_dereferenced(index) {
            Ok(Some(Object::Name(name))) => Some(name),
            _ => None,
        }
    }

    pub fn get_name_or(&self, index: usize, default: &str) -> Name {
        self.get_name(index).unwrap_or_else(|| Name::new(default))
    }

    pub fn get_string(&self, index: usize) -> Option<PdfString> {
        match self.get_dereferenced(index) {
            Ok(Some(Object::String(s))) => Some(s),
            _ => None,
        }
    }

    pub fn get_text(&self, index: usize, default: &str) -> String {
        self.get_string(index)
            .map(|s| s.to_text())
            .unwrap_or_else(|| default.to_string())
    }

    /// Numeric elements as floats; anything else reads as zero.
    pub fn to_float_vec(&self) -> Vec<f32> {
        self.to_vec()
            .iter()
            .map(|e| e.dereference().as_real().unwrap_or(0.0))
            .collect()
    }

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

    pub fn report_update(&self) {
        self.notify(UpdateKind::Updated);
    }

    pub fn needs_update(&self) -> bool {
        self.0.state.needs_update()
    }

    pub fn id(&self) -> ContainerId {
        ContainerId::of(&self.0)
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakArray {
        WeakArray(Arc::downgrade(&self.0))
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Object>> for Array {
    fn from(elements: Vec<Object>) -> Self {
        Self::from_vec(elements)
    }
}

impl<T: Into<Object>> FromIterator<T> for Array {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        let theirs = other.to_vec();
        *self.read() == theirs
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.to_vec()).finish()
    }
}
