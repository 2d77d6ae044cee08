//! Pool Validator
//!
//! Checks the bookkeeping a writer relies on before an incremental save.

use oxidize_cos::{CosDocument, ObjectKey};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("proxy registered under {registered} reports key {reported}")]
    KeyMismatch {
        registered: ObjectKey,
        reported: ObjectKey,
    },

    #[error("pool returned two proxies for {0}")]
    DuplicateProxy(ObjectKey),

    #[error("objects to update are not in ascending key order at {0}")]
    UnorderedUpdate(ObjectKey),

    #[error("object {0} is flagged direct but listed for rewriting")]
    DirectObjectListed(ObjectKey),

    #[error("dirty object {0} is missing from the update list")]
    DirtyObjectOmitted(ObjectKey),

    #[error("object {0} exceeds the highest object number {1}")]
    NumberOutOfRange(ObjectKey, u64),
}

/// Validates pool invariants of a document.
#[derive(Debug, Default)]
pub struct PoolValidator {
    errors: Vec<ValidationError>,
}

impl PoolValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every check. Returns the problems found.
    pub fn validate(mut self, document: &CosDocument) -> Vec<ValidationError> {
        self.check_identity(document);
        self.check_updates(document);
        self.errors
    }

    fn check_identity(&mut self, document: &CosDocument) {
        let highest = document.highest_object_number();
        for key in document.keys() {
            let Some(proxy) = document.get_proxy(key) else {
                continue;
            };
            if proxy.key() != key {
                self.errors.push(ValidationError::KeyMismatch {
                    registered: key,
                    reported: proxy.key(),
                });
            }
            if !proxy.ptr_eq(&document.get_or_create_proxy(key)) {
                self.errors.push(ValidationError::DuplicateProxy(key));
            }
            if key.number() > highest {
                self.errors.push(ValidationError::NumberOutOfRange(key, highest));
            }
        }
    }

    fn check_updates(&mut self, document: &CosDocument) {
        let tracker = document.change_tracker();
        let updates = document.objects_to_update();

        for pair in updates.windows(2) {
            if pair[0].0 >= pair[1].0 {
                self.errors.push(ValidationError::UnorderedUpdate(pair[1].0));
            }
        }

        let listed: HashSet<ObjectKey> = updates.iter().map(|(key, _)| *key).collect();
        for key in &listed {
            if tracker.is_direct(*key) {
                self.errors.push(ValidationError::DirectObjectListed(*key));
            }
        }

        for key in tracker.dirty_keys() {
            let pooled = document.contains(key);
            if pooled && !tracker.is_direct(key) && !listed.contains(&key) {
                self.errors.push(ValidationError::DirtyObjectOmitted(key));
            }
        }
    }
}
