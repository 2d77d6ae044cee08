//! Pool Validators
//!
//! Checks the invariants a document pool must keep across edits.

pub mod pool_validator;

pub use pool_validator::{PoolValidator, ValidationError};
