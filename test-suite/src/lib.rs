//! Test Suite for oxidize-cos
//!
//! Object graph generators, pool validators and the cross-module tests that
//! drive a document the way a parser and an incremental writer would.

pub mod generators;
pub mod validators;

pub use generators::{GeneratedDocument, GraphGenerator};
pub use validators::{PoolValidator, ValidationError};

/// Common test utilities
pub mod utils {
    use std::sync::Once;

    static TRACING: Once = Once::new();

    /// Install a tracing subscriber honoring `RUST_LOG`. Safe to call from
    /// every test.
    pub fn init_tracing() {
        TRACING.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}
