//! # oxidize-cos
//!
//! The COS object model of a PDF library: typed low-level objects, lazily
//! resolved indirect references and the change tracking used for
//! incremental saves.
//!
//! ## Features
//!
//! - **Interned names**: equal names share one allocation
//! - **Object identity**: compact `n g R` keys usable in ordered and hashed maps
//! - **Shared containers**: dictionaries and arrays are cheap handles, so a
//!   nested container edited anywhere is edited everywhere
//! - **Lazy indirect objects**: proxies resolve on first access and fill in
//!   place, so forward references see the parsed value
//! - **Change tracking**: edits to direct objects mark their nearest indirect
//!   ancestor for rewriting
//! - **Streams**: encoded and decoded payloads with a pluggable filter registry
//!
//! ## Quick Start
//!
//! ```rust
//! use oxidize_cos::{CosDocument, Dictionary, Array, Name, Object};
//!
//! let doc = CosDocument::default();
//!
//! let page = Dictionary::new();
//! page.set("Type", Name::new("Page"));
//! let annots = Array::new();
//! page.set("Annots", annots.clone());
//!
//! let proxy = doc.add_object(page.clone());
//! doc.mark_saved();
//!
//! // Editing the nested array dirties the page that holds it
//! annots.add(Object::Null);
//! assert!(doc.is_dirty(proxy.key()));
//! assert!(page.needs_update());
//! ```
//!
//! ### Resolving objects from a source
//!
//! ```rust
//! use oxidize_cos::{CosDocument, DocumentOptions, MemorySource, ObjectKey, Object};
//!
//! let source = MemorySource::new();
//! source.insert(ObjectKey::from_parts(1, 0), 42);
//!
//! let doc = CosDocument::with_source(DocumentOptions::default(), source);
//! let proxy = doc.get_or_create_proxy(ObjectKey::from_parts(1, 0));
//! assert_eq!(proxy.resolve(), Object::Integer(42));
//!
//! // Missing objects read as null
//! assert!(doc.resolve(ObjectKey::from_parts(2, 0)).is_null());
//! ```
//!
//! ## Modules
//!
//! - [`objects`] - Names, primitives, keys, containers, streams and proxies
//! - [`document`] - Object pool, cross-reference table and trailer
//! - [`update`] - Observer protocol and change tracker
//! - [`filters`] - Stream filters
//! - [`source`] - Object sources used to resolve proxies
//! - [`config`] - Document options
//!
//! ## Threading
//!
//! Every type is `Send + Sync`. The name table and the object pool may be
//! shared freely. Containers take a lock per operation, but a sequence of
//! operations on one container is not atomic; callers editing the same
//! container from several threads must serialize those edits themselves.

pub mod config;
pub mod document;
pub mod error;
pub mod filters;
pub mod objects;
pub mod source;
pub mod update;

pub use config::{DocumentOptions, XrefMergePolicy};
pub use document::{CosDocument, PoolStats, XrefEntry, XrefTable};
pub use error::{PdfError, Result};
pub use filters::{DecodeResult, Filter, FilterRegistry};
pub use objects::{
    names, Array, Dictionary, MergePolicy, Name, NameTable, Object, ObjectKey, PdfString, Proxy,
    Real, Stream,
};
pub use source::{FnSource, MemorySource, ObjectSource};
pub use update::{ChangeTracker, UpdateEvent, UpdateKind, UpdateObserver};

/// Current version of oxidize-cos
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
