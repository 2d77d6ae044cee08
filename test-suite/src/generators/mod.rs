//! Object Graph Generators
//!
//! Utilities for building documents and object graphs programmatically.

pub mod object_graphs;
pub mod strategies;

pub use object_graphs::{GeneratedDocument, GraphGenerator};
