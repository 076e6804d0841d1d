//! Core contracts and helpers for rekey.
//!
//! This crate defines the row/value model, the shared error type, the
//! dependency resolver used to order definitions, and the lookup registry
//! that carries generated identifiers between definitions of a run.

pub mod error;
pub mod graph;
pub mod lookup;
pub mod value;

pub use error::{Error, Result};
pub use graph::{
    DependencyGraph, DependencyReport, DependencySummary, build_dependency_report, resolve_order,
};
pub use lookup::{LookupKey, LookupRegistry, LookupTable};
pub use value::{Row, Value, row};

/// Name of the lookup used by reference mappings when none is given.
pub const DEFAULT_LOOKUP: &str = "id";
