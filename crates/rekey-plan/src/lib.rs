//! Manifest contracts and validation.
//!
//! A manifest is the declarative, closure-free description of a migration:
//! where legacy tables are read from, where new tables are written, and how
//! each definition renames, seeds and re-keys columns.

pub mod errors;
pub mod model;
pub mod schema;
pub mod validate;

pub use errors::{IssueSeverity, PlanError, Result, ValidationIssue, ValidationReport};
pub use model::{
    DefinitionConfig, Location, LookupConfig, MANIFEST_VERSION, Manifest, MappingConfig,
    ValidationRule, WriteMode, load_manifest,
};
pub use schema::manifest_json_schema;
pub use validate::{ValidatedManifest, validate, validate_manifest};
