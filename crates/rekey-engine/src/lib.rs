//! Execution engine for rekey.
//!
//! Resolves an execution plan into dependency order and imports each
//! definition row by row: rows are mapped, validated, written to the sink,
//! and their generated identifiers are fed back into lookup-tables so later
//! definitions can re-key their foreign keys.

pub mod build;
pub mod context;
pub mod definition;
pub mod errors;
pub mod importer;
pub mod io;
pub mod mapping;
pub mod model;
pub mod output;
pub mod plan;
pub mod progress;
pub mod resolver;
pub mod runner;
pub mod store;

pub use build::{BuiltPlan, build_plan, run_manifest};
pub use context::{ExecutionContext, RowScope};
pub use definition::{Definition, DefinitionKind, Transform};
pub use errors::{ImportError, Result};
pub use importer::{ImportStats, Importer};
pub use io::{RowSink, RowSource, VecSource, transaction};
pub use mapping::Mapping;
pub use model::{DefinitionReport, ManifestRun, RunOptions, RunReport};
pub use output::csv::{CsvSource, write_table_csv};
pub use plan::ExecutionPlan;
pub use progress::{LogProgress, NoProgress, Progress, StepCounter};
pub use resolver::DependencyResolver;
pub use runner::{Runner, run_plan};
pub use store::{InsertWriter, MemoryStore, MemoryTable, UniqueWriter, UpdateWriter};
