use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::importer::ImportStats;

/// Options for running a manifest.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Directory for exported target tables. Defaults to the manifest's target dir.
    pub out_dir: Option<PathBuf>,
    /// Logging handle the run executes under.
    pub logger: Option<tracing::Dispatch>,
}

/// Outcome of one executed definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionReport {
    pub name: String,
    pub kind: String,
    #[serde(flatten)]
    pub stats: ImportStats,
    pub duration_ms: u64,
}

/// Report for a whole run, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub definitions: Vec<DefinitionReport>,
    pub totals: ImportStats,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exported_tables: Vec<PathBuf>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            definitions: Vec::new(),
            totals: ImportStats::default(),
            duration_ms: 0,
            exported_tables: Vec::new(),
        }
    }

    pub fn record(&mut self, definition: DefinitionReport) {
        self.totals.add(&definition.stats);
        self.definitions.push(definition);
    }

    /// Names of the executed definitions, in order.
    pub fn order(&self) -> Vec<&str> {
        self.definitions
            .iter()
            .map(|definition| definition.name.as_str())
            .collect()
    }

    pub fn definition(&self, name: &str) -> Option<&DefinitionReport> {
        self.definitions
            .iter()
            .find(|definition| definition.name == name)
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

/// A finished manifest run: the report plus where tables were written.
#[derive(Debug, Clone)]
pub struct ManifestRun {
    pub report: RunReport,
    pub out_dir: PathBuf,
}
