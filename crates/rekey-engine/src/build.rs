use std::collections::BTreeSet;
use std::path::Path;

use rekey_plan::{
    DefinitionConfig, Manifest, MappingConfig, ValidationRule, WriteMode, load_manifest, validate,
};
use tracing::{info, warn};

use crate::definition::Definition;
use crate::errors::{ImportError, Result};
use crate::io::RowSink;
use crate::mapping::Mapping;
use crate::model::{ManifestRun, RunOptions};
use crate::output::csv::CsvSource;
use crate::plan::ExecutionPlan;
use crate::runner::Runner;
use crate::store::{InsertWriter, MemoryStore, UniqueWriter, UpdateWriter};

/// Execution plan built from a manifest, with the store its sinks write to.
#[derive(Debug)]
pub struct BuiltPlan {
    pub plan: ExecutionPlan,
    pub store: MemoryStore,
}

/// Turn a manifest into an execution plan over CSV sources and an in-memory
/// target store.
///
/// Target tables that already exist as CSV files in the target directory are
/// loaded first so `update` and `unique` definitions can match them.
pub fn build_plan(manifest: &Manifest) -> Result<BuiltPlan> {
    let store = MemoryStore::new();
    let mut preloaded = BTreeSet::new();
    let mut plan = ExecutionPlan::new();

    for config in &manifest.definitions {
        if preloaded.insert(config.to.as_str()) {
            let existing = manifest.target.dir.join(format!("{}.csv", config.to));
            if existing.is_file() {
                store.load_table_csv(&config.to, config.primary_key(), &existing)?;
            }
        }
        plan.add_definition(build_definition(manifest, config, &store)?);
    }

    Ok(BuiltPlan { plan, store })
}

fn build_definition(
    manifest: &Manifest,
    config: &DefinitionConfig,
    store: &MemoryStore,
) -> Result<Definition> {
    let source = CsvSource::new(manifest.source.dir.join(format!("{}.csv", config.from)));
    let table = store.table_with_key(&config.to, config.primary_key());
    let sink: Box<dyn RowSink> = match config.mode {
        WriteMode::Insert => Box::new(InsertWriter::new(table)),
        WriteMode::Update => Box::new(UpdateWriter::new(table)),
        WriteMode::Unique => Box::new(UniqueWriter::new(table, config.unique_columns.clone())),
    };

    let mut definition = Definition::transform(config.name.clone(), source, sink);
    for dependency in &config.dependencies {
        definition.add_dependency(dependency.clone());
    }
    for lookup in &config.lookups {
        definition.lookup_for(&lookup.attribute, lookup.column.as_deref(), lookup.ignore_case)?;
    }
    for mapping in &config.mappings {
        definition.add_mapping(mapping_from_config(mapping))?;
    }
    for rule in &config.validations {
        match rule.clone() {
            ValidationRule::NotNull { column } => definition.validate_row(move |_, _, mapped| {
                Ok(mapped.get(&column).is_some_and(|value| !value.is_null()))
            })?,
            ValidationRule::Equals { column, value } => definition
                .validate_row(move |_, _, mapped| Ok(mapped.get(&column) == Some(&value)))?,
        }
    }
    Ok(definition)
}

fn mapping_from_config(config: &MappingConfig) -> Mapping {
    match config {
        MappingConfig::Rename { from, to } => Mapping::rename(from, to),
        MappingConfig::Reference {
            definition,
            from,
            to,
            lookup,
        } => match lookup {
            Some(lookup) => Mapping::reference_by(definition, from, to, lookup),
            None => Mapping::reference(definition, from, to),
        },
        MappingConfig::Seed { values } => Mapping::seed(values.clone()),
    }
}

/// Load, validate, build and run a manifest, then export the written tables.
pub fn run_manifest(
    path: &Path,
    only: Option<&[String]>,
    options: &RunOptions,
) -> Result<ManifestRun> {
    match &options.logger {
        Some(logger) => {
            tracing::dispatcher::with_default(logger, || run_manifest_inner(path, only, options))
        }
        None => run_manifest_inner(path, only, options),
    }
}

fn run_manifest_inner(
    path: &Path,
    only: Option<&[String]>,
    options: &RunOptions,
) -> Result<ManifestRun> {
    let validated = validate(load_manifest(path)?).map_err(ImportError::InvalidManifest)?;
    for issue in &validated.warnings {
        warn!(code = %issue.code, path = %issue.path, "{}", issue.message);
    }

    let built = build_plan(&validated.manifest)?;
    let mut report = Runner::new(&built.plan).run(only)?;

    let out_dir = options
        .out_dir
        .clone()
        .unwrap_or_else(|| validated.manifest.target.dir.clone());
    report.exported_tables = built.store.export_csv(&out_dir)?;
    info!(
        out_dir = %out_dir.display(),
        tables = report.exported_tables.len(),
        "exported target tables"
    );

    Ok(ManifestRun { report, out_dir })
}
