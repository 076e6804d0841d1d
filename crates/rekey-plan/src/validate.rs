use std::collections::{BTreeMap, BTreeSet};

use rekey_core::{DependencyGraph, build_dependency_report};

use crate::errors::{ValidationIssue, ValidationReport};
use crate::model::{
    DefinitionConfig, MANIFEST_VERSION, Manifest, MappingConfig, ValidationRule, WriteMode,
};

/// Validated manifest with accumulated warnings.
#[derive(Debug, Clone)]
pub struct ValidatedManifest {
    pub manifest: Manifest,
    pub warnings: Vec<ValidationIssue>,
}

/// Validate the manifest end-to-end, returning structured issues on failure.
pub fn validate(manifest: Manifest) -> Result<ValidatedManifest, ValidationReport> {
    let report = validate_manifest(&manifest);
    if !report.is_ok() {
        return Err(report);
    }
    Ok(ValidatedManifest {
        manifest,
        warnings: report.warnings,
    })
}

/// Check a parsed manifest for problems the engine would only hit mid-run.
pub fn validate_manifest(manifest: &Manifest) -> ValidationReport {
    let mut report = ValidationReport::default();

    if manifest.manifest_version != MANIFEST_VERSION {
        report.push(ValidationIssue::error(
            "manifest_version_mismatch",
            "/manifest_version",
            format!(
                "manifest_version '{}' is not supported (expected '{}')",
                manifest.manifest_version, MANIFEST_VERSION
            ),
            None,
        ));
    }

    let index = build_definition_index(manifest, &mut report);

    for (position, definition) in manifest.definitions.iter().enumerate() {
        let path = format!("/definitions/{position}");
        validate_dependencies(definition, &path, &index, &mut report);
        validate_lookups(definition, &path, &mut report);
        validate_mode(definition, &path, &mut report);
        validate_mappings(definition, &path, &index, &mut report);
        validate_rules(definition, &path, &mut report);
    }

    validate_graph(manifest, &mut report);

    report
}

/// Last definition with a given name wins, matching plan semantics.
fn build_definition_index<'a>(
    manifest: &'a Manifest,
    report: &mut ValidationReport,
) -> BTreeMap<&'a str, &'a DefinitionConfig> {
    let mut index = BTreeMap::new();
    for (position, definition) in manifest.definitions.iter().enumerate() {
        if index.insert(definition.name.as_str(), definition).is_some() {
            report.push(ValidationIssue::warning(
                "duplicate_definition",
                format!("/definitions/{position}/name"),
                format!(
                    "definition '{}' is declared more than once; the last one is used",
                    definition.name
                ),
                Some("rename or remove one of the definitions".to_string()),
            ));
        }
    }
    index
}

fn validate_dependencies(
    definition: &DefinitionConfig,
    path: &str,
    index: &BTreeMap<&str, &DefinitionConfig>,
    report: &mut ValidationReport,
) {
    for (position, dependency) in definition.dependencies.iter().enumerate() {
        if !index.contains_key(dependency.as_str()) {
            report.push(ValidationIssue::error(
                "unknown_dependency",
                format!("{path}/dependencies/{position}"),
                format!(
                    "definition '{}' depends on unknown definition '{dependency}'",
                    definition.name
                ),
                None,
            ));
        }
    }
}

fn validate_lookups(definition: &DefinitionConfig, path: &str, report: &mut ValidationReport) {
    let mut attributes = BTreeSet::new();
    let mut columns = BTreeSet::new();
    for (position, lookup) in definition.lookups.iter().enumerate() {
        let column = lookup.column.as_deref().unwrap_or(&lookup.attribute);
        if !attributes.insert(lookup.attribute.as_str()) || !columns.insert(column) {
            report.push(ValidationIssue::error(
                "duplicate_lookup",
                format!("{path}/lookups/{position}"),
                format!(
                    "lookup-table for column '{column}' was already defined on '{}'",
                    definition.name
                ),
                None,
            ));
        }
    }
}

fn validate_mode(definition: &DefinitionConfig, path: &str, report: &mut ValidationReport) {
    match definition.mode {
        WriteMode::Unique if definition.unique_columns.is_empty() => {
            report.push(ValidationIssue::error(
                "unique_without_columns",
                format!("{path}/unique_columns"),
                format!("definition '{}' uses unique mode without columns", definition.name),
                Some("list the identity columns in unique_columns".to_string()),
            ));
        }
        WriteMode::Insert | WriteMode::Update if !definition.unique_columns.is_empty() => {
            report.push(ValidationIssue::warning(
                "unique_columns_ignored",
                format!("{path}/unique_columns"),
                format!(
                    "unique_columns on '{}' only apply in unique mode",
                    definition.name
                ),
                None,
            ));
        }
        _ => {}
    }
}

fn validate_mappings(
    definition: &DefinitionConfig,
    path: &str,
    index: &BTreeMap<&str, &DefinitionConfig>,
    report: &mut ValidationReport,
) {
    for (position, mapping) in definition.mappings.iter().enumerate() {
        let MappingConfig::Reference {
            definition: referenced,
            lookup,
            ..
        } = mapping
        else {
            continue;
        };
        let mapping_path = format!("{path}/mappings/{position}");

        let Some(target) = index.get(referenced.as_str()) else {
            report.push(ValidationIssue::error(
                "unknown_reference",
                format!("{mapping_path}/definition"),
                format!("reference to unknown definition '{referenced}'"),
                None,
            ));
            continue;
        };

        let lookup = lookup.as_deref().unwrap_or(rekey_core::DEFAULT_LOOKUP);
        if !target.lookups.iter().any(|l| l.attribute == lookup) {
            report.push(ValidationIssue::error(
                "undeclared_lookup",
                format!("{mapping_path}/lookup"),
                format!("definition '{referenced}' declares no lookup named '{lookup}'"),
                Some(format!(
                    "add {{ attribute = \"{lookup}\" }} to the lookups of '{referenced}'"
                )),
            ));
        }

        if referenced != &definition.name && !definition.dependencies.contains(referenced) {
            report.push(ValidationIssue::warning(
                "reference_without_dependency",
                format!("{mapping_path}/definition"),
                format!(
                    "'{}' references '{referenced}' without depending on it",
                    definition.name
                ),
                Some(format!("add '{referenced}' to dependencies")),
            ));
        }
    }
}

fn validate_rules(definition: &DefinitionConfig, path: &str, report: &mut ValidationReport) {
    for (position, rule) in definition.validations.iter().enumerate() {
        let column = match rule {
            ValidationRule::NotNull { column } | ValidationRule::Equals { column, .. } => column,
        };
        if column.is_empty() {
            report.push(ValidationIssue::error(
                "empty_validation_column",
                format!("{path}/validations/{position}/column"),
                "validation column must not be empty",
                None,
            ));
        }
    }
}

fn validate_graph(manifest: &Manifest, report: &mut ValidationReport) {
    if !report.is_ok() {
        return;
    }

    // Re-declared names keep their first position with the last dependencies.
    let graph: DependencyGraph = manifest
        .definitions
        .iter()
        .map(|definition| (definition.name.as_str(), definition.dependencies.clone()))
        .collect();

    if let Some(cycle) = build_dependency_report(&graph, None).cycle {
        report.push(ValidationIssue::error(
            "dependency_cycle",
            "/definitions",
            format!("definitions depend on each other: {}", cycle.join(", ")),
            None,
        ));
    }
}
