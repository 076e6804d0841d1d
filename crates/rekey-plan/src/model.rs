use std::path::{Path, PathBuf};

use rekey_core::{Row, Value};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Contract version for the manifest format.
pub const MANIFEST_VERSION: &str = "0.1";

/// A directory holding one CSV file per table.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Location {
    /// Directory path, relative to the manifest file when not absolute.
    pub dir: PathBuf,
}

/// How rows are written to the target table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Always create a new record.
    #[default]
    Insert,
    /// Update the record named by the row's identifier column.
    Update,
    /// Reuse an existing record whose `unique_columns` match.
    Unique,
}

/// Lookup-table declared on a definition.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LookupConfig {
    /// Name used by reference mappings.
    pub attribute: String,
    /// Legacy column read from imported rows (defaults to `attribute`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(default)]
    pub ignore_case: bool,
}

/// Column mapping union.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MappingConfig {
    /// Copy a legacy column under a new name.
    Rename { from: String, to: String },
    /// Resolve a legacy key through another definition's lookup-table.
    Reference {
        definition: String,
        from: String,
        to: String,
        /// Lookup name on the referenced definition (defaults to `id`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lookup: Option<String>,
    },
    /// Add fixed values to every row.
    Seed { values: Row },
}

/// Declarative row validation evaluated against the mapped row.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationRule {
    /// Skip rows whose column is absent or null.
    NotNull { column: String },
    /// Skip rows whose column differs from `value`.
    Equals { column: String, value: Value },
}

/// One unit of migration work.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DefinitionConfig {
    pub name: String,
    /// Legacy table name (`<source dir>/<from>.csv`).
    pub from: String,
    /// Target table name.
    pub to: String,
    #[serde(default)]
    pub mode: WriteMode,
    /// Identity columns for `unique` mode.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_columns: Vec<String>,
    /// Identifier column of the target table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lookups: Vec<LookupConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mappings: Vec<MappingConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validations: Vec<ValidationRule>,
}

impl DefinitionConfig {
    pub fn primary_key(&self) -> &str {
        self.primary_key.as_deref().unwrap_or(rekey_core::DEFAULT_LOOKUP)
    }
}

/// Canonical migration manifest.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Manifest {
    /// Contract version for the manifest format.
    pub manifest_version: String,
    /// Where legacy tables are read from.
    pub source: Location,
    /// Where migrated tables are written to.
    pub target: Location,
    #[serde(default)]
    pub definitions: Vec<DefinitionConfig>,
}

impl Manifest {
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Make relative source/target directories relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for location in [&mut self.source, &mut self.target] {
            if location.dir.is_relative() {
                location.dir = base.join(&location.dir);
            }
        }
    }

    pub fn definition(&self, name: &str) -> Option<&DefinitionConfig> {
        self.definitions.iter().rev().find(|def| def.name == name)
    }
}

/// Read a manifest file, resolving its directories next to the file.
pub fn load_manifest(path: &Path) -> Result<Manifest> {
    let contents = std::fs::read_to_string(path)?;
    let mut manifest = Manifest::from_toml(&contents)?;
    if let Some(parent) = path.parent() {
        manifest.resolve_paths(parent);
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
manifest_version = "0.1"
source = { dir = "legacy" }
target = { dir = "out" }

[[definitions]]
name = "Articles"
from = "tblArticles"
to = "articles"
lookups = [
  { attribute = "sArticleId" },
  { attribute = "reference", column = "strRef", ignore_case = true },
]
mappings = [{ type = "rename", from = "strRef", to = "slug" }]

[[definitions]]
name = "Posts"
from = "tblPosts"
to = "posts"
mode = "unique"
unique_columns = ["id"]
dependencies = ["Articles"]
mappings = [
  { type = "rename", from = "sPostId", to = "id" },
  { type = "reference", definition = "Articles", from = "sArticleId", to = "article_id", lookup = "sArticleId" },
  { type = "seed", values = { origin = "legacy", version = 2 } },
]
validations = [{ type = "equals", column = "origin", value = "legacy" }]
"#;

    #[test]
    fn parses_toml_manifest() {
        let manifest = Manifest::from_toml(MANIFEST).expect("parse manifest");
        assert_eq!(manifest.definitions.len(), 2);

        let articles = &manifest.definitions[0];
        assert_eq!(articles.mode, WriteMode::Insert);
        assert_eq!(articles.primary_key(), "id");
        assert_eq!(articles.lookups[1].column.as_deref(), Some("strRef"));
        assert!(articles.lookups[1].ignore_case);

        let posts = &manifest.definitions[1];
        assert_eq!(posts.mode, WriteMode::Unique);
        assert_eq!(posts.dependencies, vec!["Articles".to_string()]);
        match &posts.mappings[2] {
            MappingConfig::Seed { values } => {
                assert_eq!(values.get("version"), Some(&Value::Int(2)));
            }
            other => panic!("unexpected mapping: {other:?}"),
        }
        assert!(matches!(
            &posts.validations[0],
            ValidationRule::Equals { value: Value::Text(text), .. } if text == "legacy"
        ));
    }

    #[test]
    fn resolves_relative_directories() {
        let mut manifest = Manifest::from_toml(MANIFEST).expect("parse manifest");
        manifest.resolve_paths(Path::new("/migrations/shop"));
        assert_eq!(manifest.source.dir, PathBuf::from("/migrations/shop/legacy"));
        assert_eq!(manifest.target.dir, PathBuf::from("/migrations/shop/out"));
    }
}
