use std::fmt;

use rekey_core::{DEFAULT_LOOKUP, Row, Value};

use crate::context::{ExecutionContext, RowScope};
use crate::errors::Result;

static NULL: Value = Value::Null;

/// Block receiving the values of the listed legacy columns, in order.
pub type ColumnsBlock = Box<dyn Fn(&ExecutionContext<'_>, &[&Value]) -> Result<Row>>;
/// Block receiving the whole legacy row.
pub type RowBlock = Box<dyn Fn(&ExecutionContext<'_>, &Row) -> Result<Row>>;
/// Block addressing legacy columns by name through its scope.
pub type ScopeBlock = Box<dyn Fn(&RowScope<'_, '_>) -> Result<Row>>;

/// A single field-transformation step applied to each legacy row.
///
/// Rules run in declaration order against one output row; later rules may
/// overwrite fields set by earlier ones.
pub enum Mapping {
    /// Copy `row[from]` to `output[to]` when `from` is present.
    Rename { from: String, to: String },
    /// Call a block with the listed column values and merge its result.
    Columns { columns: Vec<String>, block: ColumnsBlock },
    /// Call a block with the whole row and merge its result.
    WholeRow { block: RowBlock },
    /// Call a block that reads columns by name and merge its result.
    Scoped { block: ScopeBlock },
    /// Re-key `row[from]` through another definition's lookup-table.
    Reference {
        definition: String,
        from: String,
        to: String,
        lookup: String,
    },
    /// Merge fixed values into every output row.
    Seed { values: Row },
}

impl Mapping {
    pub fn rename(from: impl Into<String>, to: impl Into<String>) -> Self {
        Mapping::Rename {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Block over named columns; absent columns are passed as null.
    pub fn columns<I, S, F>(columns: I, block: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&ExecutionContext<'_>, &[&Value]) -> Result<Row> + 'static,
    {
        Mapping::Columns {
            columns: columns.into_iter().map(Into::into).collect(),
            block: Box::new(block),
        }
    }

    pub fn whole_row<F>(block: F) -> Self
    where
        F: Fn(&ExecutionContext<'_>, &Row) -> Result<Row> + 'static,
    {
        Mapping::WholeRow {
            block: Box::new(block),
        }
    }

    pub fn scoped<F>(block: F) -> Self
    where
        F: Fn(&RowScope<'_, '_>) -> Result<Row> + 'static,
    {
        Mapping::Scoped {
            block: Box::new(block),
        }
    }

    /// Reference resolved through the referenced definition's `id` lookup.
    pub fn reference(
        definition: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::reference_by(definition, from, to, DEFAULT_LOOKUP)
    }

    pub fn reference_by(
        definition: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        lookup: impl Into<String>,
    ) -> Self {
        Mapping::Reference {
            definition: definition.into(),
            from: from.into(),
            to: to.into(),
            lookup: lookup.into(),
        }
    }

    pub fn seed(values: Row) -> Self {
        Mapping::Seed { values }
    }

    /// Apply the rule to `row`, writing into `output`.
    pub fn apply(&self, context: &ExecutionContext<'_>, row: &Row, output: &mut Row) -> Result<()> {
        match self {
            Mapping::Rename { from, to } => {
                if let Some(value) = row.get(from) {
                    output.insert(to.clone(), value.clone());
                }
            }
            Mapping::Columns { columns, block } => {
                let values: Vec<&Value> = columns
                    .iter()
                    .map(|column| row.get(column).unwrap_or(&NULL))
                    .collect();
                output.extend(block(context, &values)?);
            }
            Mapping::WholeRow { block } => {
                output.extend(block(context, row)?);
            }
            Mapping::Scoped { block } => {
                output.extend(block(&RowScope::new(context, row))?);
            }
            Mapping::Reference {
                definition,
                from,
                to,
                lookup,
            } => {
                let value = row.get(from).unwrap_or(&NULL);
                let identifier = context
                    .definition(definition)?
                    .identify_by(lookup, value)?
                    .unwrap_or(Value::Null);
                output.insert(to.clone(), identifier);
            }
            Mapping::Seed { values } => {
                output.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mapping::Rename { from, to } => f
                .debug_struct("Rename")
                .field("from", from)
                .field("to", to)
                .finish(),
            Mapping::Columns { columns, .. } => f
                .debug_struct("Columns")
                .field("columns", columns)
                .finish_non_exhaustive(),
            Mapping::WholeRow { .. } => f.debug_struct("WholeRow").finish_non_exhaustive(),
            Mapping::Scoped { .. } => f.debug_struct("Scoped").finish_non_exhaustive(),
            Mapping::Reference {
                definition,
                from,
                to,
                lookup,
            } => f
                .debug_struct("Reference")
                .field("definition", definition)
                .field("from", from)
                .field("to", to)
                .field("lookup", lookup)
                .finish(),
            Mapping::Seed { values } => f.debug_struct("Seed").field("values", values).finish(),
        }
    }
}
