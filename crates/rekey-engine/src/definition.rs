use std::cell::RefCell;
use std::fmt;

use rekey_core::{Error, LookupRegistry, Row, Value};

use crate::context::ExecutionContext;
use crate::errors::Result;
use crate::importer::{ImportStats, Importer};
use crate::io::{RowSink, RowSource, transaction};
use crate::mapping::Mapping;

/// Validation over `(context, source row, mapped row)`; `false` skips the row.
pub type RowValidation = Box<dyn Fn(&ExecutionContext<'_>, &Row, &Row) -> Result<bool>>;
/// Hook called after a row was written, with the source and mapped rows.
pub type RowHook = Box<dyn Fn(&ExecutionContext<'_>, &Row, &Row) -> Result<()>>;
/// Hook called once after every row of a definition was imported.
pub type AfterHook = Box<dyn Fn(&ExecutionContext<'_>) -> Result<()>>;
/// Body of a script definition. Runs once inside a sink transaction.
pub type ScriptBody = Box<dyn Fn(&ExecutionContext<'_>, &mut dyn RowSink) -> Result<()>>;

/// Named unit of migration work.
pub struct Definition {
    name: String,
    dependencies: Vec<String>,
    lookups: RefCell<LookupRegistry>,
    sink: RefCell<Box<dyn RowSink>>,
    kind: DefinitionKind,
}

/// What a definition does when it runs.
pub enum DefinitionKind {
    /// Stream rows from a source through mappings into the sink.
    Transform(Transform),
    /// Run a single body with the sink.
    Script(Option<ScriptBody>),
}

/// Row pipeline of a transform definition.
pub struct Transform {
    source: RefCell<Box<dyn RowSource>>,
    mappings: Vec<Mapping>,
    validations: Vec<RowValidation>,
    after_row: Vec<RowHook>,
    after: Vec<AfterHook>,
}

impl Transform {
    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub(crate) fn source(&self) -> &RefCell<Box<dyn RowSource>> {
        &self.source
    }

    pub(crate) fn validations(&self) -> &[RowValidation] {
        &self.validations
    }

    pub(crate) fn after_row_hooks(&self) -> &[RowHook] {
        &self.after_row
    }

    pub(crate) fn after_hooks(&self) -> &[AfterHook] {
        &self.after
    }
}

impl Definition {
    pub fn transform(
        name: impl Into<String>,
        source: impl RowSource + 'static,
        sink: impl RowSink + 'static,
    ) -> Self {
        Self::with_kind(
            name.into(),
            sink,
            DefinitionKind::Transform(Transform {
                source: RefCell::new(Box::new(source)),
                mappings: Vec::new(),
                validations: Vec::new(),
                after_row: Vec::new(),
                after: Vec::new(),
            }),
        )
    }

    /// Script definition without a body yet; see [`Definition::set_body`].
    pub fn script(name: impl Into<String>, sink: impl RowSink + 'static) -> Self {
        Self::with_kind(name.into(), sink, DefinitionKind::Script(None))
    }

    fn with_kind(name: String, sink: impl RowSink + 'static, kind: DefinitionKind) -> Self {
        Self {
            name,
            dependencies: Vec::new(),
            lookups: RefCell::new(LookupRegistry::new()),
            sink: RefCell::new(Box::new(sink)),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn kind(&self) -> &DefinitionKind {
        &self.kind
    }

    pub fn is_script(&self) -> bool {
        matches!(self.kind, DefinitionKind::Script(_))
    }

    pub fn add_dependency(&mut self, name: impl Into<String>) {
        self.dependencies.push(name.into());
    }

    pub fn add_mapping(&mut self, mapping: Mapping) -> rekey_core::Result<()> {
        self.transform_mut("mappings")?.mappings.push(mapping);
        Ok(())
    }

    pub fn validate_row<F>(&mut self, validation: F) -> rekey_core::Result<()>
    where
        F: Fn(&ExecutionContext<'_>, &Row, &Row) -> Result<bool> + 'static,
    {
        self.transform_mut("row validations")?
            .validations
            .push(Box::new(validation));
        Ok(())
    }

    pub fn after_row<F>(&mut self, hook: F) -> rekey_core::Result<()>
    where
        F: Fn(&ExecutionContext<'_>, &Row, &Row) -> Result<()> + 'static,
    {
        self.transform_mut("row hooks")?.after_row.push(Box::new(hook));
        Ok(())
    }

    pub fn after<F>(&mut self, hook: F) -> rekey_core::Result<()>
    where
        F: Fn(&ExecutionContext<'_>) -> Result<()> + 'static,
    {
        self.transform_mut("after hooks")?.after.push(Box::new(hook));
        Ok(())
    }

    pub fn set_body<F>(&mut self, body: F) -> rekey_core::Result<()>
    where
        F: Fn(&ExecutionContext<'_>, &mut dyn RowSink) -> Result<()> + 'static,
    {
        match &mut self.kind {
            DefinitionKind::Script(slot) => {
                *slot = Some(Box::new(body));
                Ok(())
            }
            DefinitionKind::Transform(_) => Err(Error::Other(format!(
                "transform definition '{}' does not take a script body",
                self.name
            ))),
        }
    }

    fn transform_mut(&mut self, what: &str) -> rekey_core::Result<&mut Transform> {
        match &mut self.kind {
            DefinitionKind::Transform(transform) => Ok(transform),
            DefinitionKind::Script(_) => Err(Error::Other(format!(
                "script definition '{}' does not take {what}",
                self.name
            ))),
        }
    }

    /// Register a lookup-table on `attribute`, read from `column` (defaults
    /// to the attribute name).
    pub fn lookup_for(
        &self,
        attribute: &str,
        column: Option<&str>,
        ignore_case: bool,
    ) -> rekey_core::Result<()> {
        self.lookups_mut()?.lookup_for(attribute, column, ignore_case)
    }

    pub fn has_lookup_table_on(&self, attribute: &str) -> rekey_core::Result<bool> {
        let lookups = self.lookups.try_borrow().map_err(|_| self.busy("lookups"))?;
        Ok(lookups.has_lookup_table_on(attribute))
    }

    /// Record a generated identifier against the lookup columns of `row`.
    pub fn row_imported(&self, identifier: &Value, row: &Row) -> rekey_core::Result<()> {
        self.lookups_mut()?.row_imported(identifier, row);
        Ok(())
    }

    /// Translate a legacy value into the identifier generated for it.
    pub fn identify_by(&self, attribute: &str, value: &Value) -> rekey_core::Result<Option<Value>> {
        let lookups = self.lookups.try_borrow().map_err(|_| self.busy("lookups"))?;
        lookups.identify_by(attribute, value)
    }

    fn lookups_mut(&self) -> rekey_core::Result<std::cell::RefMut<'_, LookupRegistry>> {
        self.lookups.try_borrow_mut().map_err(|_| self.busy("lookups"))
    }

    fn busy(&self, what: &str) -> Error {
        Error::Other(format!("{what} of definition '{}' already borrowed", self.name))
    }

    /// Steps used to size progress: the source row count when known, else 1.
    pub fn total_steps_required(&self) -> u64 {
        match &self.kind {
            DefinitionKind::Transform(transform) => transform
                .source
                .try_borrow()
                .ok()
                .and_then(|source| source.row_count())
                .unwrap_or(1),
            DefinitionKind::Script(_) => 1,
        }
    }

    /// Execute the definition. `context.current()` must be this definition.
    pub fn run(&self, context: &ExecutionContext<'_>) -> Result<ImportStats> {
        let mut sink = self.sink.try_borrow_mut().map_err(|_| self.busy("sink"))?;
        match &self.kind {
            DefinitionKind::Transform(transform) => {
                Importer::new(context, self, transform).run(&mut **sink)
            }
            DefinitionKind::Script(body) => {
                if let Some(body) = body {
                    transaction(&mut **sink, |sink| body(context, sink))?;
                }
                context.progress().increment();
                Ok(ImportStats::default())
            }
        }
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Definition");
        out.field("name", &self.name)
            .field("dependencies", &self.dependencies);
        match &self.kind {
            DefinitionKind::Transform(transform) => {
                out.field("kind", &"transform")
                    .field("mappings", &transform.mappings);
            }
            DefinitionKind::Script(body) => {
                out.field("kind", &"script")
                    .field("has_body", &body.is_some());
            }
        }
        out.finish_non_exhaustive()
    }
}
