use std::collections::HashSet;
use std::ops::Deref;

use rekey_core::{Error, Row, Value};

use crate::definition::Definition;
use crate::plan::ExecutionPlan;
use crate::progress::Progress;

static NULL: Value = Value::Null;

/// Per-definition view of a run, handed to mappings, validations and hooks.
pub struct ExecutionContext<'a> {
    plan: &'a ExecutionPlan,
    current: &'a Definition,
    progress: &'a dyn Progress,
    completed: Option<&'a HashSet<String>>,
}

impl<'a> ExecutionContext<'a> {
    /// Context in which every definition of `plan` can be looked up.
    pub fn new(
        plan: &'a ExecutionPlan,
        current: &'a Definition,
        progress: &'a dyn Progress,
    ) -> Self {
        Self {
            plan,
            current,
            progress,
            completed: None,
        }
    }

    /// Context for a run in progress: only `completed` definitions and the
    /// current one can be looked up.
    pub fn in_run(
        plan: &'a ExecutionPlan,
        current: &'a Definition,
        progress: &'a dyn Progress,
        completed: &'a HashSet<String>,
    ) -> Self {
        Self {
            completed: Some(completed),
            ..Self::new(plan, current, progress)
        }
    }

    /// Name of the definition being executed.
    pub fn name(&self) -> &'a str {
        self.current.name()
    }

    pub fn current(&self) -> &'a Definition {
        self.current
    }

    /// Look up another definition of the resolved plan.
    ///
    /// Definitions left out of the run (not requested and not a transitive
    /// dependency) are missing here too, and so are definitions that have
    /// not run yet.
    pub fn definition(&self, name: &str) -> Result<&'a Definition, Error> {
        if name == self.current.name() {
            return Ok(self.current);
        }
        if let Some(completed) = self.completed {
            if !completed.contains(name) {
                return Err(Error::MissingDefinition(name.to_string()));
            }
        }
        self.plan.definition(name)
    }

    pub fn plan(&self) -> &'a ExecutionPlan {
        self.plan
    }

    pub fn progress(&self) -> &'a dyn Progress {
        self.progress
    }
}

/// Context for mapping blocks that address the legacy row by column name.
pub struct RowScope<'s, 'a> {
    context: &'s ExecutionContext<'a>,
    row: &'s Row,
}

impl<'s, 'a> RowScope<'s, 'a> {
    pub fn new(context: &'s ExecutionContext<'a>, row: &'s Row) -> Self {
        Self { context, row }
    }

    /// The whole legacy row.
    pub fn arguments(&self) -> &'s Row {
        self.row
    }

    /// A legacy column; absent columns read as null.
    pub fn argument(&self, column: &str) -> &'s Value {
        self.row.get(column).unwrap_or(&NULL)
    }

    pub fn context(&self) -> &'s ExecutionContext<'a> {
        self.context
    }
}

impl<'a> Deref for RowScope<'_, 'a> {
    type Target = ExecutionContext<'a>;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}
