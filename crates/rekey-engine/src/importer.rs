use rekey_core::Row;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::ExecutionContext;
use crate::definition::{Definition, Transform};
use crate::errors::Result;
use crate::io::{RowSink, transaction};

/// Row counters for one definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_skipped: u64,
}

impl ImportStats {
    pub fn add(&mut self, other: &ImportStats) {
        self.rows_read += other.rows_read;
        self.rows_written += other.rows_written;
        self.rows_skipped += other.rows_skipped;
    }
}

/// Executes one transform definition.
pub struct Importer<'c, 'a> {
    context: &'c ExecutionContext<'a>,
    definition: &'c Definition,
    transform: &'c Transform,
}

impl<'c, 'a> Importer<'c, 'a> {
    pub fn new(
        context: &'c ExecutionContext<'a>,
        definition: &'c Definition,
        transform: &'c Transform,
    ) -> Self {
        Self {
            context,
            definition,
            transform,
        }
    }

    /// Stream every source row into `sink`, then run the after hooks, all
    /// inside one transaction.
    pub fn run(&self, sink: &mut dyn RowSink) -> Result<ImportStats> {
        transaction(sink, |sink| {
            let stats = self.import_rows(sink)?;
            for hook in self.transform.after_hooks() {
                hook(self.context)?;
            }
            Ok(stats)
        })
    }

    fn import_rows(&self, sink: &mut dyn RowSink) -> Result<ImportStats> {
        let mut stats = ImportStats::default();
        let mut source = self.transform.source().try_borrow_mut().map_err(|_| {
            rekey_core::Error::Other(format!(
                "source of definition '{}' already borrowed",
                self.definition.name()
            ))
        })?;

        for row in source.rows()? {
            let row = self.context.plan().filter_row(row?);
            stats.rows_read += 1;
            if self.import_row(sink, &row)? {
                stats.rows_written += 1;
            } else {
                stats.rows_skipped += 1;
            }
            self.context.progress().increment();
        }
        Ok(stats)
    }

    /// Apply every mapping, in order, to a fresh output row.
    pub fn map_row(&self, row: &Row) -> Result<Row> {
        let mut output = Row::new();
        for mapping in self.transform.mappings() {
            mapping.apply(self.context, row, &mut output)?;
        }
        Ok(output)
    }

    /// Map, validate and write one row. Returns `false` when a validation
    /// rejected it.
    pub fn import_row(&self, sink: &mut dyn RowSink, row: &Row) -> Result<bool> {
        let mapped = self.map_row(row)?;
        for validation in self.transform.validations() {
            if !validation(self.context, row, &mapped)? {
                debug!(
                    definition = self.definition.name(),
                    row = ?row,
                    "row rejected by validation"
                );
                return Ok(false);
            }
        }

        let identifier = sink.write_row(&mapped)?;
        self.definition.row_imported(&identifier, row)?;
        for hook in self.transform.after_row_hooks() {
            hook(self.context, row, &mapped)?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::io::VecSource;
    use crate::mapping::Mapping;
    use crate::plan::ExecutionPlan;
    use crate::progress::{Progress, StepCounter};
    use crate::store::{InsertWriter, MemoryStore};
    use rekey_core::{Value, row};

    fn people() -> VecSource {
        VecSource::new(vec![
            row([
                ("ID", Value::Int(7)),
                ("Name", "Ada".into()),
                ("Sex", "f".into()),
            ]),
            row([
                ("ID", Value::Int(8)),
                ("Name", "Bob".into()),
                ("Sex", "m".into()),
            ]),
        ])
    }

    #[test]
    fn rejected_rows_are_not_written_or_registered() {
        let store = MemoryStore::new();
        let mut definition =
            Definition::transform("People", people(), InsertWriter::new(store.table("people")));
        definition
            .add_mapping(Mapping::rename("Name", "name"))
            .unwrap();
        definition
            .validate_row(|_, row, _| Ok(row.get("Sex") == Some(&Value::from("f"))))
            .unwrap();
        definition.lookup_for("id", Some("ID"), false).unwrap();

        let mut plan = ExecutionPlan::new();
        plan.add_definition(definition);
        let current = plan.definition("People").unwrap();
        let progress = StepCounter::new();
        progress.begin("People", current.total_steps_required());
        let context = ExecutionContext::new(&plan, current, &progress);

        let stats = current.run(&context).unwrap();
        progress.finish();
        assert_eq!(progress.steps_for("People"), Some(2));
        assert_eq!(
            stats,
            ImportStats {
                rows_read: 2,
                rows_written: 1,
                rows_skipped: 1
            }
        );

        let table = store.table("people");
        assert_eq!(table.borrow().rows().len(), 1);
        assert_eq!(
            table.borrow().rows()[0].get("name"),
            Some(&Value::from("Ada"))
        );
        assert_eq!(
            current.identify_by("id", &Value::Int(7)).unwrap(),
            Some(Value::Int(1))
        );
        assert_eq!(current.identify_by("id", &Value::Int(8)).unwrap(), None);
    }

    #[test]
    fn hooks_see_source_and_mapped_rows() {
        let seen: Rc<RefCell<Vec<String>>> = Rc::default();
        let store = MemoryStore::new();
        let mut definition =
            Definition::transform("People", people(), InsertWriter::new(store.table("people")));
        definition
            .add_mapping(Mapping::rename("Name", "name"))
            .unwrap();

        let per_row = Rc::clone(&seen);
        definition
            .after_row(move |_, source, mapped| {
                per_row.borrow_mut().push(format!(
                    "{}->{}",
                    source.get("Name").map(Value::to_string).unwrap_or_default(),
                    mapped.get("name").map(Value::to_string).unwrap_or_default()
                ));
                Ok(())
            })
            .unwrap();
        let after = Rc::clone(&seen);
        definition
            .after(move |context| {
                after.borrow_mut().push(format!("done {}", context.name()));
                Ok(())
            })
            .unwrap();

        let mut plan = ExecutionPlan::new();
        plan.add_definition(definition);
        let current = plan.definition("People").unwrap();
        let progress = StepCounter::new();
        progress.begin("People", current.total_steps_required());
        let context = ExecutionContext::new(&plan, current, &progress);
        current.run(&context).unwrap();
        progress.finish();

        assert_eq!(
            *seen.borrow(),
            vec!["Ada->Ada", "Bob->Bob", "done People"]
        );
        assert_eq!(progress.steps_for("People"), Some(2));
    }

    #[test]
    fn failing_row_rolls_back_the_definition() {
        let store = MemoryStore::new();
        let mut definition =
            Definition::transform("People", people(), InsertWriter::new(store.table("people")));
        definition
            .after_row(|_, source, _| {
                if source.get("ID") == Some(&Value::Int(8)) {
                    return Err(rekey_core::Error::Other("bad row".to_string()).into());
                }
                Ok(())
            })
            .unwrap();

        let mut plan = ExecutionPlan::new();
        plan.add_definition(definition);
        let current = plan.definition("People").unwrap();
        let progress = StepCounter::new();
        let context = ExecutionContext::new(&plan, current, &progress);

        assert!(current.run(&context).is_err());
        assert!(store.table("people").borrow().rows().is_empty());
    }

    #[test]
    fn failing_after_hook_rolls_back_the_definition() {
        let store = MemoryStore::new();
        let mut definition =
            Definition::transform("People", people(), InsertWriter::new(store.table("people")));
        definition
            .add_mapping(Mapping::rename("Name", "name"))
            .unwrap();
        definition
            .after(|_| Err(rekey_core::Error::Other("after failed".to_string()).into()))
            .unwrap();

        let mut plan = ExecutionPlan::new();
        plan.add_definition(definition);
        let current = plan.definition("People").unwrap();
        let progress = StepCounter::new();
        let context = ExecutionContext::new(&plan, current, &progress);

        assert!(current.run(&context).is_err());
        assert!(store.table("people").borrow().rows().is_empty());
    }
}
