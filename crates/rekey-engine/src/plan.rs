use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use rekey_core::{DependencyGraph, Error, Row};

use crate::definition::Definition;

/// Filter applied to every legacy row before it is mapped.
pub type RowFilter = Box<dyn Fn(Row) -> Row>;

/// Name-keyed, insertion-ordered collection of definitions.
///
/// Re-adding a name replaces the definition but keeps its first position.
#[derive(Default)]
pub struct ExecutionPlan {
    definitions: Vec<Rc<Definition>>,
    index: HashMap<String, usize>,
    before_filter: Option<Rc<RowFilter>>,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_definition(&mut self, definition: Definition) {
        self.add_shared(Rc::new(definition));
    }

    pub(crate) fn add_shared(&mut self, definition: Rc<Definition>) {
        match self.index.get(definition.name()) {
            Some(&position) => self.definitions[position] = definition,
            None => {
                self.index
                    .insert(definition.name().to_string(), self.definitions.len());
                self.definitions.push(definition);
            }
        }
    }

    pub fn definition(&self, name: &str) -> Result<&Definition, Error> {
        self.shared(name).map(Rc::as_ref)
    }

    pub(crate) fn shared(&self, name: &str) -> Result<&Rc<Definition>, Error> {
        self.index
            .get(name)
            .map(|&position| &self.definitions[position])
            .ok_or_else(|| Error::MissingDefinition(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &Definition> {
        self.definitions.iter().map(Rc::as_ref)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|definition| definition.name())
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Install a filter run on every legacy row of every transform definition.
    pub fn before_filter<F>(&mut self, filter: F)
    where
        F: Fn(Row) -> Row + 'static,
    {
        self.before_filter = Some(Rc::new(Box::new(filter)));
    }

    pub fn filter_row(&self, row: Row) -> Row {
        match &self.before_filter {
            Some(filter) => filter(row),
            None => row,
        }
    }

    pub(crate) fn shared_filter(&self) -> Option<Rc<RowFilter>> {
        self.before_filter.clone()
    }

    pub(crate) fn set_shared_filter(&mut self, filter: Option<Rc<RowFilter>>) {
        self.before_filter = filter;
    }

    pub fn dependency_graph(&self) -> DependencyGraph {
        self.definitions
            .iter()
            .map(|definition| (definition.name(), definition.dependencies().to_vec()))
            .collect()
    }
}

impl fmt::Debug for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionPlan")
            .field("definitions", &self.definitions)
            .field("before_filter", &self.before_filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::VecSource;
    use crate::store::{InsertWriter, MemoryStore};

    fn definition(name: &str, dependencies: &[&str]) -> Definition {
        let store = MemoryStore::new();
        let mut definition =
            Definition::transform(name, VecSource::empty(), InsertWriter::new(store.table(name)));
        for dependency in dependencies {
            definition.add_dependency(*dependency);
        }
        definition
    }

    #[test]
    fn keeps_insertion_order_and_replaces_in_place() {
        let mut plan = ExecutionPlan::new();
        plan.add_definition(definition("Drivers", &[]));
        plan.add_definition(definition("Cars", &["Drivers"]));
        plan.add_definition(definition("Drivers", &["Colors"]));

        assert_eq!(plan.names().collect::<Vec<_>>(), vec!["Drivers", "Cars"]);
        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan.definition("Drivers").unwrap().dependencies(),
            ["Colors".to_string()]
        );
    }

    #[test]
    fn unknown_names_are_missing_definitions() {
        let plan = ExecutionPlan::new();
        let err = plan.definition("Wheels").unwrap_err();
        assert!(matches!(err, Error::MissingDefinition(name) if name == "Wheels"));
    }

    #[test]
    fn before_filter_rewrites_rows() {
        let mut plan = ExecutionPlan::new();
        assert_eq!(plan.filter_row(rekey_core::row([("a", 1_i64)])).len(), 1);

        plan.before_filter(|mut row| {
            row.remove("a");
            row
        });
        assert!(plan.filter_row(rekey_core::row([("a", 1_i64)])).is_empty());
    }
}
