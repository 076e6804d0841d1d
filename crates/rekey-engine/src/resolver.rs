use rekey_core::resolve_order;
use tracing::debug;

use crate::plan::ExecutionPlan;

/// Orders a plan by its dependencies, optionally restricted to a subset.
#[derive(Debug)]
pub struct DependencyResolver<'a> {
    plan: &'a ExecutionPlan,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(plan: &'a ExecutionPlan) -> Self {
        Self { plan }
    }

    /// New plan holding `run_only` (or every definition) plus transitive
    /// dependencies, every dependency before its dependents.
    ///
    /// The resolved plan shares definitions and the row filter with the input.
    pub fn resolve(&self, run_only: Option<&[String]>) -> rekey_core::Result<ExecutionPlan> {
        let graph = self.plan.dependency_graph();
        let order = resolve_order(&graph, run_only)?;
        debug!(order = ?order, "resolved execution order");

        let mut resolved = ExecutionPlan::new();
        for name in &order {
            resolved.add_shared(self.plan.shared(name)?.clone());
        }
        resolved.set_shared_filter(self.plan.shared_filter());
        Ok(resolved)
    }
}
