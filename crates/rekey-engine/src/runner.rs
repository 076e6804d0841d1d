use std::collections::HashSet;
use std::time::Instant;

use tracing::{Dispatch, info};

use crate::context::ExecutionContext;
use crate::errors::Result;
use crate::model::{DefinitionReport, RunReport};
use crate::plan::ExecutionPlan;
use crate::progress::{LogProgress, Progress};
use crate::resolver::DependencyResolver;

/// Runs the definitions of a plan one after another.
///
/// The first error aborts the remaining definitions.
pub struct Runner<'a> {
    plan: &'a ExecutionPlan,
    progress: Option<&'a dyn Progress>,
    logger: Option<Dispatch>,
}

impl<'a> Runner<'a> {
    pub fn new(plan: &'a ExecutionPlan) -> Self {
        Self {
            plan,
            progress: None,
            logger: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run under `logger` instead of the default dispatcher.
    pub fn with_logger(mut self, logger: Dispatch) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Resolve `only` (or every definition) and run the resolved plan.
    pub fn run(&self, only: Option<&[String]>) -> Result<RunReport> {
        match &self.logger {
            Some(logger) => tracing::dispatcher::with_default(logger, || self.run_resolved(only)),
            None => self.run_resolved(only),
        }
    }

    fn run_resolved(&self, only: Option<&[String]>) -> Result<RunReport> {
        let started = Instant::now();
        let resolved = DependencyResolver::new(self.plan).resolve(only)?;
        let fallback = LogProgress::default();
        let progress = self.progress.unwrap_or(&fallback);

        let mut report = RunReport::new();
        info!(
            run_id = %report.run_id,
            definitions = resolved.len(),
            "starting run"
        );

        let mut completed = HashSet::new();
        for definition in resolved.definitions() {
            let definition_started = Instant::now();
            progress.begin(definition.name(), definition.total_steps_required());
            info!("Starting to import \"{}\"", definition.name());

            let context = ExecutionContext::in_run(&resolved, definition, progress, &completed);
            let result = definition.run(&context);
            progress.finish();
            let stats = result?;
            completed.insert(definition.name().to_string());

            let duration_ms = definition_started.elapsed().as_millis() as u64;
            info!(
                definition = definition.name(),
                rows_read = stats.rows_read,
                rows_written = stats.rows_written,
                rows_skipped = stats.rows_skipped,
                duration_ms,
                "definition imported"
            );
            report.record(DefinitionReport {
                name: definition.name().to_string(),
                kind: if definition.is_script() { "script" } else { "import" }.to_string(),
                stats,
                duration_ms,
            });
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            run_id = %report.run_id,
            rows_written = report.totals.rows_written,
            duration_ms = report.duration_ms,
            "run finished"
        );
        Ok(report)
    }
}

/// Run `plan`, restricted to `only` and its dependencies when given.
pub fn run_plan(plan: &ExecutionPlan, only: Option<&[String]>) -> Result<RunReport> {
    Runner::new(plan).run(only)
}
