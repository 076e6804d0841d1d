use std::cell::{Cell, RefCell};

use tracing::{debug, info};

/// Progress sink handed to every definition of a run.
pub trait Progress {
    /// A definition starts; `total_steps` is an estimate.
    fn begin(&self, definition: &str, total_steps: u64);
    fn increment(&self);
    fn finish(&self);
}

/// Progress sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn begin(&self, _definition: &str, _total_steps: u64) {}

    fn increment(&self) {}

    fn finish(&self) {}
}

/// Records the steps taken per definition.
#[derive(Debug, Default)]
pub struct StepCounter {
    current: RefCell<Option<(String, u64, u64)>>,
    finished: RefCell<Vec<(String, u64, u64)>>,
}

impl StepCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(definition, total_steps, steps_taken)` for every finished definition.
    pub fn finished(&self) -> Vec<(String, u64, u64)> {
        self.finished.borrow().clone()
    }

    pub fn steps_for(&self, definition: &str) -> Option<u64> {
        self.finished
            .borrow()
            .iter()
            .find(|(name, _, _)| name == definition)
            .map(|(_, _, steps)| *steps)
    }
}

impl Progress for StepCounter {
    fn begin(&self, definition: &str, total_steps: u64) {
        *self.current.borrow_mut() = Some((definition.to_string(), total_steps, 0));
    }

    fn increment(&self) {
        if let Some((_, _, steps)) = self.current.borrow_mut().as_mut() {
            *steps += 1;
        }
    }

    fn finish(&self) {
        if let Some(entry) = self.current.borrow_mut().take() {
            self.finished.borrow_mut().push(entry);
        }
    }
}

/// Reports progress through `tracing` events.
#[derive(Debug)]
pub struct LogProgress {
    every: u64,
    definition: RefCell<String>,
    total: Cell<u64>,
    steps: Cell<u64>,
}

impl LogProgress {
    /// Emit a debug event every `every` steps.
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            definition: RefCell::new(String::new()),
            total: Cell::new(0),
            steps: Cell::new(0),
        }
    }
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Progress for LogProgress {
    fn begin(&self, definition: &str, total_steps: u64) {
        *self.definition.borrow_mut() = definition.to_string();
        self.total.set(total_steps);
        self.steps.set(0);
    }

    fn increment(&self) {
        let steps = self.steps.get() + 1;
        self.steps.set(steps);
        if steps % self.every == 0 {
            debug!(
                definition = %self.definition.borrow(),
                steps,
                total = self.total.get(),
                "import progress"
            );
        }
    }

    fn finish(&self) {
        info!(
            definition = %self.definition.borrow(),
            steps = self.steps.get(),
            total = self.total.get(),
            "import progress finished"
        );
    }
}
