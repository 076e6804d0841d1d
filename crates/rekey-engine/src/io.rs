use rekey_core::{Row, Value};
use tracing::warn;

use crate::errors::Result;

/// Legacy rows for one definition.
///
/// `rows` yields a finite, single-pass sequence; a second call fails.
pub trait RowSource {
    fn rows(&mut self) -> Result<Box<dyn Iterator<Item = Result<Row>> + '_>>;

    /// Number of rows, when known up front. Only used to size progress.
    fn row_count(&self) -> Option<u64> {
        None
    }
}

/// Destination for mapped rows.
pub trait RowSink {
    /// Write one row and return its identifier.
    fn write_row(&mut self, row: &Row) -> Result<Value>;

    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: RowSink + ?Sized> RowSink for Box<S> {
    fn write_row(&mut self, row: &Row) -> Result<Value> {
        (**self).write_row(row)
    }

    fn begin(&mut self) -> Result<()> {
        (**self).begin()
    }

    fn commit(&mut self) -> Result<()> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<()> {
        (**self).rollback()
    }
}

/// Run `body` inside a sink transaction: commit when it returns `Ok`,
/// roll back and hand the error on otherwise.
pub fn transaction<T>(
    sink: &mut dyn RowSink,
    body: impl FnOnce(&mut dyn RowSink) -> Result<T>,
) -> Result<T> {
    sink.begin()?;
    match body(&mut *sink) {
        Ok(value) => {
            sink.commit()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = sink.rollback() {
                warn!(error = %err, rollback_error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}

/// In-memory source, mostly for scripts and tests.
#[derive(Debug, Default)]
pub struct VecSource {
    rows: Option<Vec<Row>>,
    count: u64,
}

impl VecSource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            count: rows.len() as u64,
            rows: Some(rows),
        }
    }

    /// Source that yields no rows.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl RowSource for VecSource {
    fn rows(&mut self) -> Result<Box<dyn Iterator<Item = Result<Row>> + '_>> {
        let rows = self.rows.take().ok_or_else(|| {
            rekey_core::Error::Other("row source was already consumed".to_string())
        })?;
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    fn row_count(&self) -> Option<u64> {
        Some(self.count)
    }
}
