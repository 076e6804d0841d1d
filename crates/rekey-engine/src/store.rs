use std::cell::{RefCell, RefMut};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rekey_core::{Error, Row, Value};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::io::RowSink;
use crate::output::csv::{read_rows, write_table_csv};

/// Target table held in memory.
///
/// Integer identifiers come from a per-table counter. Rows written with an
/// explicit integer id move the counter past it.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    name: String,
    primary_key: String,
    columns: Vec<String>,
    rows: Vec<Row>,
    next_id: i64,
    snapshot: Option<Snapshot>,
    dirty: bool,
}

#[derive(Debug, Clone)]
struct Snapshot {
    columns: Vec<String>,
    rows: Vec<Row>,
    next_id: i64,
    dirty: bool,
}

impl MemoryTable {
    pub fn new(name: impl Into<String>, primary_key: impl Into<String>) -> Self {
        let primary_key = primary_key.into();
        Self {
            name: name.into(),
            columns: vec![primary_key.clone()],
            primary_key,
            rows: Vec::new(),
            next_id: 1,
            snapshot: None,
            dirty: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether rows were written since the table was created or loaded.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Append a row and return its identifier. A missing or null id is
    /// generated.
    pub fn insert(&mut self, row: &Row) -> Value {
        let mut row = row.clone();
        let id = match row.get(&self.primary_key) {
            Some(Value::Null) | None => {
                let id = Value::Int(self.next_id);
                self.next_id += 1;
                row.insert(self.primary_key.clone(), id.clone());
                id
            }
            Some(id) => {
                if let Some(explicit) = id.as_i64() {
                    self.next_id = self.next_id.max(explicit.saturating_add(1));
                }
                id.clone()
            }
        };
        self.track_columns(&row);
        self.rows.push(row);
        self.dirty = true;
        id
    }

    /// Merge `row` into the record carrying its id.
    ///
    /// Fails with `MissingId` when the row has no id. An id with no matching
    /// record is logged and left alone.
    pub fn update(&mut self, row: &Row) -> rekey_core::Result<Value> {
        let id = match row.get(&self.primary_key) {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                return Err(Error::MissingId {
                    table: self.name.clone(),
                    column: self.primary_key.clone(),
                });
            }
        };

        let position = self
            .rows
            .iter()
            .position(|existing| existing.get(&self.primary_key) == Some(&id));
        match position {
            Some(position) => {
                self.track_columns(row);
                let existing = &mut self.rows[position];
                for (column, value) in row {
                    existing.insert(column.clone(), value.clone());
                }
                self.dirty = true;
            }
            None => warn!(table = %self.name, id = %id, "no record to update"),
        }
        Ok(id)
    }

    /// Id of the first record whose `columns` all equal the values in `row`.
    /// Absent columns compare as null.
    pub fn find_matching(&self, columns: &[String], row: &Row) -> Option<Value> {
        self.rows
            .iter()
            .find(|existing| {
                columns.iter().all(|column| {
                    existing.get(column).unwrap_or(&Value::Null)
                        == row.get(column).unwrap_or(&Value::Null)
                })
            })
            .and_then(|existing| existing.get(&self.primary_key).cloned())
    }

    pub fn begin(&mut self) {
        self.snapshot = Some(Snapshot {
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            next_id: self.next_id,
            dirty: self.dirty,
        });
    }

    pub fn commit(&mut self) {
        self.snapshot = None;
    }

    pub fn rollback(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.columns = snapshot.columns;
            self.rows = snapshot.rows;
            self.next_id = snapshot.next_id;
            self.dirty = snapshot.dirty;
        }
    }

    fn track_columns(&mut self, row: &Row) {
        for column in row.keys() {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
    }
}

pub type SharedTable = Rc<RefCell<MemoryTable>>;

/// Named in-memory target tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RefCell<BTreeMap<String, SharedTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table `name`, created with an `id` primary key when absent.
    pub fn table(&self, name: &str) -> SharedTable {
        self.table_with_key(name, rekey_core::DEFAULT_LOOKUP)
    }

    /// Table `name`, created with `primary_key` when absent. An existing
    /// table keeps its key.
    pub fn table_with_key(&self, name: &str, primary_key: &str) -> SharedTable {
        Rc::clone(
            self.tables
                .borrow_mut()
                .entry(name.to_string())
                .or_insert_with(|| Rc::new(RefCell::new(MemoryTable::new(name, primary_key)))),
        )
    }

    pub fn names(&self) -> Vec<String> {
        self.tables.borrow().keys().cloned().collect()
    }

    /// Load existing rows of `name` from a CSV file. The table stays clean.
    pub fn load_table_csv(&self, name: &str, primary_key: &str, path: &Path) -> Result<usize> {
        let rows = read_rows(path)?;
        let table = self.table_with_key(name, primary_key);
        let mut table = borrow_table(&table)?;
        for row in &rows {
            table.insert(row);
        }
        table.dirty = false;
        debug!(table = name, rows = rows.len(), path = %path.display(), "loaded target table");
        Ok(rows.len())
    }

    /// Write every table that received rows to `<dir>/<table>.csv`.
    pub fn export_csv(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::new();
        for (name, table) in self.tables.borrow().iter() {
            let table = table
                .try_borrow()
                .map_err(|_| Error::Storage(format!("table '{name}' is in use")))?;
            if !table.is_dirty() {
                continue;
            }
            let path = dir.join(format!("{name}.csv"));
            let bytes = write_table_csv(&path, &table)?;
            debug!(
                table = %name,
                rows = table.len(),
                bytes,
                path = %path.display(),
                "exported table"
            );
            written.push(path);
        }
        Ok(written)
    }
}

fn borrow_table(table: &SharedTable) -> rekey_core::Result<RefMut<'_, MemoryTable>> {
    table
        .try_borrow_mut()
        .map_err(|_| Error::Storage("table is already in use".to_string()))
}

/// Sink that always inserts a new record.
#[derive(Debug, Clone)]
pub struct InsertWriter {
    table: SharedTable,
}

impl InsertWriter {
    pub fn new(table: SharedTable) -> Self {
        Self { table }
    }
}

/// Sink that updates the record named by the row's id.
#[derive(Debug, Clone)]
pub struct UpdateWriter {
    table: SharedTable,
}

impl UpdateWriter {
    pub fn new(table: SharedTable) -> Self {
        Self { table }
    }
}

/// Sink that inserts unless a record with the same identity columns exists.
#[derive(Debug, Clone)]
pub struct UniqueWriter {
    table: SharedTable,
    columns: Vec<String>,
}

impl UniqueWriter {
    pub fn new<I, S>(table: SharedTable, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table,
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

macro_rules! table_transactions {
    ($($writer:ty),+) => {$(
        impl RowSink for $writer {
            fn write_row(&mut self, row: &Row) -> Result<Value> {
                self.write(row)
            }

            fn begin(&mut self) -> Result<()> {
                borrow_table(&self.table)?.begin();
                Ok(())
            }

            fn commit(&mut self) -> Result<()> {
                borrow_table(&self.table)?.commit();
                Ok(())
            }

            fn rollback(&mut self) -> Result<()> {
                borrow_table(&self.table)?.rollback();
                Ok(())
            }
        }
    )+};
}

table_transactions!(InsertWriter, UpdateWriter, UniqueWriter);

impl InsertWriter {
    fn write(&mut self, row: &Row) -> Result<Value> {
        Ok(borrow_table(&self.table)?.insert(row))
    }
}

impl UpdateWriter {
    fn write(&mut self, row: &Row) -> Result<Value> {
        Ok(borrow_table(&self.table)?.update(row)?)
    }
}

impl UniqueWriter {
    fn write(&mut self, row: &Row) -> Result<Value> {
        let mut table = borrow_table(&self.table)?;
        if let Some(id) = table.find_matching(&self.columns, row) {
            return Ok(id);
        }
        Ok(table.insert(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::transaction;
    use rekey_core::row;

    #[test]
    fn insert_generates_ids_and_respects_explicit_ones() {
        let mut table = MemoryTable::new("cars", "id");
        assert_eq!(table.insert(&row([("model", "Panda")])), Value::Int(1));
        assert_eq!(
            table.insert(&row([("id", Value::Int(10)), ("model", "Golf".into())])),
            Value::Int(10)
        );
        assert_eq!(table.insert(&row([("model", "Polo")])), Value::Int(11));
        assert_eq!(table.columns(), ["id".to_string(), "model".to_string()]);
    }

    #[test]
    fn update_requires_an_id() {
        let store = MemoryStore::new();
        let mut writer = UpdateWriter::new(store.table("cars"));
        let err = writer.write_row(&row([("model", "Panda")])).unwrap_err();
        assert!(matches!(
            err.core(),
            Some(Error::MissingId { table, column }) if table == "cars" && column == "id"
        ));
    }

    #[test]
    fn update_merges_into_the_existing_record() {
        let store = MemoryStore::new();
        let table = store.table("cars");
        table.borrow_mut().insert(&row([("model", "Panda")]));

        let mut writer = UpdateWriter::new(Rc::clone(&table));
        let id = writer
            .write_row(&row([("id", Value::Int(1)), ("color", "red".into())]))
            .unwrap();
        assert_eq!(id, Value::Int(1));
        assert_eq!(
            table.borrow().rows()[0],
            row([
                ("id", Value::Int(1)),
                ("model", "Panda".into()),
                ("color", "red".into())
            ])
        );

        // Unknown ids are left alone.
        writer
            .write_row(&row([("id", Value::Int(9)), ("color", "blue".into())]))
            .unwrap();
        assert_eq!(table.borrow().len(), 1);
    }

    #[test]
    fn unique_writer_reuses_matching_records() {
        let store = MemoryStore::new();
        let table = store.table("colors");
        let mut writer = UniqueWriter::new(Rc::clone(&table), ["name"]);

        let red = writer.write_row(&row([("name", "red")])).unwrap();
        let blue = writer.write_row(&row([("name", "blue")])).unwrap();
        let again = writer.write_row(&row([("name", "red")])).unwrap();

        assert_eq!(red, again);
        assert_ne!(red, blue);
        assert_eq!(table.borrow().len(), 2);
    }

    #[test]
    fn rollback_restores_the_snapshot() {
        let store = MemoryStore::new();
        let table = store.table("cars");
        let mut writer = InsertWriter::new(Rc::clone(&table));
        transaction(&mut writer, |sink| sink.write_row(&row([("model", "Panda")]))).unwrap();

        let result: Result<()> = transaction(&mut writer, |sink| {
            sink.write_row(&row([("model", "Golf")]))?;
            Err(Error::Other("abort".to_string()).into())
        });
        assert!(result.is_err());

        assert_eq!(table.borrow().len(), 1);
        assert_eq!(
            table.borrow_mut().insert(&row([("model", "Polo")])),
            Value::Int(2)
        );
    }

    #[test]
    fn export_skips_tables_without_writes() {
        let dir = std::env::temp_dir().join(format!("rekey-store-{}", uuid::Uuid::new_v4()));
        let store = MemoryStore::new();
        store.table("empty");
        store.table("cars").borrow_mut().insert(&row([("model", "Panda")]));

        let written = store.export_csv(&dir).unwrap();
        assert_eq!(written, vec![dir.join("cars.csv")]);
    }
}
