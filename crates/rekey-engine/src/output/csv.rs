use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rekey_core::{Row, Value};

use crate::errors::Result;
use crate::io::RowSource;
use crate::store::MemoryTable;

/// Legacy rows read from a CSV file with a header record.
///
/// Empty fields read as null and numeric fields as numbers. The file is
/// opened on the first call to `rows`.
#[derive(Debug)]
pub struct CsvSource {
    path: PathBuf,
    consumed: bool,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            consumed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RowSource for CsvSource {
    fn rows(&mut self) -> Result<Box<dyn Iterator<Item = Result<Row>> + '_>> {
        if self.consumed {
            return Err(rekey_core::Error::Other(format!(
                "csv source {} was already consumed",
                self.path.display()
            ))
            .into());
        }
        self.consumed = true;

        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        Ok(Box::new(reader.into_records().map(move |record| -> Result<Row> {
            let record = record?;
            Ok(headers
                .iter()
                .zip(record.iter())
                .map(|(column, raw)| (column.to_string(), Value::parse_field(raw)))
                .collect())
        })))
    }

    fn row_count(&self) -> Option<u64> {
        let mut reader = csv::Reader::from_path(&self.path).ok()?;
        let mut record = csv::StringRecord::new();
        let mut count = 0;
        while reader.read_record(&mut record).ok()? {
            count += 1;
        }
        Some(count)
    }
}

/// Write a table as CSV, columns in first-seen order. Returns bytes written.
pub fn write_table_csv(path: &Path, table: &MemoryTable) -> std::result::Result<u64, csv::Error> {
    let writer = BufWriter::new(File::create(path).map_err(csv::Error::from)?);
    let counting = CountingWriter::new(writer);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(counting);

    writer.write_record(table.columns())?;
    for row in table.rows() {
        let record: Vec<String> = table
            .columns()
            .iter()
            .map(|column| row.get(column).map(Value::to_field).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }

    writer.flush()?;
    let counting = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(counting.bytes_written())
}

/// Read a whole CSV file into memory.
pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    let mut source = CsvSource::new(path);
    let rows: Result<Vec<Row>> = source.rows()?.collect();
    rows
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rekey-{label}-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn csv_source_parses_fields_and_counts_rows() {
        let dir = temp_dir("csv-source");
        let path = dir.join("people.csv");
        fs::write(&path, "ID,Name,Score\n1,Ada,\n2,,1.5\n").unwrap();

        let mut source = CsvSource::new(&path);
        assert_eq!(source.row_count(), Some(2));

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows[0].get("ID"), Some(&Value::Int(1)));
        assert_eq!(rows[0].get("Score"), Some(&Value::Null));
        assert_eq!(rows[1].get("Name"), Some(&Value::Null));
        assert_eq!(rows[1].get("Score"), Some(&Value::Float(1.5)));

        assert_eq!(source.rows().unwrap().count(), 2);
        assert!(source.rows().is_err());
    }

    #[test]
    fn csv_source_keeps_codes_as_written() {
        let dir = temp_dir("csv-codes");
        let path = dir.join("contacts.csv");
        fs::write(&path, "zip,phone\n01234,12345678901234567890\n").unwrap();

        let rows = read_rows(&path).unwrap();
        assert_eq!(rows[0].get("zip"), Some(&Value::from("01234")));
        assert_eq!(
            rows[0].get("phone"),
            Some(&Value::from("12345678901234567890"))
        );
    }

    #[test]
    fn missing_csv_file_fails_on_rows() {
        let mut source = CsvSource::new("/nonexistent/rekey/people.csv");
        assert_eq!(source.row_count(), None);
        assert!(source.rows().is_err());
    }

    #[test]
    fn writes_table_with_header_and_empty_nulls() {
        let dir = temp_dir("csv-export");
        let mut table = MemoryTable::new("people", "id");
        table.insert(&rekey_core::row([("name", Value::from("Ada")), ("note", Value::Null)]));
        table.insert(&rekey_core::row([("name", "Bob")]));

        let path = dir.join("people.csv");
        let bytes = write_table_csv(&path, &table).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(bytes, written.len() as u64);
        assert_eq!(written, "id,name,note\n1,Ada,\n2,Bob,\n");
    }
}
