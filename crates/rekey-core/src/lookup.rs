use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};
use crate::value::{Row, Value};

/// Hashable form of a looked-up value. Null values never become keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    Bool(bool),
    Int(i64),
    Float(u64),
    Text(String),
}

impl LookupKey {
    pub fn from_value(value: &Value, ignore_case: bool) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(value) => Some(LookupKey::Bool(*value)),
            Value::Int(value) => Some(LookupKey::Int(*value)),
            Value::Float(value) => Some(LookupKey::Float(value.to_bits())),
            Value::Text(value) if ignore_case => Some(LookupKey::Text(value.to_lowercase())),
            Value::Text(value) => Some(LookupKey::Text(value.clone())),
        }
    }
}

/// Identifier index for one attribute of a definition.
#[derive(Debug, Clone)]
pub struct LookupTable {
    column: String,
    ignore_case: bool,
    entries: HashMap<LookupKey, Value>,
}

impl LookupTable {
    fn new(column: String, ignore_case: bool) -> Self {
        Self {
            column,
            ignore_case,
            entries: HashMap::new(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn ignores_case(&self) -> bool {
        self.ignore_case
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, value: &Value, identifier: &Value) {
        if let Some(key) = LookupKey::from_value(value, self.ignore_case) {
            self.entries.insert(key, identifier.clone());
        }
    }

    fn get(&self, value: &Value) -> Option<Value> {
        let key = LookupKey::from_value(value, self.ignore_case)?;
        self.entries.get(&key).cloned()
    }
}

/// Lookup-tables owned by a single definition, keyed by attribute name.
///
/// Contents only grow during a run and are never persisted.
#[derive(Debug, Clone, Default)]
pub struct LookupRegistry {
    tables: BTreeMap<String, LookupTable>,
}

impl LookupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lookup on `attribute`, reading `column` (defaults to the
    /// attribute name) from imported rows.
    pub fn lookup_for(
        &mut self,
        attribute: &str,
        column: Option<&str>,
        ignore_case: bool,
    ) -> Result<()> {
        let column = column.unwrap_or(attribute);
        if self.tables.contains_key(attribute) {
            return Err(Error::DuplicateLookup(attribute.to_string()));
        }
        if self.tables.values().any(|table| table.column == column) {
            return Err(Error::DuplicateLookup(column.to_string()));
        }
        self.tables.insert(
            attribute.to_string(),
            LookupTable::new(column.to_string(), ignore_case),
        );
        Ok(())
    }

    pub fn has_lookup_table_on(&self, attribute: &str) -> bool {
        self.tables.contains_key(attribute)
    }

    pub fn table(&self, attribute: &str) -> Option<&LookupTable> {
        self.tables.get(attribute)
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Record `identifier` under every registered column present in `row`.
    /// Absent and null columns are skipped.
    pub fn row_imported(&mut self, identifier: &Value, row: &Row) {
        for table in self.tables.values_mut() {
            if let Some(value) = row.get(&table.column) {
                table.insert(value, identifier);
            }
        }
    }

    /// Identifier stored for `value`, or `None` when the value is null or unseen.
    pub fn identify_by(&self, attribute: &str, value: &Value) -> Result<Option<Value>> {
        let table = self
            .tables
            .get(attribute)
            .ok_or_else(|| Error::UnknownLookup(attribute.to_string()))?;
        Ok(table.get(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::row;

    #[test]
    fn knows_which_attributes_have_lookups() {
        let mut registry = LookupRegistry::new();
        registry.lookup_for("code", None, false).unwrap();
        registry.lookup_for("strRef", None, false).unwrap();

        assert!(registry.has_lookup_table_on("code"));
        assert!(registry.has_lookup_table_on("strRef"));
        assert!(!registry.has_lookup_table_on("oldID"));
        assert!(!registry.has_lookup_table_on("abcd"));
    }

    #[test]
    fn rejects_duplicate_attribute() {
        let mut registry = LookupRegistry::new();
        registry.lookup_for("code", None, false).unwrap();
        let err = registry.lookup_for("code", None, false).unwrap_err();
        assert_eq!(
            err.to_string(),
            "lookup-table for column 'code' was already defined"
        );
    }

    #[test]
    fn rejects_second_lookup_on_same_column() {
        let mut registry = LookupRegistry::new();
        registry.lookup_for("code", None, false).unwrap();
        let err = registry
            .lookup_for("same_code", Some("code"), false)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "lookup-table for column 'code' was already defined"
        );
    }

    #[test]
    fn ignores_rows_without_lookup_columns() {
        let mut registry = LookupRegistry::new();
        registry.lookup_for("code", None, false).unwrap();
        registry.row_imported(&Value::Int(66), &row([("undefined_attribute", "value")]));
        assert!(registry.table("code").unwrap().is_empty());
    }

    #[test]
    fn stores_imported_identifiers() {
        let mut registry = LookupRegistry::new();
        registry.lookup_for("code", None, false).unwrap();
        registry.row_imported(&Value::Int(17), &row([("code", "X")]));

        assert_eq!(
            registry.identify_by("code", &Value::from("X")).unwrap(),
            Some(Value::Int(17))
        );
        assert_eq!(registry.identify_by("code", &Value::from("Y")).unwrap(), None);
    }

    #[test]
    fn lookup_name_can_differ_from_column() {
        let mut registry = LookupRegistry::new();
        registry
            .lookup_for("reference", Some("strRef"), false)
            .unwrap();
        registry.row_imported(&Value::Int(9), &row([("strRef", "i-am-a-reference")]));

        assert_eq!(
            registry
                .identify_by("reference", &Value::from("i-am-a-reference"))
                .unwrap(),
            Some(Value::Int(9))
        );
    }

    #[test]
    fn unknown_lookup_fails() {
        let registry = LookupRegistry::new();
        let err = registry
            .identify_by("undefined_lookup_table", &Value::from("this-wont-work"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "no lookup-table defined named 'undefined_lookup_table'"
        );
    }

    #[test]
    fn null_values_are_never_registered() {
        let mut registry = LookupRegistry::new();
        registry.lookup_for("code", None, false).unwrap();
        registry.row_imported(&Value::Int(6), &row([("code", Value::Null)]));

        assert!(registry.table("code").unwrap().is_empty());
        assert_eq!(registry.identify_by("code", &Value::Null).unwrap(), None);
    }

    #[test]
    fn case_insensitive_lookup() {
        let mut registry = LookupRegistry::new();
        registry.lookup_for("reference", None, true).unwrap();
        registry.row_imported(&Value::Int(9), &row([("reference", "i-AM-a-REF")]));

        assert_eq!(
            registry
                .identify_by("reference", &Value::from("i-am-a-reF"))
                .unwrap(),
            Some(Value::Int(9))
        );
        assert_eq!(registry.identify_by("reference", &Value::Null).unwrap(), None);
    }

    #[test]
    fn keys_are_typed() {
        let mut registry = LookupRegistry::new();
        registry.lookup_for("legacy_id", None, false).unwrap();
        registry.row_imported(&Value::Int(1), &row([("legacy_id", 10001_i64)]));

        assert_eq!(
            registry.identify_by("legacy_id", &Value::from("10001")).unwrap(),
            None
        );
        assert_eq!(
            registry.identify_by("legacy_id", &Value::Int(10001)).unwrap(),
            Some(Value::Int(1))
        );
    }
}
