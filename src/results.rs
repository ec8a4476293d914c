use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::RowValues;

/// One row of a `query_entries` result: column name to value, in result-schema order.
///
/// Serializes as a JSON object whose keys keep the column order.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRow {
    column_names: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
    values: Vec<RowValues>,
}

impl EntryRow {
    fn new(
        column_names: Arc<Vec<String>>,
        index: Arc<HashMap<String, usize>>,
        values: Vec<RowValues>,
    ) -> Self {
        Self {
            column_names,
            index,
            values,
        }
    }

    /// Value for `column`, or `None` if the result has no such column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&RowValues> {
        self.index.get(column).and_then(|&idx| self.values.get(idx))
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.column_names
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RowValues)> {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop the column names and keep the values.
    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.values
    }
}

impl Serialize for EntryRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Raw result of a statement: column metadata plus rows in server order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    column_names: Arc<Vec<String>>,
    rows: Vec<Vec<RowValues>>,
    /// Rows affected for DML, rows returned for SELECT.
    pub rows_affected: u64,
}

impl ResultSet {
    #[must_use]
    pub fn new(column_names: Vec<String>) -> Self {
        Self {
            column_names: Arc::new(column_names),
            rows: Vec::new(),
            rows_affected: 0,
        }
    }

    #[must_use]
    pub fn with_capacity(column_names: Vec<String>, capacity: usize) -> Self {
        Self {
            column_names: Arc::new(column_names),
            rows: Vec::with_capacity(capacity),
            rows_affected: 0,
        }
    }

    /// Append a row. Its values must follow the column order.
    pub fn add_row_values(&mut self, values: Vec<RowValues>) {
        self.rows.push(values);
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<RowValues>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Object-mode rows.
    #[must_use]
    pub fn into_entries(self) -> Vec<EntryRow> {
        let index: HashMap<String, usize> = self
            .column_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let index = Arc::new(index);
        self.rows
            .into_iter()
            .map(|values| EntryRow::new(Arc::clone(&self.column_names), Arc::clone(&index), values))
            .collect()
    }

    /// Array-mode rows.
    #[must_use]
    pub fn into_arrays(self) -> Vec<Vec<RowValues>> {
        self.rows
    }
}
