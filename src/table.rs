//! In-memory spreadsheet model.
//!
//! A [`Table`] keeps the header row and every data row as plain strings in
//! their original order. Rows are only ever edited in place, value by value,
//! so the rewritten spreadsheet keeps the exact shape of the input.

use serde::{Deserialize, Serialize};

/// One data record. Values are positional and aligned with [`Table::headers`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row(Vec<String>);

impl Row {
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    /// Value at column `idx`, or `""` if the row is shorter.
    pub fn get(&self, idx: usize) -> &str {
        self.0.get(idx).map(String::as_str).unwrap_or("")
    }

    /// Overwrite column `idx`. Out-of-range indices are ignored.
    pub fn set(&mut self, idx: usize, value: impl Into<String>) {
        if let Some(slot) = self.0.get_mut(idx) {
            *slot = value.into();
        }
    }

    pub fn push(&mut self, value: impl Into<String>) {
        self.0.push(value.into());
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    /// Build a table, padding or truncating every row to the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut values| {
                values.resize(width, String::new());
                Row(values)
            })
            .collect();
        Self { headers, rows }
    }

    /// Index of the first column named exactly `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// All values of column `idx`, top to bottom.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &str> {
        self.rows.iter().map(move |r| r.get(idx))
    }

    /// Add a column at the end, filling every row with `""`.
    pub fn push_column(&mut self, name: impl Into<String>) -> usize {
        self.headers.push(name.into());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.headers.len() - 1
    }
}
