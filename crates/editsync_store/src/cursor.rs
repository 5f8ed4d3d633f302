//! Forward-only query results.

use crate::error::{StoreError, StoreResult};
use rusqlite::types::Value;
use rusqlite::Statement;

/// Materialized result of a raw query.
///
/// A cursor starts positioned before the first row; call [`Cursor::next`]
/// to advance. Accessors read from the current row.
///
/// A cursor can be refilled by another query, reusing its buffers.
#[derive(Debug, Default)]
pub struct Cursor {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}

impl Cursor {
    /// Creates an empty cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the cursor content with the rows of `stmt`.
    pub(crate) fn fill(&mut self, stmt: &mut Statement<'_>) -> StoreResult<()> {
        self.columns.clear();
        self.columns
            .extend(stmt.column_names().into_iter().map(str::to_string));
        self.position = None;

        let width = self.columns.len();
        let mut recycled = std::mem::take(&mut self.rows);

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut values = recycled.pop().unwrap_or_else(|| Vec::with_capacity(width));
            values.clear();
            for i in 0..width {
                values.push(row.get::<_, Value>(i)?);
            }
            self.rows.push(values);
        }
        Ok(())
    }

    /// Advances to the next row. Returns false once past the last row.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.rows.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.rows.len());
            false
        }
    }

    /// Returns the number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Returns the column names.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Returns the index of a named column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns true if the value in `column` is NULL.
    pub fn is_null(&self, column: usize) -> StoreResult<bool> {
        Ok(matches!(self.value(column)?, Value::Null))
    }

    /// Reads an integer column.
    pub fn get_i64(&self, column: usize) -> StoreResult<i64> {
        match self.value(column)? {
            Value::Integer(v) => Ok(*v),
            Value::Null => Ok(0),
            other => Err(type_mismatch(column, "integer", other)),
        }
    }

    /// Reads an integer column that fits in 32 bits.
    pub fn get_i32(&self, column: usize) -> StoreResult<i32> {
        let v = self.get_i64(column)?;
        i32::try_from(v)
            .map_err(|_| StoreError::invalid_data(format!("column {column}: {v} exceeds i32")))
    }

    /// Reads a real column. Integers are widened.
    pub fn get_f64(&self, column: usize) -> StoreResult<f64> {
        match self.value(column)? {
            Value::Real(v) => Ok(*v),
            Value::Integer(v) => Ok(*v as f64),
            Value::Null => Ok(0.0),
            other => Err(type_mismatch(column, "real", other)),
        }
    }

    /// Reads a text column. NULL reads as `None`.
    pub fn get_string(&self, column: usize) -> StoreResult<Option<String>> {
        match self.value(column)? {
            Value::Text(v) => Ok(Some(v.clone())),
            Value::Null => Ok(None),
            Value::Integer(v) => Ok(Some(v.to_string())),
            other => Err(type_mismatch(column, "text", other)),
        }
    }

    fn value(&self, column: usize) -> StoreResult<&Value> {
        let row = self
            .position
            .and_then(|p| self.rows.get(p))
            .ok_or_else(|| StoreError::invalid_data("cursor is not on a row"))?;
        row.get(column)
            .ok_or_else(|| StoreError::invalid_data(format!("no column {column}")))
    }
}

fn type_mismatch(column: usize, expected: &str, found: &Value) -> StoreError {
    StoreError::invalid_data(format!(
        "column {column}: expected {expected}, found {:?}",
        found.data_type()
    ))
}
