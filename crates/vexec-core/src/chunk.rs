//! Fixed-capacity columnar batch passed between operators.
//!
//! Besides its rows a chunk carries two numbers:
//! - `capacity`: the hard ceiling on rows (the session's max chunk size);
//! - `required_rows`: how many rows the *caller* wants from this `next` call.
//!
//! The caller sets `required_rows` before calling `next`; the operator that
//! fills the chunk resets it first and must never append more than
//! `required_rows` rows.

use serde::{Deserialize, Serialize};

use crate::schema::{DataType, Schema};
use crate::types::{Column, Datum};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    columns: Vec<Column>,
    num_rows: usize,
    capacity: usize,
    required_rows: usize,
}

impl Chunk {
    /// A chunk for `types` whose required rows default to its capacity.
    pub fn new(types: &[DataType], capacity: usize) -> Self {
        Self {
            columns: types
                .iter()
                .map(|t| Column::with_capacity(*t, capacity))
                .collect(),
            num_rows: 0,
            capacity,
            required_rows: capacity,
        }
    }

    pub fn with_schema(schema: &Schema, capacity: usize) -> Self {
        Self::new(&schema.data_types(), capacity)
    }

    /// Build a chunk from fully populated columns. All columns must have the
    /// same length; the capacity is at least that length.
    pub fn from_columns(columns: Vec<Column>, capacity: usize) -> Self {
        let num_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        assert!(
            columns.iter().all(|c| c.len() == num_rows),
            "chunk columns must have equal length"
        );
        let capacity = capacity.max(num_rows);
        Self {
            columns,
            num_rows,
            capacity,
            required_rows: capacity,
        }
    }

    /// Drop all rows, keeping column types, capacity and required rows.
    pub fn reset(&mut self) {
        for col in &mut self.columns {
            col.clear();
        }
        self.num_rows = 0;
    }

    /// Set the caller's demand for the next call, clamped to `max_chunk_size`
    /// and to this chunk's capacity. Zero is a legal demand meaning "nothing".
    pub fn set_required_rows(&mut self, required: usize, max_chunk_size: usize) -> &mut Self {
        self.required_rows = required.min(max_chunk_size).min(self.capacity);
        self
    }

    pub fn required_rows(&self) -> usize {
        self.required_rows
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    /// True once the chunk holds at least the required rows.
    pub fn is_full(&self) -> bool {
        self.num_rows >= self.required_rows
    }

    /// Rows still needed to satisfy the required rows.
    pub fn remaining(&self) -> usize {
        self.required_rows.saturating_sub(self.num_rows)
    }

    pub fn data_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }

    pub fn column(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    /// Mutable access to one column's storage. Callers that change lengths
    /// must keep every column the same length.
    pub fn column_mut(&mut self, idx: usize) -> &mut Column {
        &mut self.columns[idx]
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn value(&self, row: usize, col: usize) -> &Datum {
        self.columns[col].get(row)
    }

    /// Owned copy of one row.
    pub fn row(&self, row: usize) -> Vec<Datum> {
        self.columns.iter().map(|c| c.get(row).clone()).collect()
    }

    pub fn append_row(&mut self, row: Vec<Datum>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row width mismatch");
        debug_assert!(self.num_rows < self.capacity, "chunk over capacity");
        for (col, value) in self.columns.iter_mut().zip(row) {
            col.push(value);
        }
        self.num_rows += 1;
    }

    /// Append row `row` of `src`, which must have the same layout.
    pub fn append_row_from(&mut self, src: &Chunk, row: usize) {
        debug_assert!(self.num_rows < self.capacity, "chunk over capacity");
        for (dst, col) in self.columns.iter_mut().zip(src.columns.iter()) {
            dst.push(col.get(row).clone());
        }
        self.num_rows += 1;
    }

    /// Append rows `[begin, end)` of `src`.
    pub fn append_range(&mut self, src: &Chunk, begin: usize, end: usize) {
        debug_assert!(self.num_rows + (end - begin) <= self.capacity, "chunk over capacity");
        for (dst, col) in self.columns.iter_mut().zip(src.columns.iter()) {
            dst.values.extend_from_slice(&col.values[begin..end]);
        }
        self.num_rows += end - begin;
    }

    /// Append a row assembled from two sources, e.g. a joined outer/inner pair.
    pub fn append_joined(&mut self, left: &[Datum], right: &[Datum]) {
        debug_assert_eq!(left.len() + right.len(), self.columns.len());
        debug_assert!(self.num_rows < self.capacity, "chunk over capacity");
        for (col, value) in self.columns.iter_mut().zip(left.iter().chain(right.iter())) {
            col.push(value.clone());
        }
        self.num_rows += 1;
    }

    pub fn truncate_to(&mut self, rows: usize) {
        if rows >= self.num_rows {
            return;
        }
        for col in &mut self.columns {
            col.truncate(rows);
        }
        self.num_rows = rows;
    }

    /// Replace the column storage wholesale (projection output). The new
    /// columns must share one length no larger than the capacity.
    pub fn set_columns(&mut self, columns: Vec<Column>) {
        let num_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        assert!(
            columns.iter().all(|c| c.len() == num_rows),
            "chunk columns must have equal length"
        );
        debug_assert!(num_rows <= self.capacity, "chunk over capacity");
        self.columns = columns;
        self.num_rows = num_rows;
    }

    /// Swap storage with `other` (same layout), keeping each chunk's own
    /// capacity and required rows.
    pub fn swap_columns(&mut self, other: &mut Chunk) {
        std::mem::swap(&mut self.columns, &mut other.columns);
        std::mem::swap(&mut self.num_rows, &mut other.num_rows);
    }

    /// Estimated bytes held by the rows of this chunk.
    pub fn estimated_bytes(&self) -> usize {
        self.columns
            .iter()
            .flat_map(|c| c.values.iter())
            .map(Datum::estimated_bytes)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_chunk(rows: i64, capacity: usize) -> Chunk {
        let mut chunk = Chunk::new(&[DataType::Int64], capacity);
        for i in 0..rows {
            chunk.append_row(vec![Datum::I64(i)]);
        }
        chunk
    }

    #[test]
    fn required_rows_are_clamped() {
        let mut chunk = Chunk::new(&[DataType::Int64], 8);
        assert_eq!(chunk.required_rows(), 8);
        chunk.set_required_rows(100, 1024);
        assert_eq!(chunk.required_rows(), 8);
        chunk.set_required_rows(3, 4);
        assert_eq!(chunk.required_rows(), 3);
        chunk.set_required_rows(0, 4);
        assert_eq!(chunk.required_rows(), 0);
        assert!(chunk.is_full());
    }

    #[test]
    fn reset_keeps_demand() {
        let mut chunk = int_chunk(5, 8);
        chunk.set_required_rows(6, 8);
        assert_eq!(chunk.remaining(), 1);
        chunk.reset();
        assert_eq!(chunk.num_rows(), 0);
        assert_eq!(chunk.required_rows(), 6);
        assert_eq!(chunk.column(0).len(), 0);
    }

    #[test]
    fn append_range_and_truncate() {
        let src = int_chunk(6, 8);
        let mut dst = Chunk::new(&[DataType::Int64], 8);
        dst.append_range(&src, 2, 5);
        assert_eq!(dst.num_rows(), 3);
        assert_eq!(dst.value(0, 0), &Datum::I64(2));
        dst.truncate_to(1);
        assert_eq!(dst.num_rows(), 1);
        assert_eq!(dst.row(0), vec![Datum::I64(2)]);
    }

    #[test]
    fn swap_columns_keeps_capacity() {
        let mut a = int_chunk(3, 4);
        let mut b = Chunk::new(&[DataType::Int64], 16);
        b.swap_columns(&mut a);
        assert_eq!(b.num_rows(), 3);
        assert_eq!(b.capacity(), 16);
        assert_eq!(a.num_rows(), 0);
        assert_eq!(a.capacity(), 4);
    }
}
