//! Vectorized group-boundary detection over chunks sorted by the group keys.
//!
//! `split_into_groups` evaluates the group-by expressions once per chunk,
//! marks every row that starts a new group, and remembers owned snapshots of
//! the chunk's first and last key tuples. The last-row snapshot of the
//! previous chunk decides whether the new chunk's first group continues it.

use std::ops::Range;

use vexec_core::chunk::Chunk;
use vexec_core::types::{cmp_datums, Datum};

use crate::expr::Expr;
use crate::traits::Result;

pub struct VecGroupChecker {
    group_by: Vec<Expr>,
    /// Exclusive end offset of each group in the current chunk.
    group_ends: Vec<usize>,
    next_group_idx: usize,
    /// Scratch: `same_as_prev[i]` is true when row `i` continues row `i - 1`.
    same_as_prev: Vec<bool>,
    first_row_key: Vec<Datum>,
    last_row_key: Vec<Datum>,
    has_prev: bool,
}

impl VecGroupChecker {
    pub fn new(group_by: Vec<Expr>) -> Self {
        Self {
            group_by,
            group_ends: Vec::new(),
            next_group_idx: 0,
            same_as_prev: Vec::new(),
            first_row_key: Vec::new(),
            last_row_key: Vec::new(),
            has_prev: false,
        }
    }

    pub fn group_by(&self) -> &[Expr] {
        &self.group_by
    }

    /// Split `chunk` into runs of equal keys. NULL keys are equal to each
    /// other for grouping purposes.
    ///
    /// Returns true when the first group of `chunk` continues the last group
    /// of the previously split chunk. `group_count` counts that continuing
    /// group too. An empty chunk yields no groups and leaves the previous
    /// snapshot in place.
    pub fn split_into_groups(&mut self, chunk: &Chunk) -> Result<bool> {
        self.group_ends.clear();
        self.next_group_idx = 0;

        let num_rows = chunk.num_rows();
        if num_rows == 0 {
            return Ok(false);
        }

        let mut keys = Vec::with_capacity(self.group_by.len());
        for expr in &self.group_by {
            let col = expr.eval_chunk(chunk)?;
            assert_eq!(
                col.len(),
                num_rows,
                "group key {} produced {} values for {} rows",
                expr,
                col.len(),
                num_rows
            );
            keys.push(col);
        }

        self.same_as_prev.clear();
        self.same_as_prev.resize(num_rows, true);
        for col in &keys {
            for row in 1..num_rows {
                if self.same_as_prev[row] {
                    self.same_as_prev[row] = col.get(row).total_cmp(col.get(row - 1)).is_eq();
                }
            }
        }
        for row in 1..num_rows {
            if !self.same_as_prev[row] {
                self.group_ends.push(row);
            }
        }
        self.group_ends.push(num_rows);

        let first: Vec<Datum> = keys.iter().map(|c| c.get(0).clone()).collect();
        let continues_prev = self.has_prev && cmp_datums(&first, &self.last_row_key).is_eq();

        self.first_row_key = first;
        self.last_row_key = keys.iter().map(|c| c.get(num_rows - 1).clone()).collect();
        self.has_prev = true;

        tracing::trace!(
            rows = num_rows,
            groups = self.group_ends.len(),
            continues_prev,
            "split chunk into groups"
        );
        Ok(continues_prev)
    }

    /// Number of groups in the most recently split chunk.
    pub fn group_count(&self) -> usize {
        self.group_ends.len()
    }

    /// Row range of the next unconsumed group of the current chunk.
    pub fn next_group(&mut self) -> Option<Range<usize>> {
        let end = *self.group_ends.get(self.next_group_idx)?;
        let begin = match self.next_group_idx {
            0 => 0,
            idx => self.group_ends[idx - 1],
        };
        self.next_group_idx += 1;
        Some(begin..end)
    }

    /// True once every group of the current chunk has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.next_group_idx >= self.group_ends.len()
    }

    /// Key tuple of the current chunk's first row.
    pub fn first_row_key(&self) -> &[Datum] {
        &self.first_row_key
    }

    /// Key tuple of the current chunk's last row.
    pub fn last_row_key(&self) -> &[Datum] {
        &self.last_row_key
    }

    /// Forget all state, including the previous chunk's snapshot.
    pub fn reset(&mut self) {
        self.group_ends.clear();
        self.next_group_idx = 0;
        self.same_as_prev.clear();
        self.first_row_key.clear();
        self.last_row_key.clear();
        self.has_prev = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vexec_core::prelude::DataType;

    fn chunk_of(values: &[Option<i64>]) -> Chunk {
        let mut chunk = Chunk::new(&[DataType::Int64], values.len().max(1));
        for v in values {
            chunk.append_row(vec![v.map(Datum::I64).unwrap_or(Datum::Null)]);
        }
        chunk
    }

    #[test]
    fn groups_within_one_chunk() {
        let mut checker = VecGroupChecker::new(vec![Expr::col(0)]);
        let chunk = chunk_of(&[Some(1), Some(1), None, None, Some(2)]);
        assert!(!checker.split_into_groups(&chunk).unwrap());
        assert_eq!(checker.group_count(), 3);
        assert_eq!(checker.next_group(), Some(0..2));
        assert_eq!(checker.next_group(), Some(2..4));
        assert!(!checker.is_exhausted());
        assert_eq!(checker.next_group(), Some(4..5));
        assert!(checker.is_exhausted());
        assert_eq!(checker.next_group(), None);
    }

    #[test]
    fn continuation_across_chunks() {
        let mut checker = VecGroupChecker::new(vec![Expr::col(0)]);
        checker.split_into_groups(&chunk_of(&[Some(1), Some(2)])).unwrap();
        assert!(checker.split_into_groups(&chunk_of(&[Some(2), Some(3)])).unwrap());
        assert!(!checker.split_into_groups(&chunk_of(&[Some(4)])).unwrap());
        checker.reset();
        assert!(!checker.split_into_groups(&chunk_of(&[Some(4)])).unwrap());
    }

    #[test]
    fn no_group_by_means_one_group() {
        let mut checker = VecGroupChecker::new(Vec::new());
        assert!(!checker.split_into_groups(&chunk_of(&[Some(1), Some(2)])).unwrap());
        assert_eq!(checker.group_count(), 1);
        assert!(checker.split_into_groups(&chunk_of(&[Some(3)])).unwrap());
    }

    #[test]
    fn empty_chunk_has_no_groups() {
        let mut checker = VecGroupChecker::new(vec![Expr::col(0)]);
        assert!(!checker.split_into_groups(&chunk_of(&[])).unwrap());
        assert_eq!(checker.group_count(), 0);
        assert!(checker.is_exhausted());
    }
}
