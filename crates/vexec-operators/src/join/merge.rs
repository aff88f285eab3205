//! Merge join over two inputs sorted ascending on their join keys.
//!
//! The outer side is read batch by batch; for outer-style joins the caller's
//! remaining demand is pushed down to it, since every outer row yields at
//! least one output row. The inner side is read at full capacity and buffered
//! one key group at a time as owned rows, capped by `max_join_group_rows` and
//! the query memory budget. Matching resumes mid-group across calls, so a
//! small demand never loses or repeats output.
//!
//! NULL join keys never match. For `RightOuter` the right child is the outer
//! side; the output layout is always left columns followed by right columns.

use std::cmp::Ordering;

use vexec_core::chunk::Chunk;
use vexec_core::prelude::Schema;
use vexec_core::types::{Column, Datum};
use vexec_mem::BudgetGuardImpl;

use crate::context::ExecContext;
use crate::expr::Expr;
use crate::sort::row_bytes;
use crate::traits::{BaseExecutor, BoxedExecutor, Executor, OpError, Result};

use super::JoinType;

const OUTER: usize = 0;
const INNER: usize = 1;

fn eval_keys(keys: &[Expr], chunk: &Chunk) -> Result<Vec<Column>> {
    keys.iter().map(|k| k.eval_chunk(chunk)).collect()
}

struct OuterSide {
    keys: Vec<Expr>,
    chunk: Chunk,
    key_cols: Vec<Column>,
    row: usize,
    has_match: bool,
    has_null: bool,
}

impl OuterSide {
    fn advance(&mut self) {
        self.row += 1;
        self.has_match = false;
        self.has_null = false;
    }

    fn key_has_null(&self) -> bool {
        self.key_cols.iter().any(|c| c.is_null(self.row))
    }
}

struct InnerSide {
    keys: Vec<Expr>,
    chunk: Chunk,
    key_cols: Vec<Column>,
    row: usize,
    exhausted: bool,
    group: Vec<Vec<Datum>>,
    group_key: Vec<Datum>,
    has_group: bool,
    /// Next group row to try against the current outer row.
    cursor: usize,
    max_group_rows: usize,
    guard: Option<BudgetGuardImpl>,
}

impl InnerSide {
    /// Make sure `row` points at a buffered inner row, reading a new batch
    /// if needed. False once the inner child is exhausted.
    fn ensure_rows(&mut self, child: &mut BoxedExecutor, ctx: &ExecContext, max: usize) -> Result<bool> {
        if self.row < self.chunk.num_rows() {
            return Ok(true);
        }
        if self.exhausted {
            return Ok(false);
        }
        ctx.check_cancelled()?;
        self.chunk.set_required_rows(max, max);
        child.next(ctx, &mut self.chunk)?;
        self.row = 0;
        if self.chunk.is_empty() {
            self.exhausted = true;
            self.key_cols.clear();
            return Ok(false);
        }
        self.key_cols = eval_keys(&self.keys, &self.chunk)?;
        Ok(true)
    }

    fn row_in_group(&self) -> bool {
        self.key_cols
            .iter()
            .zip(&self.group_key)
            .all(|(col, key)| col.get(self.row).total_cmp(key).is_eq())
    }

    /// Buffer the next run of equal-key inner rows.
    fn next_group(&mut self, child: &mut BoxedExecutor, ctx: &ExecContext, max: usize) -> Result<()> {
        self.group.clear();
        self.cursor = 0;
        self.has_group = false;
        if let Some(guard) = self.guard.as_mut() {
            guard.release_all();
        }
        if !self.ensure_rows(child, ctx, max)? {
            return Ok(());
        }
        self.group_key = self.key_cols.iter().map(|c| c.get(self.row).clone()).collect();
        self.has_group = true;
        loop {
            while self.row < self.chunk.num_rows() {
                if !self.row_in_group() {
                    return Ok(());
                }
                if self.group.len() >= self.max_group_rows {
                    return Err(OpError::Exec(format!(
                        "merge join inner key group exceeds {} rows",
                        self.max_group_rows
                    )));
                }
                let row = self.chunk.row(self.row);
                if let Some(guard) = self.guard.as_mut() {
                    guard.grow(row_bytes(&row))?;
                }
                self.group.push(row);
                self.row += 1;
            }
            if !self.ensure_rows(child, ctx, max)? {
                tracing::trace!(rows = self.group.len(), "merge join last inner group");
                return Ok(());
            }
        }
    }

    fn group_has_null(&self) -> bool {
        self.group_key.iter().any(Datum::is_null)
    }
}

/// Evaluate the non-equi conditions on a joined row: `Some(true)` when all
/// hold, `Some(false)` when one is false, `None` when the result is NULL.
fn eval_other(conds: &[Expr], left: &[Datum], right: &[Datum]) -> Result<Option<bool>> {
    if conds.is_empty() {
        return Ok(Some(true));
    }
    let mut joined = Vec::with_capacity(left.len() + right.len());
    joined.extend_from_slice(left);
    joined.extend_from_slice(right);
    let mut result = Some(true);
    for cond in conds {
        let v = cond.eval_values(&joined)?;
        if v.is_null() {
            result = None;
        } else if !v.is_true() {
            return Ok(Some(false));
        }
    }
    Ok(result)
}

pub struct MergeJoinExec {
    base: BaseExecutor,
    join_type: JoinType,
    other_conditions: Vec<Expr>,
    outer: OuterSide,
    inner: InnerSide,
    inner_width: usize,
    prepared: bool,
    done: bool,
}

impl MergeJoinExec {
    pub fn new(
        left: BoxedExecutor,
        right: BoxedExecutor,
        join_type: JoinType,
        left_keys: Vec<Expr>,
        right_keys: Vec<Expr>,
        other_conditions: Vec<Expr>,
    ) -> Result<Self> {
        if left_keys.is_empty() || left_keys.len() != right_keys.len() {
            return Err(OpError::Plan(format!(
                "merge join needs matching key lists, got {} and {}",
                left_keys.len(),
                right_keys.len()
            )));
        }
        for (l, r) in left_keys.iter().zip(&right_keys) {
            let lt = l.data_type(left.schema())?;
            let rt = r.data_type(right.schema())?;
            if lt != rt && !(lt.is_numeric() && rt.is_numeric()) {
                return Err(OpError::Plan(format!("cannot join {} with {}", lt, rt)));
            }
        }
        let joined = Schema::join(left.schema(), right.schema());
        for cond in &other_conditions {
            cond.data_type(&joined)?;
        }
        let schema = join_type.output_schema(left.schema(), right.schema());

        let (outer, inner, outer_keys, inner_keys) = if join_type.right_is_outer() {
            (right, left, right_keys, left_keys)
        } else {
            (left, right, left_keys, right_keys)
        };
        let inner_width = inner.schema().len();
        let outer_chunk = Chunk::with_schema(outer.schema(), 0);
        let inner_chunk = Chunk::with_schema(inner.schema(), 0);

        Ok(Self {
            base: BaseExecutor::new(schema, vec![outer, inner]),
            join_type,
            other_conditions,
            outer: OuterSide {
                keys: outer_keys,
                chunk: outer_chunk,
                key_cols: Vec::new(),
                row: 0,
                has_match: false,
                has_null: false,
            },
            inner: InnerSide {
                keys: inner_keys,
                chunk: inner_chunk,
                key_cols: Vec::new(),
                row: 0,
                exhausted: false,
                group: Vec::new(),
                group_key: Vec::new(),
                has_group: false,
                cursor: 0,
                max_group_rows: usize::MAX,
                guard: None,
            },
            inner_width,
            prepared: false,
            done: false,
        })
    }

    fn fetch_outer(&mut self, ctx: &ExecContext, remaining: usize) -> Result<bool> {
        ctx.check_cancelled()?;
        let max = self.base.max_chunk_size();
        let required = if self.join_type.is_outer() { remaining } else { max };
        self.outer.chunk.set_required_rows(required, max);
        self.base.child(OUTER).next(ctx, &mut self.outer.chunk)?;
        self.outer.row = 0;
        self.outer.has_match = false;
        self.outer.has_null = false;
        if self.outer.chunk.is_empty() {
            self.outer.key_cols.clear();
            return Ok(false);
        }
        self.outer.key_cols = eval_keys(&self.outer.keys, &self.outer.chunk)?;
        Ok(true)
    }

    /// Order of the current outer row relative to the current inner group.
    /// `Less` means the outer row cannot match, `Greater` that the inner
    /// group cannot match.
    fn compare_current(&self) -> Ordering {
        if self.outer.key_has_null() || !self.inner.has_group {
            return Ordering::Less;
        }
        if self.inner.group_has_null() {
            return Ordering::Greater;
        }
        for (col, key) in self.outer.key_cols.iter().zip(&self.inner.group_key) {
            match col.get(self.outer.row).total_cmp(key) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    fn on_miss(&self, chunk: &mut Chunk) {
        let outer_row = || self.outer.chunk.row(self.outer.row);
        let flag = |unmatched: bool| {
            if self.outer.has_null {
                Datum::Null
            } else {
                Datum::Bool(unmatched)
            }
        };
        match self.join_type {
            JoinType::Inner | JoinType::Semi => {}
            JoinType::LeftOuter => {
                chunk.append_joined(&outer_row(), &vec![Datum::Null; self.inner_width]);
            }
            JoinType::RightOuter => {
                chunk.append_joined(&vec![Datum::Null; self.inner_width], &outer_row());
            }
            JoinType::AntiSemi => chunk.append_row(outer_row()),
            JoinType::LeftOuterSemi => chunk.append_joined(&outer_row(), &[flag(false)]),
            JoinType::AntiLeftOuterSemi => chunk.append_joined(&outer_row(), &[flag(true)]),
        }
    }

    /// Match the current outer row against the inner group from the resume
    /// cursor on.
    fn try_match(&mut self, chunk: &mut Chunk) -> Result<()> {
        let outer_row = self.outer.chunk.row(self.outer.row);
        let right_is_outer = self.join_type.right_is_outer();
        match self.join_type {
            JoinType::Inner | JoinType::LeftOuter | JoinType::RightOuter => {
                while self.inner.cursor < self.inner.group.len() && !chunk.is_full() {
                    let inner_row = &self.inner.group[self.inner.cursor];
                    let (left, right) = if right_is_outer {
                        (inner_row.as_slice(), outer_row.as_slice())
                    } else {
                        (outer_row.as_slice(), inner_row.as_slice())
                    };
                    match eval_other(&self.other_conditions, left, right)? {
                        Some(true) => {
                            chunk.append_joined(left, right);
                            self.outer.has_match = true;
                        }
                        Some(false) => {}
                        None => self.outer.has_null = true,
                    }
                    self.inner.cursor += 1;
                }
            }
            JoinType::Semi | JoinType::AntiSemi | JoinType::LeftOuterSemi | JoinType::AntiLeftOuterSemi => {
                while self.inner.cursor < self.inner.group.len() {
                    let inner_row = &self.inner.group[self.inner.cursor];
                    self.inner.cursor += 1;
                    match eval_other(&self.other_conditions, &outer_row, inner_row)? {
                        Some(true) => {
                            self.outer.has_match = true;
                            break;
                        }
                        Some(false) => {}
                        None => self.outer.has_null = true,
                    }
                }
                self.inner.cursor = self.inner.group.len();
                if self.outer.has_match {
                    match self.join_type {
                        JoinType::Semi => chunk.append_row(outer_row),
                        JoinType::LeftOuterSemi => chunk.append_joined(&outer_row, &[Datum::Bool(true)]),
                        JoinType::AntiLeftOuterSemi => {
                            chunk.append_joined(&outer_row, &[Datum::Bool(false)])
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(())
    }

    /// Produce rows until `chunk` is full (true) or the join is done (false).
    fn join_to_chunk(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<bool> {
        let max = self.base.max_chunk_size();
        loop {
            if self.outer.row >= self.outer.chunk.num_rows() {
                if !self.fetch_outer(ctx, chunk.remaining())? {
                    return Ok(false);
                }
            }
            if !self.inner.has_group
                && self.inner.exhausted
                && matches!(self.join_type, JoinType::Inner | JoinType::Semi)
            {
                // Nothing left that could match.
                return Ok(false);
            }

            match self.compare_current() {
                Ordering::Greater => {
                    self.inner.next_group(self.base.child(INNER), ctx, max)?;
                    continue;
                }
                Ordering::Less => {
                    self.on_miss(chunk);
                    self.outer.advance();
                }
                Ordering::Equal => {
                    self.try_match(chunk)?;
                    if self.inner.cursor >= self.inner.group.len() {
                        if !self.outer.has_match {
                            self.on_miss(chunk);
                        }
                        self.outer.advance();
                        self.inner.cursor = 0;
                    }
                }
            }
            if chunk.is_full() {
                return Ok(true);
            }
        }
    }
}

impl Executor for MergeJoinExec {
    fn name(&self) -> &'static str {
        "merge_join"
    }

    fn schema(&self) -> &Schema {
        self.base.schema()
    }

    fn open(&mut self, ctx: &ExecContext) -> Result<()> {
        self.base.open(ctx)?;
        self.outer.chunk = self.base.new_child_chunk(OUTER);
        self.outer.key_cols.clear();
        self.outer.row = 0;
        self.outer.has_match = false;
        self.outer.has_null = false;
        self.inner.chunk = self.base.new_child_chunk(INNER);
        self.inner.key_cols.clear();
        self.inner.row = 0;
        self.inner.exhausted = false;
        self.inner.group.clear();
        self.inner.has_group = false;
        self.inner.cursor = 0;
        self.inner.max_group_rows = ctx.config().max_join_group_rows;
        self.inner.guard = Some(ctx.budget().reserve("merge_join"));
        self.prepared = false;
        self.done = false;
        tracing::debug!(join_type = ?self.join_type, "merge join opened");
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<()> {
        chunk.reset();
        if chunk.required_rows() == 0 || self.done {
            return Ok(());
        }
        if !self.prepared {
            let max = self.base.max_chunk_size();
            self.inner.next_group(self.base.child(INNER), ctx, max)?;
            self.prepared = true;
        }
        while !chunk.is_full() {
            if !self.join_to_chunk(ctx, chunk)? {
                self.done = true;
                break;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.outer.chunk.reset();
        self.outer.key_cols.clear();
        self.inner.chunk.reset();
        self.inner.key_cols.clear();
        self.inner.group = Vec::new();
        self.inner.guard = None;
        self.base.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use vexec_core::prelude::{DataType, Field};

    fn source(name: &str, keys: &[Option<i64>]) -> BoxedExecutor {
        let schema = Schema::new(vec![
            Field::new(format!("{}_k", name), DataType::Int64, true),
            Field::new(format!("{}_i", name), DataType::Int64, false),
        ]);
        let rows = keys
            .iter()
            .enumerate()
            .map(|(i, k)| vec![k.map(Datum::I64).unwrap_or(Datum::Null), Datum::I64(i as i64)])
            .collect();
        Box::new(MemorySource::from_rows(schema, rows))
    }

    fn run(join_type: JoinType, left: &[Option<i64>], right: &[Option<i64>], required: usize) -> Vec<Vec<Datum>> {
        let ctx = ExecContext::default();
        let mut join = MergeJoinExec::new(
            source("l", left),
            source("r", right),
            join_type,
            vec![Expr::col(0)],
            vec![Expr::col(0)],
            Vec::new(),
        )
        .unwrap();
        join.open(&ctx).unwrap();
        let mut out = Vec::new();
        loop {
            let chunk = join.next_batch(&ctx, required).unwrap();
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.num_rows() <= required);
            out.extend((0..chunk.num_rows()).map(|r| chunk.row(r)));
        }
        join.close().unwrap();
        out
    }

    fn ids(rows: &[Vec<Datum>], cols: &[usize]) -> Vec<Vec<Datum>> {
        rows.iter()
            .map(|r| cols.iter().map(|c| r[*c].clone()).collect())
            .collect()
    }

    const LEFT: [Option<i64>; 5] = [None, Some(1), Some(2), Some(2), Some(4)];
    const RIGHT: [Option<i64>; 5] = [None, Some(2), Some(2), Some(3), Some(4)];

    #[test]
    fn inner_join_resumes_mid_group() {
        let rows = run(JoinType::Inner, &LEFT, &RIGHT, 1);
        let i = |v: i64| Datum::I64(v);
        assert_eq!(
            ids(&rows, &[1, 3]),
            vec![
                vec![i(2), i(1)],
                vec![i(2), i(2)],
                vec![i(3), i(1)],
                vec![i(3), i(2)],
                vec![i(4), i(4)],
            ]
        );
    }

    #[test]
    fn left_outer_pads_with_nulls() {
        let rows = run(JoinType::LeftOuter, &LEFT, &RIGHT, 3);
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0], vec![Datum::Null, Datum::I64(0), Datum::Null, Datum::Null]);
        assert_eq!(rows[1], vec![Datum::I64(1), Datum::I64(1), Datum::Null, Datum::Null]);
    }

    #[test]
    fn right_outer_keeps_left_columns_first() {
        let rows = run(JoinType::RightOuter, &LEFT, &RIGHT, 1024);
        // r0 (NULL) and r3 (3) are unmatched.
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0], vec![Datum::Null, Datum::Null, Datum::Null, Datum::I64(0)]);
        let unmatched_three = vec![Datum::Null, Datum::Null, Datum::I64(3), Datum::I64(3)];
        assert!(rows.contains(&unmatched_three));
    }

    #[test]
    fn semi_and_anti_semi() {
        let semi = run(JoinType::Semi, &LEFT, &RIGHT, 1024);
        assert_eq!(ids(&semi, &[1]), vec![vec![Datum::I64(2)], vec![Datum::I64(3)], vec![Datum::I64(4)]]);
        let anti = run(JoinType::AntiSemi, &LEFT, &RIGHT, 1024);
        assert_eq!(ids(&anti, &[1]), vec![vec![Datum::I64(0)], vec![Datum::I64(1)]]);
    }

    #[test]
    fn left_outer_semi_flags() {
        let rows = run(JoinType::LeftOuterSemi, &LEFT, &RIGHT, 2);
        let flags: Vec<_> = rows.iter().map(|r| r[2].clone()).collect();
        let b = Datum::Bool;
        assert_eq!(flags, vec![b(false), b(false), b(true), b(true), b(true)]);
        let rows = run(JoinType::AntiLeftOuterSemi, &LEFT, &RIGHT, 2);
        let flags: Vec<_> = rows.iter().map(|r| r[2].clone()).collect();
        assert_eq!(flags, vec![b(true), b(true), b(false), b(false), b(false)]);
    }

    #[test]
    fn other_conditions_filter_pairs() {
        let ctx = ExecContext::default();
        // Keep pairs whose left row id is at most the right row id + 1.
        let cond = Expr::col(1).lt(Expr::col(3).plus(Expr::lit(Datum::I64(2))));
        let mut join = MergeJoinExec::new(
            source("l", &LEFT),
            source("r", &RIGHT),
            JoinType::Inner,
            vec![Expr::col(0)],
            vec![Expr::col(0)],
            vec![cond],
        )
        .unwrap();
        join.open(&ctx).unwrap();
        let chunk = join.next_batch(&ctx, 1024).unwrap();
        // (2,1) (2,2) (3,2) (4,4) survive; (3,1) does not.
        assert_eq!(chunk.num_rows(), 4);
        join.close().unwrap();
    }

    #[test]
    fn inner_group_cap() {
        let ctx = ExecContext::new(vexec_core::config::ExecConfig::default().with_max_join_group_rows(2));
        let mut join = MergeJoinExec::new(
            source("l", &[Some(1)]),
            source("r", &[Some(1), Some(1), Some(1)]),
            JoinType::Inner,
            vec![Expr::col(0)],
            vec![Expr::col(0)],
            Vec::new(),
        )
        .unwrap();
        join.open(&ctx).unwrap();
        assert!(matches!(join.next_batch(&ctx, 10), Err(OpError::Exec(_))));
        join.close().unwrap();
    }

    #[test]
    fn mismatched_keys_rejected() {
        let err = MergeJoinExec::new(
            source("l", &[]),
            source("r", &[]),
            JoinType::Inner,
            vec![Expr::col(0)],
            Vec::new(),
            Vec::new(),
        );
        assert!(matches!(err, Err(OpError::Plan(_))));
    }
}
