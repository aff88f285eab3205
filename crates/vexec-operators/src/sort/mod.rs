//! Full sort and the ordering specification shared with Top-N.

pub mod topn;

use std::cmp::Ordering;

use vexec_core::chunk::Chunk;
use vexec_core::prelude::Schema;
use vexec_core::types::Datum;
use vexec_mem::BudgetGuardImpl;

use crate::context::ExecContext;
use crate::expr::Expr;
use crate::traits::{BaseExecutor, BoxedExecutor, Executor, Result};

/// One ordering term: expression, direction and NULL placement.
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub expr: Expr,
    pub descending: bool,
    pub nulls_first: bool,
}

impl SortKey {
    /// Ascending with NULLs first.
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
            nulls_first: true,
        }
    }

    /// Descending with NULLs last.
    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
            nulls_first: false,
        }
    }

    pub fn with_nulls_first(mut self, nulls_first: bool) -> Self {
        self.nulls_first = nulls_first;
        self
    }

    pub fn compare(&self, a: &Datum, b: &Datum) -> Ordering {
        match (a.is_null(), b.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_first => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if self.nulls_first => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ord = a.total_cmp(b);
                if self.descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
        }
    }
}

/// Compare two evaluated key tuples under `keys`.
pub fn compare_keys(keys: &[SortKey], a: &[Datum], b: &[Datum]) -> Ordering {
    for (key, (x, y)) in keys.iter().zip(a.iter().zip(b.iter())) {
        match key.compare(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Evaluate every sort key over `chunk`, returning one key tuple per row.
pub(crate) fn eval_key_rows(keys: &[SortKey], chunk: &Chunk) -> Result<Vec<Vec<Datum>>> {
    let mut rows: Vec<Vec<Datum>> = (0..chunk.num_rows())
        .map(|_| Vec::with_capacity(keys.len()))
        .collect();
    for key in keys {
        let col = key.expr.eval_chunk(chunk)?;
        for (row, value) in rows.iter_mut().zip(col.values) {
            row.push(value);
        }
    }
    Ok(rows)
}

pub(crate) fn row_bytes(row: &[Datum]) -> usize {
    row.iter().map(Datum::estimated_bytes).sum()
}

/// In-memory sort. Materializes the whole input on the first `next`, sorts
/// it stably, then drains it by the caller's demand.
pub struct SortExec {
    base: BaseExecutor,
    keys: Vec<SortKey>,
    rows: Vec<Vec<Datum>>,
    /// Row indices in output order.
    order: Vec<usize>,
    cursor: usize,
    fetched: bool,
    guard: Option<BudgetGuardImpl>,
}

impl SortExec {
    pub fn new(child: BoxedExecutor, keys: Vec<SortKey>) -> Self {
        let schema = child.schema().clone();
        Self {
            base: BaseExecutor::new(schema, vec![child]),
            keys,
            rows: Vec::new(),
            order: Vec::new(),
            cursor: 0,
            fetched: false,
            guard: None,
        }
    }

    fn fetch_all(&mut self, ctx: &ExecContext) -> Result<()> {
        let max = self.base.max_chunk_size();
        let mut child_chunk = self.base.new_child_chunk(0);
        let mut key_rows = Vec::new();
        loop {
            ctx.check_cancelled()?;
            child_chunk.set_required_rows(max, max);
            self.base.child(0).next(ctx, &mut child_chunk)?;
            if child_chunk.is_empty() {
                break;
            }
            let keys = eval_key_rows(&self.keys, &child_chunk)?;
            let bytes = child_chunk.estimated_bytes() + keys.iter().map(|k| row_bytes(k)).sum::<usize>();
            if let Some(guard) = self.guard.as_mut() {
                guard.grow(bytes)?;
            }
            for row in 0..child_chunk.num_rows() {
                self.rows.push(child_chunk.row(row));
            }
            key_rows.extend(keys);
            tracing::trace!(rows = child_chunk.num_rows(), buffered = self.rows.len(), "sort buffered batch");
        }

        self.order = (0..self.rows.len()).collect();
        let keys = &self.keys;
        // Stable: equal keys keep input order.
        self.order
            .sort_by(|&a, &b| compare_keys(keys, &key_rows[a], &key_rows[b]));
        tracing::debug!(rows = self.rows.len(), "sort materialized");
        Ok(())
    }
}

impl Executor for SortExec {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn schema(&self) -> &Schema {
        self.base.schema()
    }

    fn open(&mut self, ctx: &ExecContext) -> Result<()> {
        self.base.open(ctx)?;
        self.rows.clear();
        self.order.clear();
        self.cursor = 0;
        self.fetched = false;
        self.guard = Some(ctx.budget().reserve("sort"));
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<()> {
        chunk.reset();
        if chunk.required_rows() == 0 {
            return Ok(());
        }
        if !self.fetched {
            self.fetch_all(ctx)?;
            self.fetched = true;
        }
        while !chunk.is_full() && self.cursor < self.order.len() {
            let idx = self.order[self.cursor];
            chunk.append_row(std::mem::take(&mut self.rows[idx]));
            self.cursor += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.rows = Vec::new();
        self.order = Vec::new();
        self.guard = None;
        self.base.close()
    }
}
