//! Top-N: ORDER BY ... LIMIT count OFFSET offset with memory bounded by
//! `offset + count` rows.
//!
//! Loading phase: ask the child for exactly the rows still missing from the
//! limit. Heap phase: pull capacity-sized batches until the child is empty
//! and replace the heap maximum whenever a row sorts strictly before it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use vexec_core::chunk::Chunk;
use vexec_core::prelude::Schema;
use vexec_core::types::Datum;
use vexec_mem::BudgetGuardImpl;

use crate::context::ExecContext;
use crate::traits::{BaseExecutor, BoxedExecutor, Executor, Result};

use super::{compare_keys, eval_key_rows, row_bytes, SortKey};

/// Heap entry ordered by `(key, seq)`; `seq` is the input position, so equal
/// keys keep input order exactly as a stable sort would.
struct HeapEntry {
    key: Vec<Datum>,
    seq: usize,
    row: Vec<Datum>,
    order: Arc<[SortKey]>,
}

impl HeapEntry {
    fn bytes(&self) -> usize {
        row_bytes(&self.key) + row_bytes(&self.row)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.order, &self.key, &other.key).then(self.seq.cmp(&other.seq))
    }
}

pub struct TopNExec {
    base: BaseExecutor,
    order: Arc<[SortKey]>,
    offset: usize,
    total_limit: usize,
    heap: BinaryHeap<HeapEntry>,
    /// Output rows after materialization, offset already skipped.
    rows: Vec<Vec<Datum>>,
    cursor: usize,
    seq: usize,
    fetched: bool,
    guard: Option<BudgetGuardImpl>,
}

impl TopNExec {
    pub fn new(child: BoxedExecutor, keys: Vec<SortKey>, offset: usize, count: usize) -> Self {
        let schema = child.schema().clone();
        Self {
            base: BaseExecutor::new(schema, vec![child]),
            order: keys.into(),
            offset,
            total_limit: offset.saturating_add(count),
            heap: BinaryHeap::new(),
            rows: Vec::new(),
            cursor: 0,
            seq: 0,
            fetched: false,
            guard: None,
        }
    }

    fn grow(&mut self, bytes: usize) -> Result<()> {
        if let Some(guard) = self.guard.as_mut() {
            guard.grow(bytes)?;
        }
        Ok(())
    }

    fn shrink(&mut self, bytes: usize) {
        if let Some(guard) = self.guard.as_mut() {
            guard.shrink(bytes);
        }
    }

    fn load(&mut self, ctx: &ExecContext, child_chunk: &mut Chunk) -> Result<()> {
        let max = self.base.max_chunk_size();
        while self.heap.len() < self.total_limit {
            ctx.check_cancelled()?;
            child_chunk.set_required_rows(self.total_limit - self.heap.len(), max);
            self.base.child(0).next(ctx, child_chunk)?;
            if child_chunk.is_empty() {
                break;
            }
            let keys = eval_key_rows(&self.order, child_chunk)?;
            for (row, key) in keys.into_iter().enumerate() {
                let entry = HeapEntry {
                    key,
                    seq: self.seq,
                    row: child_chunk.row(row),
                    order: Arc::clone(&self.order),
                };
                self.seq += 1;
                self.grow(entry.bytes())?;
                self.heap.push(entry);
            }
        }
        tracing::debug!(loaded = self.heap.len(), limit = self.total_limit, "top-n loaded");
        Ok(())
    }

    fn consume_rest(&mut self, ctx: &ExecContext, child_chunk: &mut Chunk) -> Result<()> {
        let max = self.base.max_chunk_size();
        loop {
            ctx.check_cancelled()?;
            child_chunk.set_required_rows(max, max);
            self.base.child(0).next(ctx, child_chunk)?;
            if child_chunk.is_empty() {
                return Ok(());
            }
            let keys = eval_key_rows(&self.order, child_chunk)?;
            for (row, key) in keys.into_iter().enumerate() {
                let seq = self.seq;
                self.seq += 1;
                let replace = match self.heap.peek() {
                    // Later rows carry a larger seq, so only a strictly
                    // smaller key can beat the current maximum.
                    Some(top) => compare_keys(&self.order, &key, &top.key) == Ordering::Less,
                    None => false,
                };
                if !replace {
                    continue;
                }
                let entry = HeapEntry {
                    key,
                    seq,
                    row: child_chunk.row(row),
                    order: Arc::clone(&self.order),
                };
                // Release the evicted row first so the heap never needs
                // quota for more than `offset + count` rows.
                if let Some(evicted) = self.heap.pop() {
                    self.shrink(evicted.bytes());
                }
                self.grow(entry.bytes())?;
                self.heap.push(entry);
            }
        }
    }

    fn fetch_all(&mut self, ctx: &ExecContext) -> Result<()> {
        let mut child_chunk = self.base.new_child_chunk(0);
        self.load(ctx, &mut child_chunk)?;
        self.consume_rest(ctx, &mut child_chunk)?;

        let sorted = std::mem::take(&mut self.heap).into_sorted_vec();
        self.rows = sorted
            .into_iter()
            .skip(self.offset)
            .map(|entry| entry.row)
            .collect();
        tracing::debug!(rows = self.rows.len(), "top-n materialized");
        Ok(())
    }
}

impl Executor for TopNExec {
    fn name(&self) -> &'static str {
        "top_n"
    }

    fn schema(&self) -> &Schema {
        self.base.schema()
    }

    fn open(&mut self, ctx: &ExecContext) -> Result<()> {
        self.base.open(ctx)?;
        self.heap.clear();
        self.rows.clear();
        self.cursor = 0;
        self.seq = 0;
        self.fetched = false;
        self.guard = Some(ctx.budget().reserve("top_n"));
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
        while !chunk.is_full() && self.cursor < self.rows.len() {
            chunk.append_row(std::mem::take(&mut self.rows[self.cursor]));
            self.cursor += 1;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.heap = BinaryHeap::new();
        self.rows = Vec::new();
        self.guard = None;
        self.base.close()
    }
}
