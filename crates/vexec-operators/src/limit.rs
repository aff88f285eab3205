//! LIMIT / OFFSET.
//!
//! Emits input rows `[begin, end)` where `begin = offset` and
//! `end = offset + count`. The child is never asked for more rows than the
//! limit can still use: while skipping the offset it is asked for the rows to
//! skip plus the caller's demand, afterwards for the caller's demand alone,
//! both capped by the rows left before `end`.

use vexec_core::chunk::Chunk;
use vexec_core::prelude::Schema;

use crate::context::ExecContext;
use crate::traits::{BaseExecutor, BoxedExecutor, Executor, Result};

pub struct LimitExec {
    base: BaseExecutor,
    begin: usize,
    end: usize,
    /// Input rows consumed so far.
    cursor: usize,
    met_first_batch: bool,
    child_chunk: Option<Chunk>,
}

impl LimitExec {
    pub fn new(child: BoxedExecutor, offset: usize, count: usize) -> Self {
        let schema = child.schema().clone();
        Self {
            base: BaseExecutor::new(schema, vec![child]),
            begin: offset,
            end: offset.saturating_add(count),
            cursor: 0,
            met_first_batch: offset == 0,
            child_chunk: None,
        }
    }

    /// Skip `offset` rows and emit everything after them.
    pub fn offset_only(child: BoxedExecutor, offset: usize) -> Self {
        Self::new(child, offset, usize::MAX)
    }

    /// Child demand for a caller asking for `required` rows.
    fn child_required(&self, required: usize) -> usize {
        let limit_total = self.end - self.cursor;
        let limit_required = if self.cursor < self.begin {
            (self.begin - self.cursor).saturating_add(required)
        } else {
            required
        };
        limit_total.min(limit_required)
    }
}

impl Executor for LimitExec {
    fn name(&self) -> &'static str {
        "limit"
    }

    fn schema(&self) -> &Schema {
        self.base.schema()
    }

    fn open(&mut self, ctx: &ExecContext) -> Result<()> {
        self.base.open(ctx)?;
        self.cursor = 0;
        self.met_first_batch = self.begin == 0;
        self.child_chunk = Some(self.base.new_child_chunk(0));
        tracing::debug!(begin = self.begin, end = self.end, "limit opened");
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<()> {
        chunk.reset();
        let required = chunk.required_rows();
        if required == 0 || self.cursor >= self.end {
            return Ok(());
        }
        ctx.check_cancelled()?;
        let max = self.base.max_chunk_size();

        while !self.met_first_batch {
            let child_required = self.child_required(required);
            let mut child_chunk = match self.child_chunk.take() {
                Some(c) => c,
                None => self.base.new_child_chunk(0),
            };
            child_chunk.set_required_rows(child_required, max);
            let fetched = self.base.child(0).next(ctx, &mut child_chunk);
            let child_chunk = self.child_chunk.insert(child_chunk);
            fetched?;

            let batch = child_chunk.num_rows();
            if batch == 0 {
                return Ok(());
            }
            let new_cursor = self.cursor + batch;
            if new_cursor < self.begin {
                self.cursor = new_cursor;
                continue;
            }
            self.met_first_batch = true;
            let begin = self.begin - self.cursor;
            let end = batch.min(self.end - self.cursor);
            self.cursor += end;
            if begin == end {
                // Offset ended exactly on a batch boundary: read on below.
                break;
            }
            chunk.append_range(child_chunk, begin, end);
            return Ok(());
        }

        if self.cursor >= self.end {
            return Ok(());
        }
        chunk.set_required_rows(self.child_required(required), max);
        let fetched = self.base.child(0).next(ctx, chunk);
        chunk.set_required_rows(required, max);
        fetched?;

        let batch = chunk.num_rows();
        if self.cursor + batch > self.end {
            chunk.truncate_to(self.end - self.cursor);
        }
        self.cursor += chunk.num_rows();
        tracing::trace!(rows = chunk.num_rows(), cursor = self.cursor, "limit batch");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.child_chunk = None;
        self.base.close()
    }
}
