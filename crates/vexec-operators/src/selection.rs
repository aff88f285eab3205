//! Selection (WHERE): keeps rows for which every predicate is true.
//!
//! The child is always read at full capacity. The unconsumed tail of a child
//! batch is kept across calls, so a small demand never discards input and a
//! new batch is only pulled while the caller's demand is still unmet.

use vexec_core::chunk::Chunk;
use vexec_core::prelude::Schema;

use crate::context::ExecContext;
use crate::expr::{vectorized_filter, Expr};
use crate::traits::{BaseExecutor, BoxedExecutor, Executor, Result};

pub struct SelectionExec {
    base: BaseExecutor,
    filters: Vec<Expr>,
    child_chunk: Chunk,
    selected: Vec<bool>,
    /// Next row of `child_chunk` to inspect.
    input_row: usize,
}

impl SelectionExec {
    pub fn new(child: BoxedExecutor, filters: Vec<Expr>) -> Self {
        let schema = child.schema().clone();
        Self {
            child_chunk: Chunk::with_schema(&schema, 0),
            base: BaseExecutor::new(schema, vec![child]),
            filters,
            selected: Vec::new(),
            input_row: 0,
        }
    }
}

impl Executor for SelectionExec {
    fn name(&self) -> &'static str {
        "selection"
    }

    fn schema(&self) -> &Schema {
        self.base.schema()
    }

    fn open(&mut self, ctx: &ExecContext) -> Result<()> {
        self.base.open(ctx)?;
        self.child_chunk = self.base.new_child_chunk(0);
        self.selected.clear();
        self.input_row = 0;
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<()> {
        chunk.reset();
        if chunk.required_rows() == 0 {
            return Ok(());
        }
        let max = self.base.max_chunk_size();
        loop {
            while self.input_row < self.child_chunk.num_rows() {
                if chunk.is_full() {
                    return Ok(());
                }
                if self.selected[self.input_row] {
                    chunk.append_row_from(&self.child_chunk, self.input_row);
                }
                self.input_row += 1;
            }
            if chunk.is_full() {
                return Ok(());
            }

            ctx.check_cancelled()?;
            self.child_chunk.set_required_rows(max, max);
            self.input_row = 0;
            self.base.child(0).next(ctx, &mut self.child_chunk)?;
            if self.child_chunk.is_empty() {
                return Ok(());
            }
            if let Err(e) = vectorized_filter(&self.filters, &self.child_chunk, &mut self.selected) {
                self.child_chunk.reset();
                return Err(e);
            }
            tracing::trace!(
                input = self.child_chunk.num_rows(),
                selected = self.selected.iter().filter(|s| **s).count(),
                "selection filtered batch"
            );
        }
    }

    fn close(&mut self) -> Result<()> {
        self.child_chunk.reset();
        self.selected.clear();
        self.input_row = 0;
        self.base.close()
    }
}
