//! Streaming aggregation over input sorted by the group-by keys.
//!
//! The child is read at full capacity and each batch is split into groups by
//! a [`VecGroupChecker`]. Completed groups are finalized into one row each; a
//! group that reaches the end of its batch stays open until the next batch
//! (or exhaustion) shows whether it continues. A call returns as soon as the
//! caller's demand is met, leaving the remaining groups of the current batch
//! for later calls.
//!
//! The output schema holds only the aggregate results; group keys are carried
//! through with `FIRST_ROW` aggregates.

use std::ops::Range;

use vexec_core::chunk::Chunk;
use vexec_core::prelude::Schema;
use vexec_core::types::Column;

use crate::aggregate::{AggFunc, AggState};
use crate::context::ExecContext;
use crate::expr::Expr;
use crate::group_checker::VecGroupChecker;
use crate::traits::{BaseExecutor, BoxedExecutor, Executor, OpError, Result};

pub struct StreamAggExec {
    base: BaseExecutor,
    aggs: Vec<AggFunc>,
    states: Vec<AggState>,
    checker: VecGroupChecker,
    child_chunk: Chunk,
    /// Aggregate arguments evaluated over `child_chunk`.
    arg_cols: Vec<Option<Column>>,
    /// Some rows were folded into `states` and not yet emitted.
    group_open: bool,
    child_returned_rows: bool,
    executed: bool,
}

impl StreamAggExec {
    pub fn new(child: BoxedExecutor, group_by: Vec<Expr>, aggs: Vec<AggFunc>) -> Result<Self> {
        if aggs.is_empty() {
            return Err(OpError::Plan("stream aggregation needs an aggregate".into()));
        }
        let input = child.schema();
        let fields = aggs
            .iter()
            .map(|agg| agg.field(input))
            .collect::<Result<Vec<_>>>()?;
        for key in &group_by {
            key.data_type(input)?;
        }
        Ok(Self {
            child_chunk: Chunk::with_schema(input, 0),
            base: BaseExecutor::new(Schema::new(fields), vec![child]),
            states: vec![AggState::default(); aggs.len()],
            aggs,
            checker: VecGroupChecker::new(group_by),
            arg_cols: Vec::new(),
            group_open: false,
            child_returned_rows: false,
            executed: false,
        })
    }

    fn consume_range(&mut self, range: Range<usize>) -> Result<()> {
        for ((agg, state), arg) in self.aggs.iter().zip(&mut self.states).zip(&self.arg_cols) {
            agg.update_range(state, arg.as_ref(), range.start, range.end)?;
        }
        self.group_open = true;
        Ok(())
    }

    fn append_result(&mut self, chunk: &mut Chunk) -> Result<()> {
        let row = self
            .aggs
            .iter()
            .zip(&self.states)
            .map(|(agg, state)| agg.finalize(state))
            .collect::<Result<Vec<_>>>()?;
        chunk.append_row(row);
        for state in &mut self.states {
            state.reset();
        }
        self.group_open = false;
        Ok(())
    }

    /// Pull the next child batch. On exhaustion emit the open group (or the
    /// scalar default row) and mark the operator executed.
    fn fetch_child(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<bool> {
        ctx.check_cancelled()?;
        let max = self.base.max_chunk_size();
        self.child_chunk.set_required_rows(max, max);
        self.base.child(0).next(ctx, &mut self.child_chunk)?;

        if self.child_chunk.is_empty() {
            self.executed = true;
            if self.group_open {
                self.append_result(chunk)?;
            } else if !self.child_returned_rows && self.checker.group_by().is_empty() {
                // Scalar aggregation over empty input still yields one row.
                self.append_result(chunk)?;
            }
            tracing::debug!("stream aggregation input exhausted");
            return Ok(false);
        }

        self.child_returned_rows = true;
        self.arg_cols = self
            .aggs
            .iter()
            .map(|agg| agg.eval_arg(&self.child_chunk))
            .collect::<Result<Vec<_>>>()?;
        Ok(true)
    }

    fn consume_one_group(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<()> {
        if self.checker.is_exhausted() {
            if !self.fetch_child(ctx, chunk)? {
                return Ok(());
            }
            self.checker.split_into_groups(&self.child_chunk)?;
        }
        let Some(range) = self.checker.next_group() else {
            return Ok(());
        };
        let mut meet_last_group = range.end == self.child_chunk.num_rows();
        self.consume_range(range)?;

        while meet_last_group {
            meet_last_group = false;
            if !self.fetch_child(ctx, chunk)? {
                return Ok(());
            }
            if self.checker.split_into_groups(&self.child_chunk)? {
                if let Some(range) = self.checker.next_group() {
                    meet_last_group = range.end == self.child_chunk.num_rows();
                    self.consume_range(range)?;
                }
            }
        }
        self.append_result(chunk)
    }
}

impl Executor for StreamAggExec {
    fn name(&self) -> &'static str {
        "stream_agg"
    }

    fn schema(&self) -> &Schema {
        self.base.schema()
    }

    fn open(&mut self, ctx: &ExecContext) -> Result<()> {
        self.base.open(ctx)?;
        self.child_chunk = self.base.new_child_chunk(0);
        self.checker.reset();
        for state in &mut self.states {
            state.reset();
        }
        self.arg_cols.clear();
        self.group_open = false;
        self.child_returned_rows = false;
        self.executed = false;
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<()> {
        chunk.reset();
        if chunk.required_rows() == 0 {
            return Ok(());
        }
        while !self.executed && !chunk.is_full() {
            if let Err(e) = self.consume_one_group(ctx, chunk) {
                self.executed = true;
                return Err(e);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.child_chunk.reset();
        self.arg_cols.clear();
        self.checker.reset();
        self.base.close()
    }
}
