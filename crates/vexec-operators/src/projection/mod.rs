//! Projection: evaluates one expression per output column, one output row per
//! input row.
//!
//! With `projection_concurrency == 0` the child is read inline with exactly
//! the caller's demand. Otherwise a background fetcher reads ahead and a pool
//! of workers evaluates batches concurrently (see [`parallel`]).

mod parallel;

use vexec_core::chunk::Chunk;
use vexec_core::prelude::{Field, Schema};
use vexec_core::types::Column;

use crate::context::ExecContext;
use crate::expr::Expr;
use crate::traits::{BaseExecutor, BoxedExecutor, Executor, OpError, Result};

use self::parallel::ParallelProjector;

/// Evaluate every projection expression over `input`.
pub(crate) fn project(exprs: &[Expr], input: &Chunk) -> Result<Vec<Column>> {
    exprs.iter().map(|e| e.eval_chunk(input)).collect()
}

enum Mode {
    Serial { child_chunk: Chunk },
    Parallel(ParallelProjector),
}

pub struct ProjectionExec {
    base: BaseExecutor,
    exprs: Vec<Expr>,
    mode: Option<Mode>,
}

impl ProjectionExec {
    pub fn new(child: BoxedExecutor, exprs: Vec<Expr>) -> Result<Self> {
        if exprs.is_empty() {
            return Err(OpError::Plan("projection needs at least one expression".into()));
        }
        let input = child.schema();
        let mut fields = Vec::with_capacity(exprs.len());
        for expr in &exprs {
            let data_type = expr.data_type(input)?;
            let field = match expr.as_column().and_then(|idx| input.field(idx)) {
                Some(f) => f.clone(),
                None => Field::new(expr.to_string(), data_type, true),
            };
            fields.push(field);
        }
        Ok(Self {
            base: BaseExecutor::new(Schema::new(fields), vec![child]),
            exprs,
            mode: None,
        })
    }

    fn next_serial(
        base: &mut BaseExecutor,
        exprs: &[Expr],
        child_chunk: &mut Chunk,
        ctx: &ExecContext,
        chunk: &mut Chunk,
    ) -> Result<()> {
        ctx.check_cancelled()?;
        let max = base.max_chunk_size();
        child_chunk.set_required_rows(chunk.required_rows(), max);
        base.child(0).next(ctx, child_chunk)?;
        if child_chunk.is_empty() {
            return Ok(());
        }
        chunk.set_columns(project(exprs, child_chunk)?);
        Ok(())
    }
}

impl Executor for ProjectionExec {
    fn name(&self) -> &'static str {
        "projection"
    }

    fn schema(&self) -> &Schema {
        self.base.schema()
    }

    fn open(&mut self, ctx: &ExecContext) -> Result<()> {
        self.base.open(ctx)?;
        let workers = ctx.config().projection_concurrency;
        self.mode = Some(if workers == 0 {
            Mode::Serial {
                child_chunk: self.base.new_child_chunk(0),
            }
        } else {
            Mode::Parallel(ParallelProjector::new(workers, self.exprs.clone()))
        });
        tracing::debug!(workers, exprs = self.exprs.len(), "projection opened");
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<()> {
        chunk.reset();
        if chunk.required_rows() == 0 {
            return Ok(());
        }
        match self.mode.as_mut() {
            Some(Mode::Serial { child_chunk }) => {
                Self::next_serial(&mut self.base, &self.exprs, child_chunk, ctx, chunk)
            }
            Some(Mode::Parallel(projector)) => projector.next(&mut self.base, ctx, chunk),
            None => Err(OpError::Exec("projection read before open".into())),
        }
    }

    fn close(&mut self) -> Result<()> {
        let stopped = match self.mode.take() {
            Some(Mode::Parallel(mut projector)) => projector.stop(&mut self.base),
            _ => Ok(()),
        };
        let closed = self.base.close();
        stopped.and(closed)
    }
}
