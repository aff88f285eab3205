//! Runtime: drive a root executor and report what happened.
//!
//! - `collect` opens the root, drains it at full capacity and closes it.
//! - `run_with_demand` issues one `next` per entry of an explicit demand
//!   sequence and records how many rows each call produced.
//! - `close` always runs, also after a failed `open` or `next`; the first
//!   error wins.

use thiserror::Error;

use vexec_core::chunk::Chunk;
use vexec_core::config::ExecConfig;
use vexec_mem::MemoryBudgetImpl;
use vexec_operators::{ExecContext, Executor, OpError};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid configuration: {0}")]
    Config(#[from] vexec_core::error::Error),

    #[error("operator {operator} failed: {source}")]
    Operator {
        operator: &'static str,
        #[source]
        source: OpError,
    },
}

impl ExecError {
    fn operator(root: &dyn Executor, source: OpError) -> Self {
        ExecError::Operator {
            operator: root.name(),
            source,
        }
    }

    /// The operator error behind this failure, if any.
    pub fn op_error(&self) -> Option<&OpError> {
        match self {
            ExecError::Operator { source, .. } => Some(source),
            ExecError::Config(_) => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.op_error(), Some(OpError::Cancelled))
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;

/// Outcome of a demand-driven run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rows returned by each `next` call, in call order.
    pub rows_per_call: Vec<usize>,
    pub total_rows: usize,
    pub peak_memory_bytes: usize,
}

/// Cancels the query of the engine it came from; usable from any thread.
#[derive(Clone)]
pub struct CancelHandle {
    ctx: ExecContext,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.ctx.cancel();
    }
}

/// Owns the context of one query: configuration, memory budget and the
/// cancellation flag.
pub struct Engine {
    ctx: ExecContext,
}

impl Engine {
    pub fn new(cfg: ExecConfig) -> Result<Self> {
        cfg.validate()?;
        log_engine_created(&cfg);
        Ok(Self {
            ctx: ExecContext::new(cfg),
        })
    }

    /// Engine configured from `VEXEC_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ExecConfig::from_env())
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn config(&self) -> &ExecConfig {
        self.ctx.config()
    }

    pub fn budget(&self) -> &MemoryBudgetImpl {
        self.ctx.budget()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            ctx: self.ctx.clone(),
        }
    }

    pub fn peak_memory_bytes(&self) -> usize {
        self.ctx.budget().peak_bytes()
    }

    /// Run `root` to exhaustion, returning every non-empty chunk.
    pub fn collect(&self, root: &mut dyn Executor) -> Result<Vec<Chunk>> {
        let max = self.ctx.max_chunk_size();
        self.drive(root, |root, ctx| {
            let mut out = Vec::new();
            loop {
                let chunk = root.next_batch(ctx, max)?;
                if chunk.is_empty() {
                    return Ok(out);
                }
                out.push(chunk);
            }
        })
    }

    /// Pull `root` once per entry of `demand`, stopping early on exhaustion.
    pub fn run_with_demand(&self, root: &mut dyn Executor, demand: &[usize]) -> Result<RunSummary> {
        let mut summary = self.drive(root, |root, ctx| {
            let mut summary = RunSummary::default();
            let mut chunk = root.new_chunk(ctx);
            for &required in demand {
                chunk.set_required_rows(required, ctx.max_chunk_size());
                root.next(ctx, &mut chunk)?;
                let rows = chunk.num_rows();
                summary.rows_per_call.push(rows);
                summary.total_rows += rows;
                if rows == 0 && required > 0 {
                    break;
                }
            }
            Ok(summary)
        })?;
        summary.peak_memory_bytes = self.peak_memory_bytes();
        Ok(summary)
    }

    fn drive<T>(
        &self,
        root: &mut dyn Executor,
        body: impl FnOnce(&mut dyn Executor, &ExecContext) -> vexec_operators::Result<T>,
    ) -> Result<T> {
        let result = root.open(&self.ctx).and_then(|()| body(&mut *root, &self.ctx));
        let closed = root.close();
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    log_close_failure(root.name(), &close_err);
                }
                Err(ExecError::operator(root, e))
            }
            (Ok(_), Err(e)) => Err(ExecError::operator(root, e)),
        }
    }
}

#[cfg(feature = "tracing")]
fn log_engine_created(cfg: &ExecConfig) {
    tracing::debug!(
        max_chunk_size = cfg.max_chunk_size,
        projection_concurrency = cfg.projection_concurrency,
        mem_quota_bytes = cfg.mem_quota_bytes,
        "engine created"
    );
}

#[cfg(not(feature = "tracing"))]
fn log_engine_created(_cfg: &ExecConfig) {}

#[cfg(feature = "tracing")]
fn log_close_failure(operator: &str, err: &OpError) {
    tracing::warn!(operator, error = %err, "close failed after an earlier error");
}

#[cfg(not(feature = "tracing"))]
fn log_close_failure(_operator: &str, _err: &OpError) {}
