//! Executor trait + common interfaces.
//!
//! Every physical operator implements [`Executor`], a pull interface:
//! `open` once, `next` repeatedly until it yields an empty chunk, `close`.
//! Operators compose by owning their children as `BoxedExecutor`s; the shared
//! bookkeeping (schema, children, chunk size) lives in [`BaseExecutor`].

use vexec_core::chunk::Chunk;
use vexec_core::prelude::Schema;

use thiserror::Error;

use crate::context::ExecContext;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("planning error: {0}")]
    Plan(String),

    #[error("execution error: {0}")]
    Exec(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("evaluation error: {0}")]
    Eval(String),

    #[error("query cancelled")]
    Cancelled,

    #[error(transparent)]
    Memory(#[from] vexec_mem::Error),
}

pub type Result<T> = std::result::Result<T, OpError>;

pub type BoxedExecutor = Box<dyn Executor>;

/// Trait that all operators must implement.
///
/// Contract for `next`:
/// - reset `chunk` first;
/// - append at most `chunk.required_rows()` rows;
/// - leave `chunk` empty if and only if the input is exhausted;
/// - with `required_rows() == 0`, return at once without touching children.
///
/// `close` must be safe after a failed or partial `open` and when repeated.
pub trait Executor: Send {
    /// Human-readable operator name (stable).
    fn name(&self) -> &'static str;

    /// Output schema of every chunk this operator produces.
    fn schema(&self) -> &Schema;

    fn open(&mut self, ctx: &ExecContext) -> Result<()>;

    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// A full-capacity chunk laid out for this operator's output.
    fn new_chunk(&self, ctx: &ExecContext) -> Chunk {
        ctx.new_chunk(self.schema())
    }

    /// Convenience form of `next` that allocates the output chunk.
    fn next_batch(&mut self, ctx: &ExecContext, required_rows: usize) -> Result<Chunk> {
        let mut chunk = self.new_chunk(ctx);
        chunk.set_required_rows(required_rows, ctx.max_chunk_size());
        self.next(ctx, &mut chunk)?;
        Ok(chunk)
    }
}

/// State shared by every operator: output schema, children and the chunk
/// size captured at `open`.
pub struct BaseExecutor {
    schema: Schema,
    children: Vec<BoxedExecutor>,
    max_chunk_size: usize,
    opened: bool,
}

impl BaseExecutor {
    pub fn new(schema: Schema, children: Vec<BoxedExecutor>) -> Self {
        Self {
            schema,
            children,
            max_chunk_size: 0,
            opened: false,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// Open every child, in order. Fails if already open.
    pub fn open(&mut self, ctx: &ExecContext) -> Result<()> {
        if self.opened {
            return Err(OpError::Exec("executor opened twice".into()));
        }
        self.opened = true;
        self.max_chunk_size = ctx.max_chunk_size();
        for child in &mut self.children {
            child.open(ctx)?;
        }
        Ok(())
    }

    /// Close every child even if one fails; report the first failure.
    pub fn close(&mut self) -> Result<()> {
        self.opened = false;
        let mut first_err = None;
        for child in &mut self.children {
            if let Err(e) = child.close() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn child(&mut self, idx: usize) -> &mut BoxedExecutor {
        &mut self.children[idx]
    }

    pub fn child_schema(&self, idx: usize) -> &Schema {
        self.children[idx].schema()
    }

    /// A full-capacity chunk for child `idx`.
    pub fn new_child_chunk(&self, idx: usize) -> Chunk {
        Chunk::with_schema(self.children[idx].schema(), self.max_chunk_size)
    }

    /// Move the children out (e.g. into a background thread).
    pub fn take_children(&mut self) -> Vec<BoxedExecutor> {
        std::mem::take(&mut self.children)
    }

    pub fn restore_children(&mut self, children: Vec<BoxedExecutor>) {
        self.children = children;
    }
}

/// Pull one chunk from `child`, returning the number of rows it produced.
pub fn fetch(child: &mut BoxedExecutor, ctx: &ExecContext, chunk: &mut Chunk) -> Result<usize> {
    child.next(ctx, chunk)?;
    Ok(chunk.num_rows())
}
