//! In-memory leaf executor.
//!
//! Produces exactly `min(required_rows, remaining)` rows per call, either
//! from materialized rows or from a generator invoked with the absolute row
//! index. An optional call log records the row count of every `next` call.

use std::sync::{Arc, Mutex};

use vexec_core::chunk::Chunk;
use vexec_core::prelude::Schema;
use vexec_core::types::Datum;

use crate::context::ExecContext;
use crate::traits::{BaseExecutor, Executor, OpError, Result};

pub type RowGenerator = Box<dyn FnMut(usize) -> Vec<Datum> + Send>;

/// Shared record of rows returned by each `next` call.
pub type CallLog = Arc<Mutex<Vec<usize>>>;

enum RowSupply {
    Rows(Vec<Vec<Datum>>),
    Generator(RowGenerator),
}

pub struct MemorySource {
    base: BaseExecutor,
    supply: RowSupply,
    total: usize,
    produced: usize,
    log: Option<CallLog>,
}

impl MemorySource {
    pub fn from_rows(schema: Schema, rows: Vec<Vec<Datum>>) -> Self {
        let total = rows.len();
        Self {
            base: BaseExecutor::new(schema, Vec::new()),
            supply: RowSupply::Rows(rows),
            total,
            produced: 0,
            log: None,
        }
    }

    /// `total` rows, row `i` being `gen(i)`.
    pub fn from_generator(
        schema: Schema,
        total: usize,
        gen: impl FnMut(usize) -> Vec<Datum> + Send + 'static,
    ) -> Self {
        Self {
            base: BaseExecutor::new(schema, Vec::new()),
            supply: RowSupply::Generator(Box::new(gen)),
            total,
            produced: 0,
            log: None,
        }
    }

    /// Start recording per-call row counts; returns the shared log.
    pub fn with_call_log(mut self) -> (Self, CallLog) {
        let log = CallLog::default();
        self.log = Some(Arc::clone(&log));
        (self, log)
    }

    pub fn total_rows(&self) -> usize {
        self.total
    }

    fn row_at(&mut self, idx: usize) -> Vec<Datum> {
        match &mut self.supply {
            RowSupply::Rows(rows) => std::mem::take(&mut rows[idx]),
            RowSupply::Generator(gen) => gen(idx),
        }
    }
}

impl Executor for MemorySource {
    fn name(&self) -> &'static str {
        "memory_source"
    }

    fn schema(&self) -> &Schema {
        self.base.schema()
    }

    fn open(&mut self, ctx: &ExecContext) -> Result<()> {
        self.base.open(ctx)?;
        self.produced = 0;
        Ok(())
    }

    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<()> {
        chunk.reset();
        if !self.base.is_open() {
            return Err(OpError::Exec("memory source read before open".into()));
        }
        if chunk.required_rows() == 0 {
            return Ok(());
        }
        ctx.check_cancelled()?;

        let want = chunk.required_rows().min(chunk.capacity());
        let n = want.min(self.total - self.produced);
        for _ in 0..n {
            let row = self.row_at(self.produced);
            if row.len() != chunk.num_cols() {
                return Err(OpError::Schema(format!(
                    "source row has {} values, schema has {}",
                    row.len(),
                    chunk.num_cols()
                )));
            }
            chunk.append_row(row);
            self.produced += 1;
        }
        if let Some(log) = &self.log {
            if let Ok(mut calls) = log.lock() {
                calls.push(n);
            }
        }
        tracing::trace!(rows = n, produced = self.produced, "memory source batch");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.base.close()
    }
}
