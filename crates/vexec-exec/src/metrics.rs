//! Per-operator metrics.
//!
//! [`Instrumented`] wraps an executor and counts `next` calls, produced rows
//! and time spent inside the operator (children included). The counters are
//! shared through a [`MetricsHandle`] so they stay readable after the wrapper
//! has been boxed into a plan. On `close` the totals are emitted as a tracing
//! event; without the `tracing` feature that is a no-op.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use vexec_core::chunk::Chunk;
use vexec_core::prelude::Schema;
use vexec_operators::{BoxedExecutor, ExecContext, Executor, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorMetrics {
    pub next_calls: u64,
    /// Calls that returned an empty chunk although rows were requested.
    pub empty_calls: u64,
    pub rows: u64,
    pub elapsed: Duration,
}

pub type MetricsHandle = Arc<Mutex<OperatorMetrics>>;

pub struct Instrumented {
    inner: BoxedExecutor,
    metrics: MetricsHandle,
}

impl Instrumented {
    pub fn new(inner: BoxedExecutor) -> (Self, MetricsHandle) {
        let metrics = MetricsHandle::default();
        (
            Self {
                inner,
                metrics: Arc::clone(&metrics),
            },
            metrics,
        )
    }

    fn record(&self, f: impl FnOnce(&mut OperatorMetrics)) {
        if let Ok(mut m) = self.metrics.lock() {
            f(&mut m);
        }
    }
}

impl Executor for Instrumented {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn open(&mut self, ctx: &ExecContext) -> Result<()> {
        let start = Instant::now();
        let res = self.inner.open(ctx);
        let elapsed = start.elapsed();
        self.record(|m| m.elapsed += elapsed);
        res
    }

    fn next(&mut self, ctx: &ExecContext, chunk: &mut Chunk) -> Result<()> {
        let start = Instant::now();
        let res = self.inner.next(ctx, chunk);
        let elapsed = start.elapsed();
        let rows = chunk.num_rows() as u64;
        let starved = res.is_ok() && rows == 0 && chunk.required_rows() > 0;
        self.record(|m| {
            m.next_calls += 1;
            m.rows += rows;
            m.elapsed += elapsed;
            if starved {
                m.empty_calls += 1;
            }
        });
        res
    }

    fn close(&mut self) -> Result<()> {
        let res = self.inner.close();
        if let Ok(m) = self.metrics.lock() {
            emit_metrics(self.inner.name(), &m);
        }
        res
    }
}

#[cfg(feature = "tracing")]
pub fn emit_metrics(operator: &str, m: &OperatorMetrics) {
    tracing::debug!(
        operator,
        next_calls = m.next_calls,
        empty_calls = m.empty_calls,
        rows = m.rows,
        elapsed_us = m.elapsed.as_micros() as u64,
        "operator metrics"
    );
}

#[cfg(not(feature = "tracing"))]
pub fn emit_metrics(_operator: &str, _m: &OperatorMetrics) { /* no-op */
}
