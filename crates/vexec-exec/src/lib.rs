#![forbid(unsafe_code)]
//! vexec-exec: query driver and per-operator metrics.
//!
//! The [`Engine`] owns a query context, drives a root executor through
//! open/next/close and guarantees `close` runs even when a pull fails.
//! [`Instrumented`] wraps any executor to count calls, rows and time.

pub mod metrics;
pub mod runtime;

pub use metrics::{Instrumented, MetricsHandle, OperatorMetrics};
pub use runtime::{CancelHandle, Engine, ExecError, RunSummary};
