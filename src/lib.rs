#![forbid(unsafe_code)]
//! vexec: a demand-driven, chunk-batched query execution core.
//!
//! Every operator is pulled with a required-rows hint and produces at most
//! that many rows per call. This crate only re-exports the workspace members.

pub use vexec_core as core;
pub use vexec_exec as exec;
pub use vexec_mem as mem;
pub use vexec_operators as operators;

pub use vexec_core::prelude::*;
pub use vexec_exec::{Engine, ExecError};
pub use vexec_operators::{ExecContext, Executor, OpError};
