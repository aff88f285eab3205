#![forbid(unsafe_code)]
//! vexec-mem: per-query memory budget and peak tracking.
//!
//! Concrete implementations of the interfaces in `vexec-core::budget`.
//! Materializing operators reserve bytes through a `BudgetGuardImpl` before
//! buffering rows; dropping the guard releases them.

pub mod error;
pub mod guard;
pub mod tracking;

pub use error::{Error, Result};
pub use guard::{BudgetGuardImpl, MemoryBudgetImpl};
pub use tracking::PeakTracker;
