#![forbid(unsafe_code)]
//! vexec-operators: demand-driven, chunk-batched physical operators.
//!
//! Design intent:
//! - Every operator is a pull-based [`Executor`]; the caller states how many
//!   rows it wants via `Chunk::required_rows` and operators forward that
//!   demand to their children as precisely as their semantics allow.
//! - All buffering that grows with input size (sort, top-n, join groups) is
//!   accounted against the query's `vexec-mem` budget.
//! - Operators are synchronous; parallel projection uses plain threads and
//!   bounded channels.

pub mod aggregate;
pub mod context;
pub mod expr;
pub mod group_checker;
pub mod join;
pub mod limit;
pub mod projection;
pub mod selection;
pub mod sort;
pub mod source;
pub mod stream_agg;
pub mod traits;

pub use aggregate::{AggFunc, AggKind};
pub use context::ExecContext;
pub use expr::{BinaryOp, Expr};
pub use group_checker::VecGroupChecker;
pub use join::{merge::MergeJoinExec, JoinType};
pub use limit::LimitExec;
pub use projection::ProjectionExec;
pub use selection::SelectionExec;
pub use sort::{topn::TopNExec, SortExec, SortKey};
pub use source::MemorySource;
pub use stream_agg::StreamAggExec;
pub use traits::{BaseExecutor, BoxedExecutor, Executor, OpError, Result};
