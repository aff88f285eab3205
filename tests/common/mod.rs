//! Shared helpers for the integration tests.
//!
//! Most tests check the *demand protocol*: an operator is pulled with a
//! sequence of required-rows values and both its own output sizes and the
//! sizes its data source was asked for are compared against expectations.

#![allow(dead_code)]

use vexec_core::config::ExecConfig;
use vexec_core::prelude::{DataType, Field, Schema};
use vexec_core::types::Datum;
use vexec_operators::source::CallLog;
use vexec_operators::{BoxedExecutor, ExecContext, Executor, MemorySource};

pub const MAX_CHUNK_SIZE: usize = 1024;

pub fn ctx() -> ExecContext {
    ExecContext::new(ExecConfig::default().with_max_chunk_size(MAX_CHUNK_SIZE))
}

/// `(c0 DOUBLE, c1 BIGINT)`, the layout every demand test runs over.
pub fn double_long_schema() -> Schema {
    Schema::new(vec![
        Field::new("c0", DataType::Float64, true),
        Field::new("c1", DataType::Int64, true),
    ])
}

/// A logged source of `total` rows; row `i` is `gen(i)`.
pub fn logged_source(
    total: usize,
    gen: impl FnMut(usize) -> Vec<Datum> + Send + 'static,
) -> (BoxedExecutor, CallLog) {
    let (src, log) = MemorySource::from_generator(double_long_schema(), total, gen).with_call_log();
    (Box::new(src), log)
}

/// A logged source whose row `i` is `(i, i)`.
pub fn counting_source(total: usize) -> (BoxedExecutor, CallLog) {
    logged_source(total, |i| vec![Datum::F64(i as f64), Datum::I64(i as i64)])
}

/// Open `exec`, pull it once per entry of `required`, check each output
/// size against `expected`, then close it.
pub fn assert_required_rows(
    exec: &mut dyn Executor,
    ctx: &ExecContext,
    required: &[usize],
    expected: &[usize],
) {
    assert_eq!(required.len(), expected.len(), "malformed test case");
    exec.open(ctx).expect("open");
    let mut chunk = exec.new_chunk(ctx);
    for (call, (&req, &want)) in required.iter().zip(expected).enumerate() {
        chunk.set_required_rows(req, ctx.max_chunk_size());
        exec.next(ctx, &mut chunk).expect("next");
        assert_eq!(
            chunk.num_rows(),
            want,
            "call {call}: required {req}, expected {want} rows"
        );
    }
    exec.close().expect("close");
}

/// Rows returned by each data source call, in call order.
pub fn assert_source_calls(log: &CallLog, expected: &[usize]) {
    let calls = log.lock().expect("call log").clone();
    assert_eq!(calls, expected, "data source calls");
}
