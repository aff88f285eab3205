//! Demand propagation through Limit.

mod common;

use common::{assert_required_rows, assert_source_calls, counting_source, ctx, MAX_CHUNK_SIZE};
use vexec_operators::{Executor, LimitExec};

struct LimitCase {
    total_rows: usize,
    offset: usize,
    count: usize,
    required: Vec<usize>,
    expected: Vec<usize>,
    expected_source: Vec<usize>,
}

fn run(case: LimitCase) {
    let ctx = ctx();
    let (src, log) = counting_source(case.total_rows);
    let mut limit = LimitExec::new(src, case.offset, case.count);
    assert_required_rows(&mut limit, &ctx, &case.required, &case.expected);
    assert_source_calls(&log, &case.expected_source);
}

#[test]
fn test_limit_without_offset_forwards_demand() {
    run(LimitCase {
        total_rows: 20,
        offset: 0,
        count: 10,
        required: vec![3, 5, 1, 500, 500],
        expected: vec![3, 5, 1, 1, 0],
        expected_source: vec![3, 5, 1, 1],
    });
}

#[test]
fn test_limit_larger_than_input() {
    run(LimitCase {
        total_rows: 20,
        offset: 0,
        count: 25,
        required: vec![9, 500],
        expected: vec![9, 11],
        expected_source: vec![9, 11],
    });
}

#[test]
fn test_limit_offset_is_read_with_first_demand() {
    // The first call covers the offset and the caller's demand in one read.
    run(LimitCase {
        total_rows: 100,
        offset: 50,
        count: 30,
        required: vec![10, 5, 10, 20],
        expected: vec![10, 5, 10, 5],
        expected_source: vec![60, 5, 10, 5],
    });
}

#[test]
fn test_limit_offset_past_input() {
    run(LimitCase {
        total_rows: 100,
        offset: 101,
        count: 10,
        required: vec![10],
        expected: vec![0],
        expected_source: vec![100, 0],
    });
}

#[test]
fn test_limit_offset_beyond_one_chunk() {
    run(LimitCase {
        total_rows: MAX_CHUNK_SIZE + 20,
        offset: MAX_CHUNK_SIZE + 1,
        count: 10,
        required: vec![3, 3, 3, 100],
        expected: vec![3, 3, 3, 1],
        expected_source: vec![MAX_CHUNK_SIZE, 4, 3, 3, 1],
    });
}

#[test]
fn test_limit_returns_window_rows_in_order() {
    let ctx = ctx();
    let (src, _) = counting_source(2000);
    let mut limit = LimitExec::new(src, 1500, 300);
    limit.open(&ctx).expect("open");
    let mut values = Vec::new();
    loop {
        let chunk = limit.next_batch(&ctx, 128).expect("next");
        if chunk.is_empty() {
            break;
        }
        for row in 0..chunk.num_rows() {
            values.push(chunk.row(row)[1].clone());
        }
    }
    limit.close().expect("close");
    assert_eq!(values.len(), 300);
    assert_eq!(values[0], vexec_core::types::Datum::I64(1500));
    assert_eq!(values[299], vexec_core::types::Datum::I64(1799));
}

#[test]
fn test_limit_zero_demand_does_not_touch_child() {
    let ctx = ctx();
    let (src, log) = counting_source(10);
    let mut limit = LimitExec::new(src, 2, 3);
    assert_required_rows(&mut limit, &ctx, &[0, 0, 2, 5], &[0, 0, 2, 1]);
    assert_source_calls(&log, &[4, 1]);
}
