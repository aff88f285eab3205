//! Demand propagation and ordering for Sort and Top-N.

mod common;

use common::{assert_required_rows, assert_source_calls, counting_source, ctx, logged_source, MAX_CHUNK_SIZE};
use vexec_core::types::Datum;
use vexec_operators::{Executor, Expr, SortExec, SortKey, TopNExec};

fn keys(cols: &[usize]) -> Vec<SortKey> {
    cols.iter().map(|c| SortKey::asc(Expr::col(*c))).collect()
}

struct SortCase {
    total_rows: usize,
    by: Vec<usize>,
    required: Vec<usize>,
    expected: Vec<usize>,
    expected_source: Vec<usize>,
}

fn run_sort(case: SortCase) {
    let ctx = ctx();
    let (src, log) = counting_source(case.total_rows);
    let mut sort = SortExec::new(src, keys(&case.by));
    assert_required_rows(&mut sort, &ctx, &case.required, &case.expected);
    assert_source_calls(&log, &case.expected_source);
}

#[test]
fn test_sort_required_rows() {
    let m = MAX_CHUNK_SIZE;
    let cases = vec![
        SortCase {
            total_rows: 10,
            by: vec![0],
            required: vec![1, 5, 3, 10],
            expected: vec![1, 5, 3, 1],
            expected_source: vec![10, 0],
        },
        SortCase {
            total_rows: 10,
            by: vec![0, 1],
            required: vec![1, 5, 3, 10],
            expected: vec![1, 5, 3, 1],
            expected_source: vec![10, 0],
        },
        SortCase {
            total_rows: m + 1,
            by: vec![0],
            required: vec![1, 5, 3, 10, m],
            expected: vec![1, 5, 3, 10, (m + 1) - 1 - 5 - 3 - 10],
            expected_source: vec![m, 1, 0],
        },
        SortCase {
            total_rows: 3 * m + 1,
            by: vec![0],
            required: vec![1, 5, 3, 10, m],
            expected: vec![1, 5, 3, 10, m],
            expected_source: vec![m, m, m, 1, 0],
        },
    ];
    for case in cases {
        run_sort(case);
    }
}

#[test]
fn test_sort_orders_descending_input() {
    let ctx = ctx();
    let total = 3000;
    let (src, _) = logged_source(total, move |i| {
        let v = (total - i) as i64;
        vec![Datum::F64(v as f64), Datum::I64(v)]
    });
    let mut sort = SortExec::new(src, keys(&[1]));
    sort.open(&ctx).expect("open");
    let mut prev = i64::MIN;
    let mut seen = 0;
    loop {
        let chunk = sort.next_batch(&ctx, 700).expect("next");
        if chunk.is_empty() {
            break;
        }
        for row in 0..chunk.num_rows() {
            let Datum::I64(v) = chunk.value(row, 1) else {
                panic!("unexpected datum");
            };
            assert!(*v >= prev);
            prev = *v;
            seen += 1;
        }
    }
    sort.close().expect("close");
    assert_eq!(seen, total);
}

struct TopNCase {
    total_rows: usize,
    offset: usize,
    count: usize,
    by: Vec<usize>,
    required: Vec<usize>,
    expected: Vec<usize>,
    expected_source: Vec<usize>,
}

fn run_topn(case: TopNCase) {
    let ctx = ctx();
    let (src, log) = counting_source(case.total_rows);
    let mut topn = TopNExec::new(src, keys(&case.by), case.offset, case.count);
    assert_required_rows(&mut topn, &ctx, &case.required, &case.expected);
    assert_source_calls(&log, &case.expected_source);
}

#[test]
fn test_topn_required_rows() {
    let m = MAX_CHUNK_SIZE;
    let cases = vec![
        TopNCase {
            total_rows: 10,
            offset: 0,
            count: 10,
            by: vec![0],
            required: vec![1, 1, 1, 1, 10],
            expected: vec![1, 1, 1, 1, 6],
            expected_source: vec![10, 0],
        },
        TopNCase {
            total_rows: 100,
            offset: 15,
            count: 11,
            by: vec![0],
            required: vec![1, 1, 1, 1, 10],
            expected: vec![1, 1, 1, 1, 7],
            expected_source: vec![26, 100 - 26, 0],
        },
        TopNCase {
            total_rows: 100,
            offset: 95,
            count: 10,
            by: vec![0],
            required: vec![1, 2, 3, 10],
            expected: vec![1, 2, 2, 0],
            expected_source: vec![100, 0, 0],
        },
        TopNCase {
            total_rows: m + 20,
            offset: 1,
            count: 5,
            by: vec![0, 1],
            required: vec![1, 3, 7, 10],
            expected: vec![1, 3, 1, 0],
            expected_source: vec![6, m, 14, 0],
        },
        TopNCase {
            total_rows: m + m + 20,
            offset: m + 10,
            count: 8,
            by: vec![0, 1],
            required: vec![1, 2, 3, 5, 7],
            expected: vec![1, 2, 3, 2, 0],
            expected_source: vec![m, 18, m, 2, 0],
        },
        TopNCase {
            total_rows: m * 5 + 10,
            offset: m * 5 + 20,
            count: 10,
            by: vec![0, 1],
            required: vec![1, 2, 3],
            expected: vec![0, 0, 0],
            expected_source: vec![m, m, m, m, m, 10, 0, 0],
        },
        TopNCase {
            total_rows: m + m + 10,
            offset: 10,
            count: usize::MAX,
            by: vec![0, 1],
            required: vec![1, 2, 3, m, m],
            expected: vec![1, 2, 3, m, m - 1 - 2 - 3],
            expected_source: vec![m, m, 10, 0, 0],
        },
    ];
    for case in cases {
        run_topn(case);
    }
}

#[test]
fn test_topn_keeps_smallest_rows() {
    let ctx = ctx();
    // Values cycle 0..97 so the smallest ones arrive late and repeatedly.
    let (src, _) = logged_source(5000, |i| {
        let v = ((i * 31) % 97) as i64;
        vec![Datum::F64(v as f64), Datum::I64(v)]
    });
    let mut topn = TopNExec::new(src, vec![SortKey::asc(Expr::col(1))], 3, 5);
    topn.open(&ctx).expect("open");
    let chunk = topn.next_batch(&ctx, MAX_CHUNK_SIZE).expect("next");
    let values: Vec<_> = (0..chunk.num_rows()).map(|r| chunk.value(r, 1).clone()).collect();
    topn.close().expect("close");
    // 5000 rows hold each value at least 51 times.
    assert_eq!(values, vec![Datum::I64(0), Datum::I64(0), Datum::I64(0), Datum::I64(0), Datum::I64(0)]);
}
