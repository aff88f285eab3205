//! Group boundary detection across consecutive chunks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use vexec_core::chunk::Chunk;
use vexec_core::prelude::DataType;
use vexec_core::types::{Column, Datum};
use vexec_operators::{Expr, VecGroupChecker};

/// Chunks of the given sizes holding runs of `same_num` equal values; one
/// randomly chosen run is NULL.
fn gen_chunks(rng: &mut StdRng, chunk_rows: &[usize], same_num: usize) -> Vec<Chunk> {
    let total: usize = chunk_rows.iter().sum();
    let num_groups = total.div_ceil(same_num);
    let mut null_group = rng.gen_range(0..num_groups);
    let mut value = rng.gen::<i64>();
    let mut cnt = 0;
    let mut chunks = Vec::with_capacity(chunk_rows.len());
    for &rows in chunk_rows {
        let mut values = Vec::with_capacity(rows);
        for _ in 0..rows {
            if cnt == same_num {
                // Fresh value so neighbouring runs never compare equal.
                value = value.wrapping_add(rng.gen_range(1..1_000_000));
                cnt = 0;
                null_group = null_group.wrapping_sub(1);
            }
            values.push(if null_group == 0 { Datum::Null } else { Datum::I64(value) });
            cnt += 1;
        }
        chunks.push(Chunk::from_columns(
            vec![Column::from_values(DataType::Int64, values)],
            rows,
        ));
    }
    chunks
}

#[test]
fn test_group_count_across_chunks() {
    struct Case {
        chunk_rows: Vec<usize>,
        same_num: usize,
        expected_groups: usize,
        expected_flags: Vec<bool>,
    }
    let cases = vec![
        Case { chunk_rows: vec![1024, 1], same_num: 1, expected_groups: 1025, expected_flags: vec![false, false] },
        Case { chunk_rows: vec![1024, 1], same_num: 1025, expected_groups: 1, expected_flags: vec![false, true] },
        Case { chunk_rows: vec![1, 1], same_num: 2, expected_groups: 1, expected_flags: vec![false, true] },
        Case { chunk_rows: vec![1, 1], same_num: 1, expected_groups: 2, expected_flags: vec![false, false] },
        Case { chunk_rows: vec![2, 2], same_num: 2, expected_groups: 2, expected_flags: vec![false, false] },
        Case { chunk_rows: vec![2, 2], same_num: 4, expected_groups: 1, expected_flags: vec![false, true] },
    ];

    let mut rng = StdRng::seed_from_u64(0x5eed);
    for case in cases {
        for _ in 0..8 {
            let chunks = gen_chunks(&mut rng, &case.chunk_rows, case.same_num);
            let mut checker = VecGroupChecker::new(vec![Expr::col(0)]);
            let mut groups = 0;
            for (chunk, expected_flag) in chunks.iter().zip(&case.expected_flags) {
                let flag = checker.split_into_groups(chunk).expect("split");
                assert_eq!(flag, *expected_flag);
                // A continuing first group was already counted last time.
                groups += checker.group_count() - usize::from(flag);
            }
            assert_eq!(groups, case.expected_groups);
        }
    }
}

#[test]
fn test_group_ranges_cover_chunk() {
    let values = [1, 1, 2, 3, 3, 3].map(Datum::I64).to_vec();
    let chunk = Chunk::from_columns(vec![Column::from_values(DataType::Int64, values)], 6);
    let mut checker = VecGroupChecker::new(vec![Expr::col(0)]);
    assert!(!checker.split_into_groups(&chunk).expect("split"));
    let mut ranges = Vec::new();
    while let Some(range) = checker.next_group() {
        ranges.push(range);
    }
    assert_eq!(ranges, vec![0..2, 2..3, 3..6]);
    assert!(checker.is_exhausted());
}

#[test]
fn test_boundary_keys_are_snapshots() {
    let cases = vec![
        (DataType::Utf8, Datum::Str("abc".into()), Datum::Str("edf".into())),
        (
            DataType::Decimal,
            Datum::Decimal(Decimal::from(123)),
            Datum::Decimal(Decimal::from(456)),
        ),
        (
            DataType::Json,
            Datum::Json(serde_json::json!({"123": 123})),
            Datum::Json(serde_json::json!({"456": 456})),
        ),
    ];
    for (data_type, original, replacement) in cases {
        let mut chunk = Chunk::from_columns(
            vec![Column::from_values(data_type, vec![original.clone()])],
            1,
        );
        let mut checker = VecGroupChecker::new(vec![Expr::col(0)]);
        checker.split_into_groups(&chunk).expect("split");
        assert_eq!(checker.first_row_key(), std::slice::from_ref(&original));
        assert_eq!(checker.last_row_key(), std::slice::from_ref(&original));

        // Refilling the input buffer must not change the recorded keys.
        chunk.column_mut(0).set(0, replacement);
        assert_eq!(checker.first_row_key(), std::slice::from_ref(&original));
        assert_eq!(checker.last_row_key(), std::slice::from_ref(&original));
    }
}
