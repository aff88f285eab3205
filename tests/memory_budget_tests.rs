//! Memory quota enforcement: the budget itself and the operators that
//! buffer rows against it.

mod common;

use std::sync::Arc;
use std::thread;

use common::{counting_source, double_long_schema, logged_source};
use vexec_core::budget::{BudgetGuard, MemoryBudget};
use vexec_core::config::ExecConfig;
use vexec_core::types::Datum;
use vexec_exec::Engine;
use vexec_mem::MemoryBudgetImpl;
use vexec_operators::{Expr, JoinType, MemorySource, MergeJoinExec, OpError, SortExec, SortKey, TopNExec};

#[test]
fn test_budget_acquire_release() {
    let budget = MemoryBudgetImpl::new(1024 * 1024);
    assert_eq!(budget.used_bytes(), 0);

    let guard = budget.try_acquire(100 * 1024, "test").expect("Acquire failed");
    assert_eq!(budget.used_bytes(), 100 * 1024);
    assert_eq!(guard.bytes(), 100 * 1024);

    drop(guard);
    assert_eq!(budget.used_bytes(), 0);
}

#[test]
fn test_budget_guard_grow_and_shrink() {
    let budget = MemoryBudgetImpl::new(1000);
    let mut guard = budget.reserve("sort");
    guard.grow(600).expect("grow");
    assert!(guard.grow(600).is_err(), "grow past capacity must fail");
    assert_eq!(budget.used_bytes(), 600);
    guard.shrink(200);
    assert_eq!(budget.used_bytes(), 400);
    guard.release_all();
    assert_eq!(budget.used_bytes(), 0);
    assert_eq!(budget.peak_bytes(), 600);
}

#[test]
fn test_budget_concurrent_access() {
    let budget = Arc::new(MemoryBudgetImpl::new(1024 * 1024));
    let handles: Vec<_> = (0..10)
        .map(|_| {
            let budget = Arc::clone(&budget);
            thread::spawn(move || {
                if let Some(guard) = budget.try_acquire(50 * 1024, "test") {
                    thread::sleep(std::time::Duration::from_millis(10));
                    assert_eq!(guard.bytes(), 50 * 1024);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    assert_eq!(budget.used_bytes(), 0);
}

#[test]
fn test_sort_exceeding_quota_fails() {
    let engine = Engine::new(ExecConfig::default().with_mem_quota_bytes(16 * 1024)).expect("engine");
    let (src, _) = counting_source(10_000);
    let mut sort = SortExec::new(src, vec![SortKey::asc(Expr::col(0))]);
    let err = engine.collect(&mut sort).expect_err("quota must be exceeded");
    assert!(matches!(err.op_error(), Some(OpError::Memory(_))));
    assert_eq!(engine.budget().used_bytes(), 0);
}

#[test]
fn test_topn_memory_is_bounded_by_limit() {
    // The same quota that stops a full sort is enough for a small Top-N.
    let engine = Engine::new(ExecConfig::default().with_mem_quota_bytes(16 * 1024)).expect("engine");
    let (src, _) = counting_source(10_000);
    let mut topn = TopNExec::new(src, vec![SortKey::desc(Expr::col(1))], 0, 10);
    let chunks = engine.collect(&mut topn).expect("top-n");
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].value(0, 1), &Datum::I64(9_999));
    assert!(engine.peak_memory_bytes() > 0);
    assert_eq!(engine.budget().used_bytes(), 0);
}

#[test]
fn test_merge_join_group_cap() {
    let engine = Engine::new(ExecConfig::default().with_max_join_group_rows(100)).expect("engine");
    let (left, _) = logged_source(10, |_| vec![Datum::F64(0.0), Datum::I64(7)]);
    let right = Box::new(MemorySource::from_generator(double_long_schema(), 1000, |_| {
        vec![Datum::F64(0.0), Datum::I64(7)]
    }));
    let mut join = MergeJoinExec::new(
        left,
        right,
        JoinType::Inner,
        vec![Expr::col(1)],
        vec![Expr::col(1)],
        Vec::new(),
    )
    .expect("merge join");
    let err = engine.collect(&mut join).expect_err("group cap must trip");
    assert!(matches!(err.op_error(), Some(OpError::Exec(_))));
}
