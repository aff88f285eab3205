//! Parallel projection pipeline.
//!
//! ```text
//!  fetcher ──(seq, input)──> workers ──(seq, result)──> collector (next)
//!     ^                                                    │
//!     └──────────────────── permits ───────────────────────┘
//! ```
//!
//! - The fetcher thread owns the child while running and reads it with the
//!   caller's most recent demand. It needs a permit per batch, which bounds
//!   the number of batches in flight to the worker count.
//! - Workers evaluate batches in any order; every batch carries a sequence
//!   number and the collector restores input order with a reorder buffer.
//! - Exhaustion, child errors and cancellation travel as sequenced results,
//!   so the collector sees them exactly where they happened in the stream.
//! - `stop` disconnects every channel, joins all threads and hands the child
//!   back so it can be closed on the caller's thread.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use vexec_core::chunk::Chunk;

use crate::context::ExecContext;
use crate::expr::Expr;
use crate::traits::{BaseExecutor, BoxedExecutor, OpError, Result};

use super::project;

type Sequenced<T> = (u64, T);

const CANCEL_POLL: Duration = Duration::from_millis(20);

struct Running {
    demand: Arc<AtomicUsize>,
    stop: Arc<AtomicBool>,
    permit_tx: Option<Sender<()>>,
    result_rx: Option<Receiver<Sequenced<Result<Chunk>>>>,
    fetcher: Option<JoinHandle<BoxedExecutor>>,
    workers: Vec<JoinHandle<()>>,
    reorder: BTreeMap<u64, Result<Chunk>>,
    next_seq: u64,
    /// Result being served and the offset of its first unserved row.
    current: Option<(Chunk, usize)>,
    done: bool,
}

pub(super) struct ParallelProjector {
    workers: usize,
    exprs: Arc<[Expr]>,
    running: Option<Running>,
}

impl ParallelProjector {
    pub(super) fn new(workers: usize, exprs: Vec<Expr>) -> Self {
        Self {
            workers: workers.max(1),
            exprs: exprs.into(),
            running: None,
        }
    }

    fn start(&mut self, base: &mut BaseExecutor, ctx: &ExecContext, demand: usize) -> Result<Running> {
        let mut children = base.take_children();
        let child = children
            .pop()
            .ok_or_else(|| OpError::Exec("projection has no child".into()))?;
        let max = base.max_chunk_size();

        let demand = Arc::new(AtomicUsize::new(demand));
        let stop = Arc::new(AtomicBool::new(false));
        let (permit_tx, permit_rx) = bounded::<()>(self.workers);
        let (work_tx, work_rx) = bounded::<Sequenced<Chunk>>(self.workers);
        let (result_tx, result_rx) = bounded::<Sequenced<Result<Chunk>>>(self.workers + 1);

        for _ in 0..self.workers {
            // Cannot fail: the channel holds exactly `workers` permits.
            let _ = permit_tx.send(());
        }

        let fetcher = {
            let ctx = ctx.clone();
            let demand = Arc::clone(&demand);
            let stop = Arc::clone(&stop);
            let result_tx = result_tx.clone();
            thread::spawn(move || {
                fetch_loop(child, &ctx, max, &demand, &stop, &permit_rx, &work_tx, &result_tx)
            })
        };

        let workers = (0..self.workers)
            .map(|_| {
                let ctx = ctx.clone();
                let exprs = Arc::clone(&self.exprs);
                let stop = Arc::clone(&stop);
                let work_rx = work_rx.clone();
                let result_tx = result_tx.clone();
                thread::spawn(move || worker_loop(&exprs, &ctx, max, &stop, &work_rx, &result_tx))
            })
            .collect();

        tracing::debug!(workers = self.workers, "parallel projection started");
        Ok(Running {
            demand,
            stop,
            permit_tx: Some(permit_tx),
            result_rx: Some(result_rx),
            fetcher: Some(fetcher),
            workers,
            reorder: BTreeMap::new(),
            next_seq: 0,
            current: None,
            done: false,
        })
    }

    pub(super) fn next(
        &mut self,
        base: &mut BaseExecutor,
        ctx: &ExecContext,
        chunk: &mut Chunk,
    ) -> Result<()> {
        let required = chunk.required_rows();
        if self.running.is_none() {
            let running = self.start(base, ctx, required)?;
            self.running = Some(running);
        }
        let Some(running) = self.running.as_mut() else {
            return Err(OpError::Exec("projection pipeline not running".into()));
        };
        running.demand.store(required, Ordering::Release);

        loop {
            if let Some((result, offset)) = running.current.as_mut() {
                let n = (result.num_rows() - *offset).min(chunk.remaining());
                chunk.append_range(result, *offset, *offset + n);
                *offset += n;
                if *offset == result.num_rows() {
                    running.current = None;
                    if let Some(permits) = &running.permit_tx {
                        let _ = permits.try_send(());
                    }
                }
                return Ok(());
            }
            if running.done {
                return Ok(());
            }

            let result = match running.reorder.remove(&running.next_seq) {
                Some(result) => result,
                None => {
                    let (seq, result) = running.recv(ctx)?;
                    if seq != running.next_seq {
                        running.reorder.insert(seq, result);
                        continue;
                    }
                    result
                }
            };
            running.next_seq += 1;
            match result {
                Ok(batch) if batch.is_empty() => running.done = true,
                Ok(batch) => running.current = Some((batch, 0)),
                Err(e) => {
                    running.done = true;
                    return Err(e);
                }
            }
        }
    }

    /// Shut the pipeline down and give the child back to `base`.
    pub(super) fn stop(&mut self, base: &mut BaseExecutor) -> Result<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };
        running.stop.store(true, Ordering::Release);
        // Disconnect first so no thread stays blocked on a channel.
        running.permit_tx = None;
        running.result_rx = None;
        running.reorder.clear();
        running.current = None;

        let mut first_err = None;
        for handle in running.workers.drain(..) {
            if handle.join().is_err() {
                first_err.get_or_insert(OpError::Exec("projection worker panicked".into()));
            }
        }
        if let Some(handle) = running.fetcher.take() {
            match handle.join() {
                Ok(child) => base.restore_children(vec![child]),
                Err(_) => {
                    first_err.get_or_insert(OpError::Exec("projection fetcher panicked".into()));
                }
            }
        }
        tracing::debug!("parallel projection stopped");
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Running {
    /// Wait for the next result, giving up promptly on cancellation.
    fn recv(&self, ctx: &ExecContext) -> Result<Sequenced<Result<Chunk>>> {
        let rx = self
            .result_rx
            .as_ref()
            .ok_or_else(|| OpError::Exec("projection already stopped".into()))?;
        loop {
            ctx.check_cancelled()?;
            match rx.recv_timeout(CANCEL_POLL) {
                Ok(msg) => return Ok(msg),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(OpError::Exec("projection pipeline disconnected".into()))
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn fetch_loop(
    mut child: BoxedExecutor,
    ctx: &ExecContext,
    max: usize,
    demand: &AtomicUsize,
    stop: &AtomicBool,
    permits: &Receiver<()>,
    work_tx: &Sender<Sequenced<Chunk>>,
    result_tx: &Sender<Sequenced<Result<Chunk>>>,
) -> BoxedExecutor {
    let mut seq = 0u64;
    while permits.recv().is_ok() {
        if stop.load(Ordering::Acquire) {
            break;
        }
        if ctx.is_cancelled() {
            let _ = result_tx.send((seq, Err(OpError::Cancelled)));
            break;
        }
        let mut input = Chunk::with_schema(child.schema(), max);
        input.set_required_rows(demand.load(Ordering::Acquire).max(1), max);
        match child.next(ctx, &mut input) {
            Ok(()) if input.is_empty() => {
                let _ = result_tx.send((seq, Ok(input)));
                break;
            }
            Ok(()) => {
                if work_tx.send((seq, input)).is_err() {
                    break;
                }
            }
            Err(e) => {
                let _ = result_tx.send((seq, Err(e)));
                break;
            }
        }
        seq += 1;
    }
    tracing::trace!(batches = seq, "projection fetcher exiting");
    child
}

fn worker_loop(
    exprs: &[Expr],
    ctx: &ExecContext,
    max: usize,
    stop: &AtomicBool,
    work_rx: &Receiver<Sequenced<Chunk>>,
    result_tx: &Sender<Sequenced<Result<Chunk>>>,
) {
    while let Ok((seq, input)) = work_rx.recv() {
        if stop.load(Ordering::Acquire) {
            return;
        }
        let result = if ctx.is_cancelled() {
            Err(OpError::Cancelled)
        } else {
            project(exprs, &input).map(|columns| Chunk::from_columns(columns, max))
        };
        if result_tx.send((seq, result)).is_err() {
            return;
        }
    }
}
