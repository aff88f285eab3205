//! Per-query execution context handed to every `open`/`next` call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vexec_core::chunk::Chunk;
use vexec_core::config::ExecConfig;
use vexec_core::schema::Schema;
use vexec_mem::MemoryBudgetImpl;

use crate::traits::OpError;

/// Shared, cheaply cloneable query context: configuration, memory quota and
/// the cancellation flag. Clones observe the same budget and flag, so worker
/// threads can hold their own copy.
#[derive(Clone)]
pub struct ExecContext {
    config: Arc<ExecConfig>,
    budget: MemoryBudgetImpl,
    cancelled: Arc<AtomicBool>,
}

impl ExecContext {
    pub fn new(config: ExecConfig) -> Self {
        let budget = MemoryBudgetImpl::new(config.mem_quota_bytes);
        Self {
            config: Arc::new(config),
            budget,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn max_chunk_size(&self) -> usize {
        self.config.max_chunk_size
    }

    pub fn budget(&self) -> &MemoryBudgetImpl {
        &self.budget
    }

    /// Ask every operator of this query to stop at its next checkpoint.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check_cancelled(&self) -> Result<(), OpError> {
        if self.is_cancelled() {
            Err(OpError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// A chunk for `schema` at full capacity.
    pub fn new_chunk(&self, schema: &Schema) -> Chunk {
        Chunk::with_schema(schema, self.config.max_chunk_size)
    }
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::new(ExecConfig::default())
    }
}
