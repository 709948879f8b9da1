//! Priority execution queue and running-count controller.
//!
//! The pending list, the running count and the draining flag live behind one
//! mutex. Admission pops items and bumps the running count in the same critical
//! section, so no interleaving of `enqueue`, `admit` and `finish` can push the
//! number of running executions past the limit.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{Execution, ExecutionId};

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Execution>,
    running: usize,
    draining: bool,
}

#[derive(Debug, Default)]
pub struct ExecutionQueue {
    state: Mutex<QueueState>,
}

/// Held while a batch drain is in progress. Clears the draining flag on drop.
#[derive(Debug)]
pub struct DrainGuard<'a> {
    queue: &'a ExecutionQueue,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.queue.lock().draining = false;
    }
}

impl ExecutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert before the first item with strictly lower priority, keeping FIFO
    /// order among equal priorities. Returns the 1-based queue position.
    pub fn enqueue(&self, execution: Execution) -> usize {
        let mut state = self.lock();
        let index = state
            .pending
            .iter()
            .position(|queued| queued.priority < execution.priority)
            .unwrap_or(state.pending.len());
        state.pending.insert(index, execution);
        index + 1
    }

    /// Pop as many executions as fit under `limit` and count them as running.
    pub fn admit(&self, limit: usize) -> Vec<Execution> {
        let mut state = self.lock();
        let free = limit.saturating_sub(state.running);
        let take = free.min(state.pending.len());
        let batch: Vec<Execution> = state.pending.drain(..take).collect();
        state.running += batch.len();
        batch
    }

    /// Mark one admitted execution as settled.
    pub fn finish(&self) {
        let mut state = self.lock();
        state.running = state.running.saturating_sub(1);
    }

    /// Claim the draining flag. `None` if another drain is in progress.
    pub fn try_begin_drain(&self) -> Option<DrainGuard<'_>> {
        let mut state = self.lock();
        if state.draining {
            return None;
        }
        state.draining = true;
        Some(DrainGuard { queue: self })
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Ids of pending executions in dequeue order.
    pub fn pending_ids(&self) -> Vec<ExecutionId> {
        self.lock().pending.iter().map(|e| e.id).collect()
    }
}
