//! Bounded execution history, kept in request order.

use std::collections::{HashMap, VecDeque};

use crate::domain::{Execution, ExecutionId};

#[derive(Debug, Default)]
pub struct ExecutionHistory {
    /// Ids in the order they were first recorded.
    order: VecDeque<ExecutionId>,
    entries: HashMap<ExecutionId, Execution>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a snapshot. A new id goes to the back of the order.
    /// Then finished executions are evicted oldest first until at most `limit`
    /// remain; unfinished ones are kept regardless.
    pub fn record(&mut self, execution: &Execution, limit: usize) {
        if self
            .entries
            .insert(execution.id, execution.clone())
            .is_none()
        {
            self.order.push_back(execution.id);
        }
        self.evict(limit);
    }

    fn evict(&mut self, limit: usize) {
        while self.entries.len() > limit {
            let oldest_finished = self.order.iter().position(|id| {
                self.entries
                    .get(id)
                    .is_some_and(|e| e.status.is_terminal())
            });
            let Some(index) = oldest_finished else {
                break;
            };
            if let Some(id) = self.order.remove(index) {
                self.entries.remove(&id);
            }
        }
    }

    pub fn get(&self, id: ExecutionId) -> Option<Execution> {
        self.entries.get(&id).cloned()
    }

    /// Every kept execution, oldest request first.
    pub fn ordered(&self) -> Vec<Execution> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
