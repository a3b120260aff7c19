use std::sync::Arc;

use crate::models::Task;
use crate::traits::Extractor;

/// Ordered list of registered tasks; the unit of work for a cycle.
///
/// No deduplication: registering the same pair twice yields two tasks
/// that race on one cache slot, last writer wins.
#[derive(Debug, Default, Clone)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, url: impl Into<String>, extractor: Arc<dyn Extractor>) {
        let task = Task::new(url, extractor);
        tracing::debug!(url = %task.url, extractor = %task.extractor_id(), "Registered task");
        self.tasks.push(task);
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Tasks in registration order.
    pub fn all(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
