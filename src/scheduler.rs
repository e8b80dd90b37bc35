//! Per data load polling schedule.
//!
//! The scheduler is purely a time gate: it knows when each data load is next
//! due and nothing about how reading or publishing went.

use std::time::{Duration, Instant};

use crate::types::DataLoadDescriptor;

/// Longest accepted polling interval: one week.
pub const MAX_POLLING_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// One configured data load and the next time it should be polled.
#[derive(Debug, Clone)]
pub struct PollingTask {
    pub descriptor: DataLoadDescriptor,
    pub next_run_at: Instant,
}

/// Fixed set of tasks, indexed by configuration order.
#[derive(Debug)]
pub struct Scheduler {
    tasks: Vec<PollingTask>,
}

impl Scheduler {
    /// Create one task per descriptor, every one of them due at `now`.
    pub fn new(descriptors: impl IntoIterator<Item = DataLoadDescriptor>, now: Instant) -> Self {
        let tasks = descriptors
            .into_iter()
            .map(|descriptor| PollingTask {
                descriptor,
                next_run_at: now,
            })
            .collect();
        Self { tasks }
    }

    /// Indices of every task due at `now`, in configuration order.
    pub fn due_tasks(&self, now: Instant) -> Vec<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, task)| task.next_run_at <= now)
            .map(|(index, _)| index)
            .collect()
    }

    /// Push a task one polling interval past `now`.
    ///
    /// Counting from the attempt time means a late run never triggers
    /// catch-up polls. Intervals are capped at [`MAX_POLLING_INTERVAL`].
    pub fn reschedule(&mut self, index: usize, now: Instant) {
        if let Some(task) = self.tasks.get_mut(index) {
            let interval = task.descriptor.polling_interval.min(MAX_POLLING_INTERVAL);
            task.next_run_at = now.checked_add(interval).unwrap_or(now);
        }
    }

    pub fn task(&self, index: usize) -> Option<&PollingTask> {
        self.tasks.get(index)
    }

    pub fn tasks(&self) -> &[PollingTask] {
        &self.tasks
    }

    /// Earliest time any task becomes due.
    pub fn next_due(&self) -> Option<Instant> {
        self.tasks.iter().map(|task| task.next_run_at).min()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
