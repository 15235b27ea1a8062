use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::models::PathSpec;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Assigned,
    Completed,
    Abandoned,
}

/// One unit of work: a path specification and its retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub path_spec: PathSpec,
    /// Times this task was requeued after its worker died
    pub retries: u32,
    pub state: TaskState,
}

impl Task {
    pub fn new(id: TaskId, path_spec: PathSpec) -> Self {
        Self {
            id,
            path_spec,
            retries: 0,
            state: TaskState::Queued,
        }
    }
}

/// What happened to a task whose worker was terminated while holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    Requeued(TaskId),
    Abandoned(Task),
}

/// Pending queue and in-flight bookkeeping of the foreman.
#[derive(Debug)]
pub struct TaskScheduler {
    next_id: TaskId,
    max_requeues: u32,
    pending: VecDeque<Task>,
    assigned: HashMap<TaskId, Task>,
    completed: u64,
    abandoned: u64,
}

impl TaskScheduler {
    pub fn new(max_requeues: u32) -> Self {
        Self {
            next_id: 1,
            max_requeues,
            pending: VecDeque::new(),
            assigned: HashMap::new(),
            completed: 0,
            abandoned: 0,
        }
    }

    /// Queue a new task at the back
    pub fn submit(&mut self, path_spec: PathSpec) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push_back(Task::new(id, path_spec));
        id
    }

    /// Take the next pending task and mark it assigned
    pub fn next_task(&mut self) -> Option<Task> {
        let mut task = self.pending.pop_front()?;
        task.state = TaskState::Assigned;
        self.assigned.insert(task.id, task.clone());
        Some(task)
    }

    /// Put an assigned task back at the front without charging a retry,
    /// for a task that never reached its worker.
    pub fn release(&mut self, id: TaskId) {
        if let Some(mut task) = self.assigned.remove(&id) {
            task.state = TaskState::Queued;
            self.pending.push_front(task);
        }
    }

    pub fn complete(&mut self, id: TaskId) -> Option<Task> {
        let mut task = self.assigned.remove(&id)?;
        task.state = TaskState::Completed;
        self.completed += 1;
        Some(task)
    }

    /// Record that the worker holding `id` was terminated.
    ///
    /// The task is requeued at the front while it has requeues left,
    /// otherwise it is abandoned and handed back to the caller.
    pub fn fail(&mut self, id: TaskId) -> Option<FailureOutcome> {
        let mut task = self.assigned.remove(&id)?;

        if task.retries < self.max_requeues {
            task.retries += 1;
            task.state = TaskState::Queued;
            self.pending.push_front(task);
            Some(FailureOutcome::Requeued(id))
        } else {
            task.state = TaskState::Abandoned;
            self.abandoned += 1;
            Some(FailureOutcome::Abandoned(task))
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn completed_count(&self) -> u64 {
        self.completed
    }

    pub fn abandoned_count(&self) -> u64 {
        self.abandoned
    }

    /// Nothing pending and nothing in flight
    pub fn is_drained(&self) -> bool {
        self.pending.is_empty() && self.assigned.is_empty()
    }
}
