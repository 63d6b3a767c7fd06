//! Per-task execution statistics, exposed to observability consumers as immutable snapshots.

use std::fmt::{Display, Formatter};
use std::time::{Duration, SystemTime};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TaskStatus {
    /// Registered and waiting for its next fire time.
    Pending,
    /// An execution is currently in flight.
    Running,
    /// The scheduler has stopped this task.
    Stopped,
    /// The most recent execution failed.
    Error,
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Stopped => "stopped",
            TaskStatus::Error => "error",
        })
    }
}

/// Immutable view of one task's runtime statistics.
#[derive(Clone, Debug)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub executions: u64,
    pub failures: u64,
    pub last_start: Option<SystemTime>,
    pub last_duration: Option<Duration>,
    pub mean_duration: Option<Duration>,
    pub status: TaskStatus,
}

/// Immutable view of the whole scheduler.
#[derive(Clone, Debug)]
pub struct SchedulerSnapshot {
    pub tasks: Vec<TaskSnapshot>,
    pub total_tasks: usize,
    pub running_tasks: usize,
}

#[derive(Debug)]
pub(crate) struct TaskStats {
    executions: u64,
    failures: u64,
    last_start: Option<SystemTime>,
    last_duration: Option<Duration>,
    total_duration: Duration,
    status: TaskStatus,
}

impl TaskStats {
    pub(crate) fn new() -> Self {
        Self {
            executions: 0,
            failures: 0,
            last_start: None,
            last_duration: None,
            total_duration: Duration::ZERO,
            status: TaskStatus::Pending,
        }
    }

    pub(crate) fn record_start(&mut self) {
        self.last_start = Some(SystemTime::now());
        self.status = TaskStatus::Running;
    }

    pub(crate) fn record_finish(&mut self, duration: Duration, failed: bool) {
        self.executions += 1;
        self.last_duration = Some(duration);
        self.total_duration += duration;
        if failed {
            self.failures += 1;
            self.status = TaskStatus::Error;
        } else {
            self.status = TaskStatus::Pending;
        }
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.status = TaskStatus::Stopped;
    }

    pub(crate) fn status(&self) -> TaskStatus {
        self.status
    }

    pub(crate) fn snapshot(&self, task_id: &str) -> TaskSnapshot {
        let mean_duration = (self.executions > 0).then(|| {
            self.total_duration / u32::try_from(self.executions).unwrap_or(u32::MAX)
        });

        TaskSnapshot {
            task_id: task_id.to_string(),
            executions: self.executions,
            failures: self.failures,
            last_start: self.last_start,
            last_duration: self.last_duration,
            mean_duration,
            status: self.status,
        }
    }
}
