use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::error::TaskError;

/// Tasks known to the scheduler, shared between the driver and the worker.
pub type TaskTable = Arc<Mutex<HashMap<u64, Task>>>;

pub fn lock_table(tasks: &TaskTable) -> MutexGuard<'_, HashMap<u64, Task>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: u64,
    pub command: Vec<String>,
    pub resource_requirement: u32,
    pub status: TaskStatus,
    pub output_artifact_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Pending,
    Running,
    Done(TaskOutcome),
}

/// How a task reached `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Exited { code: Option<i32> },
    SpawnFailed { reason: String },
}

impl Task {
    pub fn new(
        id: u64,
        command: Vec<String>,
        resource_requirement: u32,
        output_artifact_path: PathBuf,
    ) -> Result<Self, TaskError> {
        if command.is_empty() {
            return Err(TaskError::EmptyCommand(id));
        }
        Ok(Self {
            id,
            command,
            resource_requirement,
            status: TaskStatus::Pending,
            output_artifact_path,
        })
    }

    /// Moves the task forward. Pending -> Running -> Done, plus
    /// Pending -> Done for a process that could not be created.
    pub fn advance(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        let allowed = matches!(
            (&self.status, &next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Done(_))
                | (
                    TaskStatus::Pending,
                    TaskStatus::Done(TaskOutcome::SpawnFailed { .. })
                )
        );
        if !allowed {
            return Err(TaskError::InvalidTransition {
                id: self.id,
                from: self.status.clone(),
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        matches!(self.status, TaskStatus::Done(_))
    }

    pub fn display_command(&self) -> String {
        self.command.join(" ")
    }
}
