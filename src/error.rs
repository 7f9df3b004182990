use std::path::PathBuf;

use thiserror::Error;

use crate::models::task::TaskStatus;

#[derive(Debug, Error, PartialEq)]
pub enum TaskError {
    #[error("task {0} has an empty command")]
    EmptyCommand(u64),
    #[error("task {id} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: u64,
        from: TaskStatus,
        to: TaskStatus,
    },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error("task {id} requires {requirement} units but the ceiling is {ceiling}")]
    ExceedsCeiling {
        id: u64,
        requirement: u32,
        ceiling: u32,
    },
    #[error("failed to spawn task {id} ({command}): {reason}")]
    SpawnFailed {
        id: u64,
        command: String,
        reason: String,
    },
    #[error("dispatch worker stopped with {in_flight} task(s) still in flight")]
    WorkerStopped { in_flight: usize },
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("task {0} has not finished yet")]
    NotDone(u64),
    #[error("task {id} never ran: {reason}")]
    SpawnFailed { id: u64, reason: String },
    #[error("malformed result in {path:?}: {content:?}")]
    Malformed { path: PathBuf, content: String },
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error("compile command `{command}` failed: {reason}")]
    Compile { command: String, reason: String },
    #[error("no grid point recorded for task {0}")]
    UnknownTask(u64),
}
