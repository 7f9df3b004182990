use std::{collections::HashMap, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info};

use crate::error::DispatchError;
use crate::models::{
    message::TaskMessage,
    task::{lock_table, Task, TaskOutcome, TaskStatus, TaskTable},
};

/// Capacity units held by in-flight tasks.
///
/// Units are only ever given back through [`Ledger::release`], which
/// subtracts the requirement stored with the released task itself.
#[derive(Debug, Default)]
pub struct Ledger {
    used: u32,
    in_flight: HashMap<u64, Task>,
}

impl Ledger {
    pub fn reserve(&mut self, task: Task) {
        debug_assert!(
            !self.in_flight.contains_key(&task.id),
            "task {} reserved twice",
            task.id
        );
        self.used += task.resource_requirement;
        self.in_flight.insert(task.id, task);
    }

    pub fn release(&mut self, id: u64) -> Option<Task> {
        let task = self.in_flight.remove(&id)?;
        self.used -= task.resource_requirement;
        Some(task)
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.in_flight.contains_key(&id)
    }

    pub fn in_flight_ids(&self) -> Vec<u64> {
        self.in_flight.keys().copied().collect()
    }

    pub fn in_flight_requirement(&self) -> u64 {
        self.in_flight
            .values()
            .map(|task| u64::from(task.resource_requirement))
            .sum()
    }
}

pub struct AdmissionController {
    ceiling: u32,
    poll_interval: Duration,
    ledger: Ledger,
    completions: Receiver<TaskMessage>,
    completed: Vec<Task>,
}

impl AdmissionController {
    pub fn new(ceiling: u32, poll_interval: Duration, completions: Receiver<TaskMessage>) -> Self {
        AdmissionController {
            ceiling,
            poll_interval,
            ledger: Ledger::default(),
            completions,
            completed: Vec::new(),
        }
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    pub fn used_capacity(&self) -> u32 {
        self.ledger.used()
    }

    pub fn in_flight(&self) -> usize {
        self.ledger.in_flight()
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Rejects a task that could never fit under the ceiling.
    pub fn check(&self, task: &Task) -> Result<(), DispatchError> {
        if task.resource_requirement > self.ceiling {
            return Err(DispatchError::ExceedsCeiling {
                id: task.id,
                requirement: task.resource_requirement,
                ceiling: self.ceiling,
            });
        }
        Ok(())
    }

    pub fn admits(&self, requirement: u32) -> bool {
        u64::from(self.ledger.used()) + u64::from(requirement) <= u64::from(self.ceiling)
    }

    pub fn wait_for_capacity(
        &mut self,
        requirement: u32,
        tasks: &TaskTable,
    ) -> Result<(), DispatchError> {
        if !self.admits(requirement) {
            debug!(
                "Waiting for capacity: {} used, {} requested, ceiling {}.",
                self.ledger.used(),
                requirement,
                self.ceiling
            );
        }
        while !self.admits(requirement) {
            self.wait_and_reclaim(tasks)?;
        }
        Ok(())
    }

    pub fn track(&mut self, task: Task) {
        self.ledger.reserve(task);
    }

    /// Releases every in-flight task the worker has marked done.
    pub fn reclaim(&mut self, tasks: &TaskTable) -> Result<usize, DispatchError> {
        let ids = self.ledger.in_flight_ids();
        self.reclaim_ids(ids, tasks)
    }

    /// Releases the given tasks if they are in flight and done.
    fn reclaim_ids(&mut self, ids: Vec<u64>, tasks: &TaskTable) -> Result<usize, DispatchError> {
        let mut finished = Vec::new();
        {
            let mut table = lock_table(tasks);
            for id in ids {
                if !self.ledger.contains(id) {
                    continue;
                }
                if table.get(&id).is_some_and(Task::is_done) {
                    if let Some(task) = table.remove(&id) {
                        finished.push(task);
                    }
                }
            }
        }

        let reclaimed = finished.len();
        let mut failure = None;
        for task in finished {
            self.ledger.release(task.id);
            if let TaskStatus::Done(TaskOutcome::SpawnFailed { reason }) = &task.status {
                error!("Task '{}' could not be launched: {}", task.id, reason);
                failure.get_or_insert_with(|| DispatchError::SpawnFailed {
                    id: task.id,
                    command: task.display_command(),
                    reason: reason.clone(),
                });
            } else {
                debug!(
                    "Task '{}' finished, {} units released.",
                    task.id, task.resource_requirement
                );
            }
            self.completed.push(task);
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(reclaimed),
        }
    }

    /// Waits until every tracked task is done.
    pub fn drain(&mut self, tasks: &TaskTable) -> Result<(), DispatchError> {
        info!("Draining {} in-flight task(s).", self.ledger.in_flight());
        self.reclaim(tasks)?;
        while self.ledger.in_flight() > 0 {
            self.wait_and_reclaim(tasks)?;
        }
        Ok(())
    }

    pub fn take_completed(&mut self) -> Vec<Task> {
        std::mem::take(&mut self.completed)
    }

    /// Sleeps up to one poll interval. Tasks the worker reports finished
    /// are released right away; after a silent interval every in-flight
    /// task is rescanned.
    fn wait_and_reclaim(&mut self, tasks: &TaskTable) -> Result<usize, DispatchError> {
        match self.completions.recv_timeout(self.poll_interval) {
            Ok(TaskMessage::Finished(id)) => {
                let mut ids = vec![id];
                ids.extend(
                    self.completions
                        .try_iter()
                        .map(|TaskMessage::Finished(id)| id),
                );
                self.reclaim_ids(ids, tasks)
            }
            Err(RecvTimeoutError::Timeout) => self.reclaim(tasks),
            Err(RecvTimeoutError::Disconnected) => Err(DispatchError::WorkerStopped {
                in_flight: self.ledger.in_flight(),
            }),
        }
    }
}
