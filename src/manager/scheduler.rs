use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread::JoinHandle,
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{info, warn};

use crate::error::DispatchError;
use crate::manager::{admission::AdmissionController, queue::SubmissionQueue};
use crate::models::{
    message::TaskMessage,
    task::{lock_table, Task, TaskStatus, TaskTable},
};
use crate::worker::worker::{spawn_worker_thread, OutputMode, WorkerSettings};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Maximum sum of resource requirements in flight at once.
    pub ceiling: u32,
    pub poll_interval: Duration,
    pub pop_timeout: Duration,
    pub output_mode: OutputMode,
}

impl SchedulerConfig {
    pub fn new(ceiling: u32) -> Self {
        SchedulerConfig {
            ceiling,
            poll_interval: Duration::from_millis(500),
            pop_timeout: Duration::from_secs(1),
            output_mode: OutputMode::Discard,
        }
    }
}

/// Owns the queue, task table, capacity ledger and dispatch worker of one run.
pub struct Scheduler {
    tasks: TaskTable,
    queue: SubmissionQueue,
    admission: AdmissionController,
    notifier: Option<Sender<TaskMessage>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    settings: WorkerSettings,
    next_id: u64,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        let (notifier, completions): (Sender<TaskMessage>, Receiver<TaskMessage>) = unbounded();
        Scheduler {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            queue: SubmissionQueue::new(),
            admission: AdmissionController::new(config.ceiling, config.poll_interval, completions),
            notifier: Some(notifier),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
            settings: WorkerSettings {
                pop_timeout: config.pop_timeout,
                output_mode: config.output_mode,
            },
            next_id: 0,
        }
    }

    pub fn start(&mut self) {
        // the worker holds the only sender, so its exit disconnects the channel
        let Some(notifier) = self.notifier.take() else {
            warn!("Dispatch worker already started.");
            return;
        };
        self.worker = Some(spawn_worker_thread(
            self.queue.clone(),
            Arc::clone(&self.tasks),
            notifier,
            Arc::clone(&self.shutdown),
            self.settings,
        ));
    }

    pub fn create_task(
        &mut self,
        command: Vec<String>,
        resource_requirement: u32,
        output_artifact_path: PathBuf,
    ) -> Result<Task, DispatchError> {
        self.next_id += 1;
        Ok(Task::new(
            self.next_id,
            command,
            resource_requirement,
            output_artifact_path,
        )?)
    }

    /// Queues the task once its requirement fits under the ceiling.
    ///
    /// Blocks while capacity is exhausted. An error from a previously
    /// submitted task (e.g. a spawn failure) is returned before this task
    /// is queued.
    pub fn submit(&mut self, task: Task) -> Result<(), DispatchError> {
        if self.worker.is_none() {
            return Err(DispatchError::WorkerStopped {
                in_flight: self.admission.in_flight(),
            });
        }
        self.admission.check(&task)?;
        self.admission.reclaim(&self.tasks)?;
        self.admission
            .wait_for_capacity(task.resource_requirement, &self.tasks)?;

        lock_table(&self.tasks).insert(task.id, task.clone());
        self.queue.push(task.clone());
        info!(
            "Task '{}' submitted ({} units, {}/{} in use).",
            task.id,
            task.resource_requirement,
            self.admission.used_capacity() + task.resource_requirement,
            self.admission.ceiling()
        );
        self.admission.track(task);
        Ok(())
    }

    /// Waits for every submitted task and returns the ones not yet handed out.
    pub fn drain(&mut self) -> Result<Vec<Task>, DispatchError> {
        self.admission.drain(&self.tasks)?;
        Ok(self.admission.take_completed())
    }

    pub fn status(&self, id: u64) -> Option<TaskStatus> {
        lock_table(&self.tasks).get(&id).map(|task| task.status.clone())
    }

    pub fn used_capacity(&self) -> u32 {
        self.admission.used_capacity()
    }

    pub fn in_flight_requirement(&self) -> u64 {
        self.admission.ledger().in_flight_requirement()
    }

    pub fn ceiling(&self) -> u32 {
        self.admission.ceiling()
    }

    pub fn in_flight(&self) -> usize {
        self.admission.in_flight()
    }

    pub fn shutdown(mut self) {
        self.stop_worker();
    }

    fn stop_worker(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Dispatch worker panicked.");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // no join here: in-flight processes are never cancelled
        self.shutdown.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ceiling: u32) -> SchedulerConfig {
        SchedulerConfig {
            ceiling,
            poll_interval: Duration::from_millis(10),
            pop_timeout: Duration::from_millis(10),
            output_mode: OutputMode::Discard,
        }
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn ids_are_assigned_in_creation_order() {
        let mut scheduler = Scheduler::new(config(4));
        let a = scheduler.create_task(sh("true"), 1, PathBuf::from("a")).unwrap();
        let b = scheduler.create_task(sh("true"), 1, PathBuf::from("b")).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
    }

    #[test]
    fn submit_before_start_is_an_error() {
        let mut scheduler = Scheduler::new(config(4));
        let task = scheduler.create_task(sh("true"), 1, PathBuf::from("a")).unwrap();
        assert!(matches!(
            scheduler.submit(task),
            Err(DispatchError::WorkerStopped { in_flight: 0 })
        ));
    }

    #[test]
    fn oversized_task_is_rejected_without_blocking() {
        let mut scheduler = Scheduler::new(config(4));
        scheduler.start();
        let task = scheduler.create_task(sh("true"), 5, PathBuf::from("a")).unwrap();
        assert!(matches!(
            scheduler.submit(task),
            Err(DispatchError::ExceedsCeiling { .. })
        ));
        assert_eq!(scheduler.used_capacity(), 0);
        scheduler.shutdown();
    }

    #[test]
    fn drain_returns_every_submitted_task() {
        let mut scheduler = Scheduler::new(config(4));
        scheduler.start();
        for _ in 0..6 {
            let task = scheduler.create_task(sh("true"), 2, PathBuf::from("x")).unwrap();
            scheduler.submit(task).unwrap();
            assert!(scheduler.used_capacity() <= scheduler.ceiling());
            assert_eq!(
                u64::from(scheduler.used_capacity()),
                scheduler.in_flight_requirement()
            );
        }
        let mut done = scheduler.drain().unwrap();
        done.sort_by_key(|task| task.id);
        assert_eq!(done.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5, 6]);
        assert!(done.iter().all(Task::is_done));
        assert_eq!(scheduler.used_capacity(), 0);
        assert_eq!(scheduler.in_flight(), 0);
        scheduler.shutdown();
    }

    #[test]
    fn spawn_failure_surfaces_from_drain() {
        let mut scheduler = Scheduler::new(config(4));
        scheduler.start();
        let task = scheduler
            .create_task(
                vec!["/nonexistent/bench-binary".to_string()],
                1,
                PathBuf::from("x"),
            )
            .unwrap();
        scheduler.submit(task).unwrap();
        assert!(matches!(
            scheduler.drain(),
            Err(DispatchError::SpawnFailed { id: 1, .. })
        ));
        assert_eq!(scheduler.used_capacity(), 0);
        scheduler.shutdown();
    }
}
