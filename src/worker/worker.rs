use std::{
    process::{Child, Command, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use clap::ValueEnum;
use crossbeam_channel::Sender;
use log::{debug, error, info, warn};

use crate::manager::queue::{Popped, SubmissionQueue};
use crate::models::{
    message::TaskMessage,
    task::{lock_table, Task, TaskOutcome, TaskStatus, TaskTable},
};

/// Where the stdout/stderr of launched processes go.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputMode {
    #[default]
    /// Discard all process output
    Discard,
    /// Share the dispatcher's stdout/stderr
    Inherit,
}

impl OutputMode {
    fn stdio(self) -> Stdio {
        match self {
            OutputMode::Discard => Stdio::null(),
            OutputMode::Inherit => Stdio::inherit(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub pop_timeout: Duration,
    pub output_mode: OutputMode,
}

pub fn spawn_worker_thread(
    queue: SubmissionQueue,
    tasks: TaskTable,
    notifier: Sender<TaskMessage>,
    shutdown: Arc<AtomicBool>,
    settings: WorkerSettings,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut running: Vec<(u64, Child)> = Vec::new();
        info!("Dispatch worker started.");
        loop {
            reap_finished(&mut running, &tasks, &notifier);

            if shutdown.load(Ordering::Acquire) && queue.is_empty() && running.is_empty() {
                break;
            }

            if let Popped::Task(task) = queue.pop(settings.pop_timeout) {
                let launched = handle_run_task(&task, &tasks, &notifier, settings.output_mode);
                if let Some(child) = launched {
                    running.push((task.id, child));
                }
            }
        }
        info!("Dispatch worker stopped.");
    })
}

/// Non-blocking sweep over every tracked process.
fn reap_finished(
    running: &mut Vec<(u64, Child)>,
    tasks: &TaskTable,
    notifier: &Sender<TaskMessage>,
) {
    running.retain_mut(|(id, child)| match child.try_wait() {
        Ok(None) => true,
        Ok(Some(exit)) => {
            if !exit.success() {
                warn!("Task '{}' exited with {}.", id, exit);
            }
            finish_task(*id, TaskOutcome::Exited { code: exit.code() }, tasks, notifier);
            false
        }
        Err(e) => {
            error!("Failed to poll task '{}': {}", id, e);
            finish_task(*id, TaskOutcome::Exited { code: None }, tasks, notifier);
            false
        }
    });
}

fn handle_run_task(
    task: &Task,
    tasks: &TaskTable,
    notifier: &Sender<TaskMessage>,
    output_mode: OutputMode,
) -> Option<Child> {
    let Some((program, args)) = task.command.split_first() else {
        finish_task(
            task.id,
            TaskOutcome::SpawnFailed {
                reason: "empty command".to_string(),
            },
            tasks,
            notifier,
        );
        return None;
    };

    info!("Starting task '{}': {}", task.id, task.display_command());
    match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(output_mode.stdio())
        .stderr(output_mode.stdio())
        .spawn()
    {
        Ok(child) => {
            debug!("Task '{}' running as pid {}.", task.id, child.id());
            handle_status_update(task.id, TaskStatus::Running, tasks);
            Some(child)
        }
        Err(e) => {
            error!("Failed to run task '{}': {}", task.id, e);
            finish_task(
                task.id,
                TaskOutcome::SpawnFailed {
                    reason: e.to_string(),
                },
                tasks,
                notifier,
            );
            None
        }
    }
}

fn finish_task(
    id: u64,
    outcome: TaskOutcome,
    tasks: &TaskTable,
    notifier: &Sender<TaskMessage>,
) {
    if handle_status_update(id, TaskStatus::Done(outcome), tasks) {
        // the driver may have stopped listening; the table is authoritative
        if notifier.send(TaskMessage::Finished(id)).is_err() {
            debug!("No listener for completion of task '{}'.", id);
        }
    }
}

fn handle_status_update(id: u64, status: TaskStatus, tasks: &TaskTable) -> bool {
    match lock_table(tasks).get_mut(&id) {
        Some(task) => match task.advance(status) {
            Ok(()) => {
                debug!("Task status updated {}: {:?}", id, task.status);
                true
            }
            Err(e) => {
                warn!("{}", e);
                false
            }
        },
        None => {
            warn!("Status update for unknown task '{}'.", id);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Instant;

    struct Harness {
        queue: SubmissionQueue,
        tasks: TaskTable,
        completions: crossbeam_channel::Receiver<TaskMessage>,
        shutdown: Arc<AtomicBool>,
        handle: JoinHandle<()>,
    }

    fn start() -> Harness {
        let queue = SubmissionQueue::new();
        let tasks: TaskTable = Arc::new(Mutex::new(HashMap::new()));
        let (notifier, completions) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = spawn_worker_thread(
            queue.clone(),
            Arc::clone(&tasks),
            notifier,
            Arc::clone(&shutdown),
            WorkerSettings {
                pop_timeout: Duration::from_millis(20),
                output_mode: OutputMode::Discard,
            },
        );
        Harness {
            queue,
            tasks,
            completions,
            shutdown,
            handle,
        }
    }

    fn submit(h: &Harness, id: u64, command: &[&str]) {
        let task = Task::new(
            id,
            command.iter().map(|s| s.to_string()).collect(),
            1,
            PathBuf::from("unused"),
        )
        .unwrap();
        lock_table(&h.tasks).insert(id, task.clone());
        h.queue.push(task);
    }

    fn wait_done(h: &Harness, id: u64) -> TaskStatus {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            let status = lock_table(&h.tasks)[&id].status.clone();
            if matches!(status, TaskStatus::Done(_)) {
                return status;
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("task {id} did not finish");
    }

    fn stop(h: Harness) {
        h.shutdown.store(true, Ordering::Release);
        h.handle.join().unwrap();
    }

    #[test]
    fn finished_process_marks_task_done_and_notifies() {
        let h = start();
        submit(&h, 1, &["sh", "-c", "exit 3"]);
        assert_eq!(
            wait_done(&h, 1),
            TaskStatus::Done(TaskOutcome::Exited { code: Some(3) })
        );
        assert_eq!(
            h.completions.recv_timeout(Duration::from_secs(1)).unwrap(),
            TaskMessage::Finished(1)
        );
        stop(h);
    }

    #[test]
    fn missing_program_is_reported_as_spawn_failure() {
        let h = start();
        submit(&h, 2, &["/nonexistent/definitely-not-here"]);
        assert!(matches!(
            wait_done(&h, 2),
            TaskStatus::Done(TaskOutcome::SpawnFailed { .. })
        ));
        stop(h);
    }

    #[test]
    fn long_running_process_does_not_block_reaping() {
        let h = start();
        submit(&h, 1, &["sleep", "2"]);
        submit(&h, 2, &["true"]);
        let started = Instant::now();
        wait_done(&h, 2);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(lock_table(&h.tasks)[&1].status, TaskStatus::Running);
        wait_done(&h, 1);
        stop(h);
    }

    #[test]
    fn shutdown_waits_for_in_flight_processes() {
        let h = start();
        submit(&h, 1, &["sleep", "0.2"]);
        thread::sleep(Duration::from_millis(60));
        let tasks = Arc::clone(&h.tasks);
        stop(h);
        assert!(lock_table(&tasks)[&1].is_done());
    }
}
