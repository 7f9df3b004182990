use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::models::task::Task;

/// Unbounded FIFO of tasks waiting for the dispatch worker.
#[derive(Debug, Clone)]
pub struct SubmissionQueue {
    sender: Sender<Task>,
    receiver: Receiver<Task>,
}

#[derive(Debug)]
pub enum Popped {
    Task(Task),
    Empty,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        SubmissionQueue { sender, receiver }
    }

    pub fn push(&self, task: Task) {
        // both ends live in the queue, so the channel is never disconnected
        let _ = self.sender.send(task);
    }

    /// Next task in submission order, or `Empty` once `timeout` elapses.
    pub fn pop(&self, timeout: Duration) -> Popped {
        // a timeout is the only possible error while `self` holds a sender
        match self.receiver.recv_timeout(timeout) {
            Ok(task) => Popped::Task(task),
            Err(_) => Popped::Empty,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Default for SubmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}
