/// Sent by the dispatch worker once it has marked a task done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMessage {
    Finished(u64),
}
