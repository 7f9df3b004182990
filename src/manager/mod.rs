pub mod admission;
pub mod queue;
pub mod scheduler;
