//! Worker orchestration: connections, worker tasks and the race between each
//! worker's completion and its budget.

pub mod manager;
pub mod worker;
