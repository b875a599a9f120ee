//! Database task messages. Plain payload types; the runtime neither knows nor
//! cares that they describe database work.

/// Asks the database process to execute one statement.
#[derive(Debug)]
pub struct RunDatabaseTaskRequest {
    pub task_id: u64,
    pub statement: String,
}

/// Result of one executed statement, returned to the requester.
#[derive(Debug)]
pub struct RunDatabaseTaskResponse {
    pub task_id: u64,
    pub rows: u32,
    pub success: bool,
}
