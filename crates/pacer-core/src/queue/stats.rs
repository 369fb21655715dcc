use serde::{Deserialize, Serialize};

use crate::domain::QueueId;

/// Point-in-time view of a task queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub id: QueueId,
    pub name: String,
    pub pending: usize,
    pub busy: bool,
    pub completed: u64,
    pub failed: u64,
}
