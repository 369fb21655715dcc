//! ProcessStatus - プロセスの状態

use serde::{Deserialize, Serialize};

/// ProcessStatus は 1 つのプロセスインスタンスの状態を表現
///
/// # 状態遷移
/// - idle: 作成済み、worker の開始待ち
/// - running: worker 実行中
/// - done / failed / timed_out: 結果が確定（以後の settle は無視）
/// - canceled: キャンセル済み（waiter には通知しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    /// Created, worker start scheduled.
    Idle,
    /// Worker started, not settled yet.
    Running,
    Done,
    Failed,
    TimedOut,
    Canceled,
}

impl ProcessStatus {
    /// Not settled and not canceled.
    pub fn is_live(self) -> bool {
        matches!(self, ProcessStatus::Idle | ProcessStatus::Running)
    }
}
