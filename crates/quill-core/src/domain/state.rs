//! State - PollLoop の状態
//!
//! # 状態遷移
//! - Submitted -> Polling -> Completed
//! - Submitted -> Polling -> Failed
//! - Submitted -> Polling -> TimedOut（max_attempts 到達）
//! - Submitted -> Polling -> Cancelled（呼び出し側が中断）
//!
//! submit 前の段階（task_id がまだ無い）は TaskDescriptor そのものが表すので、
//! ここには含めません。
//! Polling は max_attempts 回まで自己遷移します。終端状態からの再開はありません。

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::task::PollPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    Submitted,
    Polling,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl PollPhase {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PollPhase::Completed | PollPhase::Failed | PollPhase::TimedOut | PollPhase::Cancelled
        )
    }
}

/// Per-run bookkeeping. Owned by exactly one PollLoop run.
#[derive(Debug, Clone)]
pub struct PollState {
    pub task_id: TaskId,
    pub attempt: u32,
    pub max_attempts: u32,
    pub interval: Duration,
    pub started_at: DateTime<Utc>,
    pub phase: PollPhase,
}

impl PollState {
    pub fn new(task_id: TaskId, policy: PollPolicy, started_at: DateTime<Utc>) -> Self {
        Self {
            task_id,
            attempt: 0,
            max_attempts: policy.max_attempts,
            interval: policy.interval,
            started_at,
            phase: PollPhase::Submitted,
        }
    }

    /// Record one more poll; returns true when the budget is used up.
    pub fn record_attempt(&mut self) -> bool {
        self.attempt += 1;
        self.attempt >= self.max_attempts
    }

    pub fn transition(&mut self, next: PollPhase) {
        debug_assert!(!self.phase.is_terminal(), "terminal phases are sinks");
        self.phase = next;
    }
}
