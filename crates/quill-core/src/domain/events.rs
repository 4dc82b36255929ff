//! Events - ドメインイベント
//!
//! オーケストレーション層は EventSink を直接呼び出してイベントを通知します。
//! グローバルなイベントバスは使いません。

use std::time::Duration;

use super::ids::{BoardId, RunId, TaskId, WindowId};
use super::state::PollPhase;
use super::task::TaskKind;

/// DomainEvent はオーケストレーション中に発生したイベント
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    TaskSubmitted {
        run_id: RunId,
        task_id: TaskId,
        kind: TaskKind,
        board_id: BoardId,
    },
    PollAttempt {
        task_id: TaskId,
        attempt: u32,
        max_attempts: u32,
    },
    /// A transport failure during polling; the loop will poll again.
    PollTransportError {
        task_id: TaskId,
        attempt: u32,
        error: String,
    },
    PhaseChanged {
        task_id: TaskId,
        phase: PollPhase,
    },
    ResultReconciled {
        task_id: TaskId,
        kind: TaskKind,
        page: Option<u32>,
        promoted: bool,
    },
    ResultDegraded {
        task_id: TaskId,
        reason: String,
    },
    ResultOrphaned {
        task_id: TaskId,
    },
    StyleFallback {
        board_id: BoardId,
        reason: String,
    },
    SaveRetryScheduled {
        label: String,
        attempt: u32,
        delay: Duration,
        error: String,
    },
    SaveSucceeded {
        label: String,
        attempts: u32,
    },
    WindowSaved {
        board_id: BoardId,
        window_id: WindowId,
    },
    MonitorRefreshed {
        board_id: BoardId,
        active_tasks: u32,
    },
}

impl DomainEvent {
    /// Stable name for log fields and test assertions.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TaskSubmitted { .. } => "task_submitted",
            DomainEvent::PollAttempt { .. } => "poll_attempt",
            DomainEvent::PollTransportError { .. } => "poll_transport_error",
            DomainEvent::PhaseChanged { .. } => "phase_changed",
            DomainEvent::ResultReconciled { .. } => "result_reconciled",
            DomainEvent::ResultDegraded { .. } => "result_degraded",
            DomainEvent::ResultOrphaned { .. } => "result_orphaned",
            DomainEvent::StyleFallback { .. } => "style_fallback",
            DomainEvent::SaveRetryScheduled { .. } => "save_retry_scheduled",
            DomainEvent::SaveSucceeded { .. } => "save_succeeded",
            DomainEvent::WindowSaved { .. } => "window_saved",
            DomainEvent::MonitorRefreshed { .. } => "monitor_refreshed",
        }
    }
}
