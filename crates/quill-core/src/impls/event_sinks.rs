//! EventSink の実装

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::domain::{DomainEvent, PollPhase};
use crate::ports::EventSink;

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &DomainEvent) {
        match event {
            DomainEvent::TaskSubmitted {
                run_id,
                task_id,
                kind,
                board_id,
            } => info!(%run_id, %task_id, %kind, %board_id, "task submitted"),
            DomainEvent::PollAttempt {
                task_id,
                attempt,
                max_attempts,
            } => debug!(%task_id, attempt, max_attempts, "poll"),
            DomainEvent::PollTransportError {
                task_id,
                attempt,
                error,
            } => warn!(%task_id, attempt, %error, "poll transport error, will retry"),
            DomainEvent::PhaseChanged { task_id, phase } => match phase {
                PollPhase::Failed | PollPhase::TimedOut => {
                    warn!(%task_id, ?phase, "task ended without result")
                }
                _ => info!(%task_id, ?phase, "phase changed"),
            },
            DomainEvent::ResultReconciled {
                task_id,
                kind,
                page,
                promoted,
            } => info!(%task_id, %kind, ?page, promoted, "result merged"),
            DomainEvent::ResultDegraded { task_id, reason } => {
                warn!(%task_id, %reason, "structured result kept as raw text")
            }
            DomainEvent::ResultOrphaned { task_id } => {
                warn!(%task_id, "result target no longer exists, dropped")
            }
            DomainEvent::StyleFallback { board_id, reason } => {
                warn!(%board_id, %reason, "annotation style unavailable, using default")
            }
            DomainEvent::SaveRetryScheduled {
                label,
                attempt,
                delay,
                error,
            } => warn!(%label, attempt, ?delay, %error, "save failed, retrying"),
            DomainEvent::SaveSucceeded { label, attempts } => {
                debug!(%label, attempts, "save succeeded")
            }
            DomainEvent::WindowSaved {
                board_id,
                window_id,
            } => info!(%board_id, %window_id, "window saved"),
            DomainEvent::MonitorRefreshed {
                board_id,
                active_tasks,
            } => debug!(%board_id, active_tasks, "concurrent status refreshed"),
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &DomainEvent) {}
}

/// Keeps every event in memory (tests, activity panels).
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(DomainEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|n| *n == name).count()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &DomainEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
