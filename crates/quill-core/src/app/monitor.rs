//! ConcurrentStatusMonitor - ボード単位の実行中タスク一覧
//!
//! # 更新間隔
//! - 実行中タスクがある間だけ refresh_interval（既定 2s）ごとに再取得
//! - 0 件になったら停止（アイドル）。画面を開き直したら watch() を呼び直す
//!
//! 取得失敗は空のスナップショットとして扱い、呼び出し元へは伝播しません。

use std::fmt::Write as _;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::domain::{BoardId, ConcurrentTaskSnapshot, DomainEvent, TaskKind};
use crate::ports::{EventSink, HttpRequest, Transport};

use super::client::routes;

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(2);

/// Progress never reaches 100 until the backend says the task is done.
const PROGRESS_CAP: f64 = 95.0;

/// Used for task types this client does not know.
const FALLBACK_EXPECTED: Duration = Duration::from_secs(60);

pub struct ConcurrentStatusMonitor<'a, T> {
    transport: &'a T,
    events: &'a dyn EventSink,
    refresh_interval: Duration,
}

impl<'a, T: Transport> ConcurrentStatusMonitor<'a, T> {
    pub fn new(transport: &'a T, events: &'a dyn EventSink) -> Self {
        Self {
            transport,
            events,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// One full read of the board's active tasks.
    pub async fn snapshot(&self, board_id: &BoardId) -> ConcurrentTaskSnapshot {
        let fetched = self
            .transport
            .send(HttpRequest::get(routes::concurrent_status(board_id)))
            .await
            .and_then(|resp| resp.decode::<ConcurrentTaskSnapshot>());

        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(board_id = %board_id, error = %err, "concurrent status unavailable");
                ConcurrentTaskSnapshot::empty()
            }
        };
        self.events.emit(&DomainEvent::MonitorRefreshed {
            board_id: board_id.clone(),
            active_tasks: snapshot.active_tasks,
        });
        snapshot
    }

    /// Publish snapshots until the board goes idle or `cancel` fires.
    /// Returns the last snapshot published.
    pub async fn watch(
        &self,
        board_id: &BoardId,
        mut publish: impl FnMut(&ConcurrentTaskSnapshot),
        cancel: &CancellationToken,
    ) -> ConcurrentTaskSnapshot {
        loop {
            let snapshot = self.snapshot(board_id).await;
            publish(&snapshot);
            if !snapshot.has_active() {
                return snapshot;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return snapshot,
                _ = tokio::time::sleep(self.refresh_interval) => {}
            }
        }
    }
}

/// Elapsed share of the expected duration for `task_type`, in percent,
/// capped below completion.
pub fn progress_percent(task_type: &str, duration_seconds: f64) -> u8 {
    let expected = TaskKind::parse(task_type)
        .map(TaskKind::expected_duration)
        .unwrap_or(FALLBACK_EXPECTED);
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return 0;
    }
    let percent = duration_seconds / expected.as_secs_f64() * 100.0;
    percent.min(PROGRESS_CAP).floor() as u8
}

pub fn render(snapshot: &ConcurrentTaskSnapshot) -> String {
    if !snapshot.has_active() {
        return format!(
            "No active tasks ({} slots available)\n",
            snapshot.available_slots
        );
    }

    let mut out = format!(
        "Active tasks: {} ({} slots available)\n",
        snapshot.active_tasks, snapshot.available_slots
    );
    for detail in &snapshot.details {
        let description = if detail.description.is_empty() {
            detail.task_id.as_str()
        } else {
            detail.description.as_str()
        };
        let _ = writeln!(
            out,
            "  - [{}] {} {:>4.0}s {:>3}%",
            detail.task_type,
            description,
            detail.duration_seconds,
            progress_percent(&detail.task_type, detail.duration_seconds),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;
    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::domain::ActiveTaskDetail;
    use crate::impls::{NoopEventSink, RecordingEventSink, ScriptedTransport};
    use crate::ports::{HttpResponse, Method};

    const PATH: &str = "/api/expert/dynamic/concurrent-status/b1";

    fn active(n: u32) -> HttpResponse {
        HttpResponse::ok(json!({
            "active_tasks": n,
            "available_slots": 3 - n,
            "active_task_details": (0..n)
                .map(|i| json!({"task_id": format!("t{i}"), "task_type": "generate_annotation", "duration": 5}))
                .collect::<Vec<_>>(),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn repolls_only_while_tasks_are_active() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .push(Method::Get, PATH, Ok(active(2)))
            .push(Method::Get, PATH, Ok(active(1)))
            .push(Method::Get, PATH, Ok(active(0)))
            .always(Method::Get, PATH, Ok(active(2)));
        let mut published = Vec::new();
        let start = Instant::now();

        let last = ConcurrentStatusMonitor::new(&transport, &NoopEventSink)
            .watch(&BoardId::new("b1"), |s| published.push(s.active_tasks), &CancellationToken::new())
            .await;

        assert_eq!(published, vec![2, 1, 0]);
        assert_eq!(last.active_tasks, 0);
        assert_eq!(transport.total_calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_board_is_read_once() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always(Method::Get, PATH, Ok(active(0)));

        ConcurrentStatusMonitor::new(&transport, &NoopEventSink)
            .watch(&BoardId::new("b1"), |_| {}, &CancellationToken::new())
            .await;

        assert_eq!(transport.total_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_reads_as_empty_and_stops() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always(Method::Get, PATH, Ok(HttpResponse::status(500, json!(null))));
        let events = RecordingEventSink::new();

        let last = ConcurrentStatusMonitor::new(&transport, &events)
            .watch(&BoardId::new("b1"), |_| {}, &CancellationToken::new())
            .await;

        assert_eq!(last, ConcurrentTaskSnapshot::empty());
        assert_eq!(transport.total_calls(), 1);
        assert_eq!(events.count("monitor_refreshed"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_ends_watch() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always(Method::Get, PATH, Ok(active(1)));
        let cancel = CancellationToken::new();
        let monitor = ConcurrentStatusMonitor::new(&transport, &NoopEventSink)
            .with_refresh_interval(Duration::from_millis(500));
        let board = BoardId::new("b1");

        let (last, ()) = tokio::join!(
            monitor.watch(&board, |_| {}, &cancel),
            async {
                tokio::time::sleep(Duration::from_millis(1200)).await;
                cancel.cancel();
            }
        );

        assert!(last.has_active());
        // reads at 0, 500ms and 1000ms
        assert_eq!(transport.total_calls(), 3);
    }

    #[rstest]
    #[case("generate_annotation", 15.0, 50)]
    #[case("generate_annotation", 300.0, 95)]
    #[case("generate_pdf_note", 60.0, 50)]
    #[case("something_new", 30.0, 50)]
    #[case("answer_question", 0.0, 0)]
    #[case("answer_question", -3.0, 0)]
    fn progress_is_capped(#[case] task_type: &str, #[case] seconds: f64, #[case] expected: u8) {
        assert_eq!(progress_percent(task_type, seconds), expected);
    }

    #[test]
    fn render_lists_details() {
        let snapshot = ConcurrentTaskSnapshot {
            active_tasks: 1,
            available_slots: 2,
            details: vec![ActiveTaskDetail {
                task_id: "t1".into(),
                task_type: "generate_annotation".into(),
                duration_seconds: 15.0,
                description: "page 3".into(),
            }],
        };

        let text = render(&snapshot);

        assert!(text.starts_with("Active tasks: 1 (2 slots available)"));
        assert!(text.contains("[generate_annotation] page 3"));
        assert!(text.contains("50%"));
    }

    #[test]
    fn render_idle() {
        assert_eq!(
            render(&ConcurrentTaskSnapshot::empty()),
            "No active tasks (0 slots available)\n"
        );
    }
}
