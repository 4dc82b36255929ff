//! PollLoop - 1つのタスクを終端状態まで追跡する
//!
//! # フロー
//! 1. interval 待つ（キャンセルされたら即終了）
//! 2. TaskClient::poll()
//! 3. completed → payload を返す / failed → TaskFailed
//! 4. pending・running・通信エラー（HTTP ステータス異常を含む） → attempt を進めて 1 へ
//! 5. attempt >= max_attempts → Timeout
//!
//! 再帰的なタイマーではなく、明示的な attempt 予算を持つ単純なループです。
//! 待機は tokio::time なので、テストでは仮想時間で検証できます。

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::{
    DomainEvent, PollPhase, PollPolicy, PollState, TaskError, TaskHandle, TaskResult,
};
use crate::ports::{Clock, EventSink, Transport};

use super::client::TaskClient;

/// Drives one task handle to a terminal result.
///
/// Holds no per-task state of its own: every `run` builds a fresh
/// [`PollState`], so one `PollLoop` may drive many tasks concurrently.
pub struct PollLoop<'a, T> {
    client: &'a TaskClient<T>,
    events: &'a dyn EventSink,
    clock: &'a dyn Clock,
}

impl<'a, T: Transport> PollLoop<'a, T> {
    pub fn new(client: &'a TaskClient<T>, events: &'a dyn EventSink, clock: &'a dyn Clock) -> Self {
        Self {
            client,
            events,
            clock,
        }
    }

    /// Poll until completed, failed, timed out or cancelled.
    ///
    /// Transport failures, including non-success HTTP statuses, are retried on
    /// the next cycle and count against the same attempt budget. Only a
    /// backend `failed` status, cancellation or an exhausted budget end the
    /// loop early.
    pub async fn run(
        &self,
        handle: &TaskHandle,
        policy: PollPolicy,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value, TaskError> {
        let mut state = PollState::new(handle.task_id.clone(), policy, self.clock.now());
        self.events.emit(&DomainEvent::PhaseChanged {
            task_id: state.task_id.clone(),
            phase: state.phase,
        });
        self.transition(&mut state, PollPhase::Polling);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.transition(&mut state, PollPhase::Cancelled);
                    return Err(TaskError::Cancelled { task_id: state.task_id });
                }
                _ = tokio::time::sleep(state.interval) => {}
            }

            let polled = self.client.poll(&state.task_id).await;
            let exhausted = state.record_attempt();
            self.events.emit(&DomainEvent::PollAttempt {
                task_id: state.task_id.clone(),
                attempt: state.attempt,
                max_attempts: state.max_attempts,
            });

            let last_error = match polled {
                Ok(TaskResult::Completed(payload)) => {
                    self.transition(&mut state, PollPhase::Completed);
                    return Ok(payload);
                }
                Ok(TaskResult::Failed(message)) => {
                    self.transition(&mut state, PollPhase::Failed);
                    return Err(TaskError::TaskFailed {
                        task_id: state.task_id,
                        message,
                    });
                }
                Ok(TaskResult::Pending | TaskResult::Running) => None,
                Err(err) => {
                    self.events.emit(&DomainEvent::PollTransportError {
                        task_id: state.task_id.clone(),
                        attempt: state.attempt,
                        error: err.to_string(),
                    });
                    Some(err.to_string())
                }
            };

            if exhausted {
                self.transition(&mut state, PollPhase::TimedOut);
                return Err(TaskError::Timeout {
                    task_id: state.task_id,
                    attempts: state.attempt,
                    last_error,
                });
            }
        }
    }

    fn transition(&self, state: &mut PollState, phase: PollPhase) {
        state.transition(phase);
        if phase.is_terminal() {
            let elapsed = self.clock.now() - state.started_at;
            debug!(
                task_id = %state.task_id,
                attempts = state.attempt,
                elapsed_ms = elapsed.num_milliseconds(),
                ?phase,
                "poll loop finished"
            );
        }
        self.events.emit(&DomainEvent::PhaseChanged {
            task_id: state.task_id.clone(),
            phase,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::app::client::routes;
    use crate::domain::{NetworkError, TaskDescriptor, TaskId, TaskKind};
    use crate::impls::{RecordingEventSink, ScriptedTransport};
    use crate::ports::{HttpResponse, Method, SystemClock};

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        client: TaskClient<Arc<ScriptedTransport>>,
        events: RecordingEventSink,
        handle: TaskHandle,
    }

    impl Fixture {
        fn new() -> Self {
            let transport = Arc::new(ScriptedTransport::new());
            Self {
                client: TaskClient::new(transport.clone()),
                transport,
                events: RecordingEventSink::new(),
                handle: TaskHandle {
                    task_id: TaskId::new("t1"),
                    descriptor: TaskDescriptor::new(TaskKind::GenerateAnnotation),
                },
            }
        }

        fn result_path(&self) -> String {
            routes::result(&self.handle.task_id)
        }

        fn reply(&self, body: serde_json::Value) {
            self.transport
                .push(Method::Get, self.result_path(), Ok(HttpResponse::ok(body)));
        }

        fn always_running(&self) {
            self.transport.always(
                Method::Get,
                self.result_path(),
                Ok(HttpResponse::ok(json!({"status": "running"}))),
            );
        }

        fn polls(&self) -> usize {
            self.transport.call_count(Method::Get, &self.result_path())
        }

        async fn run(&self, policy: PollPolicy, cancel: &CancellationToken) -> Result<serde_json::Value, TaskError> {
            PollLoop::new(&self.client, &self.events, &SystemClock)
                .run(&self.handle, policy, cancel)
                .await
        }
    }

    fn policy() -> PollPolicy {
        PollPolicy::for_kind(TaskKind::GenerateAnnotation)
    }

    #[tokio::test(start_paused = true)]
    async fn never_terminal_times_out_after_exactly_max_attempts() {
        let f = Fixture::new();
        f.always_running();
        let start = Instant::now();

        let err = f.run(policy(), &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, TaskError::Timeout { attempts: 60, .. }));
        assert_eq!(f.polls(), 60);
        assert_eq!(start.elapsed(), Duration::from_secs(60));
        assert_eq!(
            f.events.events().last(),
            Some(&DomainEvent::PhaseChanged {
                task_id: TaskId::new("t1"),
                phase: PollPhase::TimedOut,
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completes_on_attempt_k_without_further_polls() {
        let f = Fixture::new();
        for _ in 0..4 {
            f.reply(json!({"status": "pending"}));
        }
        f.reply(json!({"status": "completed", "result": {"annotation": "ok"}}));
        f.always_running();

        let payload = f.run(policy(), &CancellationToken::new()).await.unwrap();

        assert_eq!(payload, json!({"annotation": "ok"}));
        assert_eq!(f.polls(), 5);
        let phases: Vec<PollPhase> = f
            .events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DomainEvent::PhaseChanged { phase, .. } => Some(phase),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![PollPhase::Submitted, PollPhase::Polling, PollPhase::Completed]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completion_on_the_last_attempt_still_resolves() {
        let f = Fixture::new();
        for _ in 0..59 {
            f.reply(json!({"status": "running"}));
        }
        f.reply(json!({"status": "completed", "result": "late"}));

        let payload = f.run(policy(), &CancellationToken::new()).await.unwrap();

        assert_eq!(payload, json!("late"));
        assert_eq!(f.polls(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_failure_carries_message() {
        let f = Fixture::new();
        f.reply(json!({"status": "running"}));
        f.reply(json!({"status": "failed", "error": "quota exceeded"}));

        let err = f.run(policy(), &CancellationToken::new()).await.unwrap_err();

        match err {
            TaskError::TaskFailed { message, .. } => assert_eq!(message, "quota exceeded"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_transport_error_is_retried() {
        let f = Fixture::new();
        f.transport.push(
            Method::Get,
            f.result_path(),
            Err(NetworkError::Transport("connection reset".into())),
        );
        f.transport.push(
            Method::Get,
            f.result_path(),
            Ok(HttpResponse::status(503, json!(null))),
        );
        f.reply(json!({"status": "completed", "result": "fine"}));

        let payload = f.run(policy(), &CancellationToken::new()).await.unwrap();

        assert_eq!(payload, json!("fine"));
        assert_eq!(f.polls(), 3);
        assert_eq!(f.events.count("poll_transport_error"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_errors_count_against_the_budget() {
        let f = Fixture::new();
        f.transport.always(
            Method::Get,
            f.result_path(),
            Err(NetworkError::Transport("offline".into())),
        );
        let small = PollPolicy {
            interval: Duration::from_millis(1000),
            max_attempts: 5,
        };

        let err = f.run(small, &CancellationToken::new()).await.unwrap_err();

        match err {
            TaskError::Timeout {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 5);
                assert!(last_error.unwrap().contains("offline"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_right_after_submit_is_retried() {
        let f = Fixture::new();
        f.transport.push(
            Method::Get,
            f.result_path(),
            Ok(HttpResponse::status(404, json!({"detail": "task not found"}))),
        );
        f.reply(json!({"status": "completed", "result": "x"}));

        let payload = f.run(policy(), &CancellationToken::new()).await.unwrap();

        assert_eq!(payload, json!("x"));
        assert_eq!(f.polls(), 2);
        assert_eq!(f.events.count("poll_transport_error"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_exhaust_the_budget_instead_of_aborting() {
        let f = Fixture::new();
        f.transport.always(
            Method::Get,
            f.result_path(),
            Ok(HttpResponse::status(400, json!("bad request"))),
        );
        let small = PollPolicy {
            interval: Duration::from_millis(1000),
            max_attempts: 3,
        };

        let err = f.run(small, &CancellationToken::new()).await.unwrap_err();

        match err {
            TaskError::Timeout {
                attempts,
                last_error,
                ..
            } => {
                assert_eq!(attempts, 3);
                assert!(last_error.unwrap().contains("400"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(f.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_never_polls() {
        let f = Fixture::new();
        f.always_running();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = f.run(policy(), &cancel).await.unwrap_err();

        assert!(matches!(err, TaskError::Cancelled { .. }));
        assert_eq!(f.polls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_further_polls() {
        let f = Fixture::new();
        f.always_running();
        let cancel = CancellationToken::new();

        let (result, ()) = tokio::join!(f.run(policy(), &cancel), async {
            tokio::time::sleep(Duration::from_millis(3500)).await;
            cancel.cancel();
        });

        assert!(matches!(result, Err(TaskError::Cancelled { .. })));
        assert_eq!(f.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn note_kinds_poll_every_two_seconds() {
        let f = Fixture::new();
        f.reply(json!({"status": "running"}));
        f.reply(json!({"status": "completed", "result": "note"}));
        let start = Instant::now();

        f.run(PollPolicy::for_kind(TaskKind::GeneratePdfNote), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }
}
