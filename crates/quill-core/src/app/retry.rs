//! RetryableRequest: exponential backoff for idempotent persistence calls.
//!
//! Used for direct state writes (saving a window) that have no polling phase
//! of their own. Task submissions are never wrapped in this.

use std::future::Future;
use std::time::Duration;

use serde_json::json;

use crate::domain::{BoardId, DomainEvent, TaskError, WindowId};
use crate::ports::{EventSink, HttpRequest, HttpResponse, Transport};

use super::client::routes;

/// Upper bound for a single backoff wait.
pub const MAX_DELAY: Duration = Duration::from_secs(300);

/// Retry policy for failed saves.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Retries after the first call. The default of 3 means up to 4 calls in
    /// total (the first plus retries after 1s, 2s and 4s).
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    /// 1s, 2s, 4s, then give up.
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_retries: 3,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-indexed):
    /// `base_delay * multiplier^(retry - 1)`.
    ///
    /// With the default policy:
    /// - retry 1: 1s
    /// - retry 2: 2s
    /// - retry 3: 4s
    ///
    /// Saturates at [`MAX_DELAY`]; a negative or NaN product waits zero.
    pub fn next_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if delay_secs.is_nan() || delay_secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(delay_secs)
            .unwrap_or(MAX_DELAY)
            .min(MAX_DELAY)
    }
}

/// Run `op` until it succeeds or the retry budget is spent.
///
/// Every error is treated as retryable: callers only wrap idempotent writes.
/// On exhaustion the last error text is surfaced as [`TaskError::Save`].
pub async fn retry_with_backoff<T, E, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    events: &dyn EventSink,
    mut op: F,
) -> Result<T, TaskError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => {
                events.emit(&DomainEvent::SaveSucceeded {
                    label: label.to_string(),
                    attempts,
                });
                return Ok(value);
            }
            Err(err) if attempts > policy.max_retries => {
                return Err(TaskError::Save {
                    attempts,
                    last_error: err.to_string(),
                });
            }
            Err(err) => {
                let delay = policy.next_delay(attempts);
                events.emit(&DomainEvent::SaveRetryScheduled {
                    label: label.to_string(),
                    attempt: attempts,
                    delay,
                    error: err.to_string(),
                });
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// Persists a board window (`PUT /api/boards/{board}/windows/{window}`).
pub struct WindowSaver<'a, T> {
    transport: &'a T,
    policy: &'a RetryPolicy,
    events: &'a dyn EventSink,
}

impl<'a, T: Transport> WindowSaver<'a, T> {
    pub fn new(transport: &'a T, policy: &'a RetryPolicy, events: &'a dyn EventSink) -> Self {
        Self {
            transport,
            policy,
            events,
        }
    }

    pub async fn save(
        &self,
        board_id: &BoardId,
        window_id: &WindowId,
        window: &serde_json::Value,
    ) -> Result<(), TaskError> {
        let path = routes::window(board_id, window_id);
        let label = format!("window {window_id}");

        retry_with_backoff(&label, self.policy, self.events, || {
            let request = HttpRequest::put(path.clone(), json!({ "window": window }));
            async move {
                self.transport
                    .send(request)
                    .await
                    .and_then(HttpResponse::into_success)
            }
        })
        .await?;

        self.events.emit(&DomainEvent::WindowSaved {
            board_id: board_id.clone(),
            window_id: window_id.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::Arc;

    use tokio::time::Instant;

    use super::*;
    use crate::domain::NetworkError;
    use crate::impls::{NoopEventSink, RecordingEventSink, ScriptedTransport};
    use crate::ports::Method;

    #[test]
    fn default_policy_has_reasonable_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.max_retries, 3);
    }

    #[test]
    fn exponential_backoff_increases() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.next_delay(1), Duration::from_secs(1));
        assert_eq!(policy.next_delay(2), Duration::from_secs(2));
        assert_eq!(policy.next_delay(3), Duration::from_secs(4));
    }

    #[test]
    fn delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            max_retries: 2000,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.next_delay(1100), MAX_DELAY);
        assert_eq!(policy.next_delay(u32::MAX), MAX_DELAY);
    }

    #[test]
    fn negative_multiplier_never_panics() {
        let policy = RetryPolicy {
            multiplier: -2.0,
            ..RetryPolicy::default()
        };

        assert_eq!(policy.next_delay(1), Duration::from_secs(1));
        assert_eq!(policy.next_delay(2), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_failure_waits_1_2_4_then_gives_up() {
        let events = RecordingEventSink::new();
        let calls = Cell::new(0u32);
        let call_times = std::cell::RefCell::new(Vec::new());
        let start = Instant::now();

        let result: Result<(), TaskError> =
            retry_with_backoff("save", &RetryPolicy::default(), &events, || {
                calls.set(calls.get() + 1);
                call_times.borrow_mut().push(start.elapsed());
                async { Err::<(), _>("disk full") }
            })
            .await;

        assert_eq!(
            result,
            Err(TaskError::Save {
                attempts: 4,
                last_error: "disk full".into()
            })
        );
        assert_eq!(calls.get(), 4);
        assert_eq!(
            *call_times.borrow(),
            vec![
                Duration::from_secs(0),
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(7),
            ]
        );
        let delays: Vec<Duration> = events
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DomainEvent::SaveRetryScheduled { delay, .. } => Some(delay),
                _ => None,
            })
            .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_second_attempt_makes_two_calls() {
        let calls = Cell::new(0u32);
        let start = Instant::now();

        let value = retry_with_backoff("save", &RetryPolicy::default(), &NoopEventSink, || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { if n < 2 { Err("flaky") } else { Ok(n) } }
        })
        .await
        .unwrap();

        assert_eq!(value, 2);
        assert_eq!(calls.get(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn window_saver_puts_window_body() {
        let transport = Arc::new(ScriptedTransport::new());
        let path = "/api/boards/b1/windows/w1";
        transport
            .push(
                Method::Put,
                path,
                Err(NetworkError::Transport("reset".into())),
            )
            .push(Method::Put, path, Ok(HttpResponse::ok(json!({"ok": true}))));
        let events = RecordingEventSink::new();
        let policy = RetryPolicy::default();

        WindowSaver::new(&transport, &policy, &events)
            .save(
                &BoardId::new("b1"),
                &WindowId::new("w1"),
                &json!({"type": "text", "content": "hi"}),
            )
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[1].body,
            Some(json!({"window": {"type": "text", "content": "hi"}}))
        );
        assert_eq!(events.count("window_saved"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_saver_surfaces_save_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.always(
            Method::Put,
            "/api/boards/b1/windows/w1",
            Ok(HttpResponse::status(500, json!("oops"))),
        );
        let policy = RetryPolicy::default();

        let err = WindowSaver::new(&transport, &policy, &NoopEventSink)
            .save(&BoardId::new("b1"), &WindowId::new("w1"), &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, TaskError::Save { attempts: 4, .. }));
        assert_eq!(transport.total_calls(), 4);
    }
}
