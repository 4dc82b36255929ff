//! TaskResult: the client-side view of a backend task status.

use serde::{Deserialize, Serialize};

/// Raw body of `GET /api/expert/dynamic/result/{task_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tagged union of task statuses.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskResult {
    Pending,
    Running,
    Completed(serde_json::Value),
    Failed(String),
}

impl TaskResult {
    /// Map the backend status field. Unknown statuses yield `None`.
    ///
    /// A completed task without a `result` field carries `null`; a failed task
    /// without an `error` field carries a generic message.
    pub fn from_response(resp: TaskStatusResponse) -> Option<Self> {
        match resp.status.as_str() {
            "pending" => Some(TaskResult::Pending),
            "running" => Some(TaskResult::Running),
            "completed" => Some(TaskResult::Completed(
                resp.result.unwrap_or(serde_json::Value::Null),
            )),
            "failed" => Some(TaskResult::Failed(
                resp.error
                    .unwrap_or_else(|| "task failed without an error message".to_string()),
            )),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(v: serde_json::Value) -> Option<TaskResult> {
        TaskResult::from_response(serde_json::from_value(v).unwrap())
    }

    #[test]
    fn maps_every_known_status() {
        assert_eq!(parse(json!({"status": "pending"})), Some(TaskResult::Pending));
        assert_eq!(parse(json!({"status": "running"})), Some(TaskResult::Running));
        assert_eq!(
            parse(json!({"status": "completed", "result": {"annotation": "x"}})),
            Some(TaskResult::Completed(json!({"annotation": "x"})))
        );
        assert_eq!(
            parse(json!({"status": "failed", "error": "model overloaded"})),
            Some(TaskResult::Failed("model overloaded".into()))
        );
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert_eq!(parse(json!({"status": "queued_somewhere"})), None);
    }

    #[test]
    fn failed_without_error_gets_message() {
        match parse(json!({"status": "failed"})) {
            Some(TaskResult::Failed(msg)) => assert!(!msg.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
