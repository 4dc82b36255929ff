//! Errors - エラー型と分類
//!
//! 呼び出し側（UI アクション）まで伝播するのは `TaskError` です。
//! `ParseError` は ResultReconciler の内部で吸収され、外へは出ません。

use thiserror::Error;

use super::ids::TaskId;

/// Failure of one HTTP exchange. While polling, every variant is retried
/// within the attempt budget.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NetworkError {
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),
}

/// Errors surfaced to the action that started a task or a save.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    /// Required correlation data missing; raised before any network call.
    #[error("cannot submit task: {0}")]
    Submission(String),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("task {task_id} failed: {message}")]
    TaskFailed { task_id: TaskId, message: String },

    #[error("task {task_id} did not finish after {attempts} polls")]
    Timeout {
        task_id: TaskId,
        attempts: u32,
        last_error: Option<String>,
    },

    #[error("polling of task {task_id} was cancelled")]
    Cancelled { task_id: TaskId },

    #[error("save failed after {attempts} attempts: {last_error}")]
    Save { attempts: u32, last_error: String },
}

impl TaskError {
    /// Short text suitable for a user-visible message.
    pub fn user_message(&self) -> String {
        match self {
            TaskError::Submission(reason) => format!("Could not start generation: {reason}"),
            TaskError::Network(_) => "Network error while talking to the server".to_string(),
            TaskError::TaskFailed { message, .. } => format!("Generation failed: {message}"),
            TaskError::Timeout { .. } => "Generation timed out, please try again".to_string(),
            TaskError::Cancelled { .. } => "Generation was cancelled".to_string(),
            TaskError::Save { .. } => "Could not save your changes".to_string(),
        }
    }
}

/// A structured payload could not be decoded. Never propagated past the
/// reconciler; the raw text is kept instead.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("could not parse {what}: {reason}")]
pub struct ParseError {
    pub what: &'static str,
    pub reason: String,
}
