//! TaskClient - タスク投入と状態取得の薄い RPC ラッパー
//!
//! リトライはしません（PollLoop の責務）。状態を持たない純粋なトランスポートです。

use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::domain::{
    BoardId, NetworkError, SubmitRoute, TaskDescriptor, TaskError, TaskHandle, TaskId, TaskResult,
    TaskStatusResponse,
};
use crate::ports::{HttpRequest, Transport};

pub(crate) mod routes {
    use crate::domain::{BoardId, TaskId, WindowId};

    pub const SUBMIT: &str = "/api/expert/dynamic/submit";

    pub fn dedicated(endpoint: &str) -> String {
        format!("/api/expert/dynamic/{endpoint}")
    }

    pub fn result(task_id: &TaskId) -> String {
        format!("/api/expert/dynamic/result/{task_id}")
    }

    pub fn concurrent_status(board_id: &BoardId) -> String {
        format!("/api/expert/dynamic/concurrent-status/{board_id}")
    }

    pub fn annotation_style(board_id: &BoardId) -> String {
        format!("/api/boards/{board_id}/annotation-style")
    }

    pub fn window(board_id: &BoardId, window_id: &WindowId) -> String {
        format!("/api/boards/{board_id}/windows/{window_id}")
    }
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    task_id: TaskId,
}

pub struct TaskClient<T> {
    transport: T,
}

impl<T: Transport> TaskClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Submit one task. A missing board id is rejected before any I/O.
    pub async fn submit(&self, descriptor: TaskDescriptor) -> Result<TaskHandle, TaskError> {
        let board_id = match descriptor.board_id() {
            Some(board_id) if !board_id.is_blank() => board_id.clone(),
            _ => {
                return Err(TaskError::Submission(format!(
                    "{} requires a board id",
                    descriptor.kind()
                )));
            }
        };

        let request = submit_request(&descriptor, &board_id);
        let resp: SubmitResponse = self.transport.send(request).await?.decode()?;
        if resp.task_id.is_blank() {
            return Err(NetworkError::Decode("empty task_id in submit response".into()).into());
        }

        Ok(TaskHandle {
            task_id: resp.task_id,
            descriptor,
        })
    }

    /// Fetch the current status of a task. One GET, no retry.
    pub async fn poll(&self, task_id: &TaskId) -> Result<TaskResult, NetworkError> {
        let resp: TaskStatusResponse = self
            .transport
            .send(HttpRequest::get(routes::result(task_id)))
            .await?
            .decode()?;
        let status = resp.status.clone();
        TaskResult::from_response(resp)
            .ok_or_else(|| NetworkError::Decode(format!("unknown task status {status:?}")))
    }
}

fn submit_request(descriptor: &TaskDescriptor, board_id: &BoardId) -> HttpRequest {
    let params: Map<String, Value> = descriptor
        .params()
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    match descriptor.kind().submit_route() {
        SubmitRoute::Generic => HttpRequest::post(
            routes::SUBMIT,
            json!({
                "board_id": board_id,
                "task_info": {
                    "type": descriptor.kind(),
                    "params": params,
                },
            }),
        ),
        SubmitRoute::Dedicated(endpoint) => {
            let mut body = params;
            body.insert("board_id".to_string(), json!(board_id));
            HttpRequest::post(routes::dedicated(endpoint), Value::Object(body))
        }
    }
}
