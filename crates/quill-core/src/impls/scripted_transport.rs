//! ScriptedTransport - テスト・オフラインデモ用の HTTP 実装
//!
//! ルート（method + path）ごとに応答を登録しておき、呼び出しをすべて記録します。
//!
//! # 応答の決め方
//! 1. `push` で積んだ応答があれば先頭から1つ消費する
//! 2. なければ `always` で登録した応答を返す
//! 3. どちらもなければ 404

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::NetworkError;
use crate::ports::{HttpRequest, HttpResponse, Method, Transport};

type Reply = Result<HttpResponse, NetworkError>;
type Route = (Method, String);

#[derive(Default)]
struct Script {
    queued: HashMap<Route, VecDeque<Reply>>,
    fallback: HashMap<Route, Reply>,
    calls: Vec<HttpRequest>,
}

#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<Script>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reply once, in FIFO order with other pushes for the same route.
    pub fn push(&self, method: Method, path: impl Into<String>, reply: Reply) -> &Self {
        self.script()
            .queued
            .entry((method, path.into()))
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply with this whenever nothing is queued for the route.
    pub fn always(&self, method: Method, path: impl Into<String>, reply: Reply) -> &Self {
        self.script().fallback.insert((method, path.into()), reply);
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.script().calls.clone()
    }

    pub fn call_count(&self, method: Method, path: &str) -> usize {
        self.script()
            .calls
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.script().calls.len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let mut script = self.script();
        let route = (request.method, request.path.clone());
        script.calls.push(request);

        if let Some(reply) = script.queued.get_mut(&route).and_then(VecDeque::pop_front) {
            return reply;
        }
        if let Some(reply) = script.fallback.get(&route) {
            return reply.clone();
        }
        Ok(HttpResponse::status(
            404,
            serde_json::json!({ "detail": format!("no scripted reply for {} {}", route.0, route.1) }),
        ))
    }
}
