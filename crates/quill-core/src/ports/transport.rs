//! Transport port - HTTP の抽象化
//!
//! TaskClient / StyleResolver / WindowSaver / ConcurrentStatusMonitor は
//! すべてこの trait 越しにバックエンドと通信します。
//!
//! # 実装
//! - **ReqwestTransport**: 本番用
//! - **ScriptedTransport**: テスト・オフラインデモ用

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::NetworkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        })
    }
}

/// A request relative to the backend base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
        }
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Put,
            path: path.into(),
            body: Some(body),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl HttpResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    pub fn status(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Non-2xx becomes `NetworkError::Status`; it is never read as data.
    pub fn into_success(self) -> Result<serde_json::Value, NetworkError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(NetworkError::Status {
                status: self.status,
                body: self.body.to_string(),
            })
        }
    }

    /// Decode a successful body into `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(self) -> Result<T, NetworkError> {
        let body = self.into_success()?;
        serde_json::from_value(body).map_err(|e| NetworkError::Decode(e.to_string()))
    }
}

/// One HTTP exchange. Implementations never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        (**self).send(request).await
    }
}
