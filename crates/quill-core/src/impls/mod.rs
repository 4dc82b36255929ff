//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **ReqwestTransport**: 本番用の HTTP
//! - **ScriptedTransport**: テスト・デモ用の HTTP
//! - **TracingEventSink / RecordingEventSink / NoopEventSink**

pub mod event_sinks;
pub mod reqwest_transport;
pub mod scripted_transport;

pub use self::event_sinks::{NoopEventSink, RecordingEventSink, TracingEventSink};
pub use self::reqwest_transport::ReqwestTransport;
pub use self::scripted_transport::ScriptedTransport;
