//! quill-core
//!
//! Client-side orchestration of long-running AI generation tasks
//! (annotations, PDF notes, question answers) against a backend task queue.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, state, result, document, snapshot, errors, events）
//! - **ports**: 抽象化レイヤー（Transport, Clock, EventSink, IdGenerator）
//! - **app**: アプリケーションロジック（client, poll_loop, reconciler, store, monitor, orchestrator, など）
//! - **impls**: 実装（ReqwestTransport, ScriptedTransport, event sinks）
//! - **config**: 設定の読み込み（TOML + 環境変数）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
