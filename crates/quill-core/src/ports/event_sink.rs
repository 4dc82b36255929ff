//! EventSink port - イベント通知の抽象化
//!
//! オーケストレーション層はログやアクティビティ表示のために
//! EventSink を直接呼び出します（グローバルなイベントバスの代わり）。
//!
//! # 実装
//! - TracingEventSink: tracing でログ出力
//! - RecordingEventSink: テスト用にイベントを記録
//! - NoopEventSink: 何もしない

use std::sync::Arc;

use crate::domain::DomainEvent;

/// Called synchronously, in the same order as the state changes it reports.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DomainEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: &DomainEvent) {
        (**self).emit(event)
    }
}
